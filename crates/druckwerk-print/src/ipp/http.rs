// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Just enough HTTP/1.1 to carry IPP: request heads, bodies framed by
// Content-Length, chunked transfer coding, or connection close, and
// minimal responses.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};
use tokio::time::timeout;

/// Upper bound on the request line plus headers.
pub const MAX_HEAD_BYTES: u64 = 16 * 1024;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connection idle for too long")]
    Timeout,

    #[error("request head too large")]
    HeadTooLarge,

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("connection closed mid-request")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How the body of a request is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Length(usize),
    Chunked,
    /// Everything up to end of stream.
    UntilClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    /// `HTTP/1.0` or `HTTP/1.1`.
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// First header named `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// An HTTP/1.1 request with neither header has no body.
    pub fn framing(&self) -> Result<Framing, HttpError> {
        if self
            .header("transfer-encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"))
        {
            return Ok(Framing::Chunked);
        }
        match self.header("content-length") {
            Some(value) => value
                .trim()
                .parse()
                .map(Framing::Length)
                .map_err(|_| HttpError::Malformed(format!("bad Content-Length '{value}'"))),
            None if self.version == "HTTP/1.0" => Ok(Framing::UntilClose),
            None => Ok(Framing::Length(0)),
        }
    }

    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    }

    /// Whether the connection may carry another request after this one.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection").map(str::to_ascii_lowercase);
        match connection.as_deref() {
            Some(c) if c.contains("close") => false,
            Some(c) if c.contains("keep-alive") => true,
            _ => self.version == "HTTP/1.1",
        }
    }

    /// `Host` header, or `fallback` when the client sent none.
    pub fn host<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.header("host").unwrap_or(fallback)
    }
}

async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>) -> Result<usize, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let mut limited = (&mut *reader).take(MAX_HEAD_BYTES);
    let n = limited.read_until(b'\n', line).await?;
    if n > 0 && !line.ends_with(b"\n") {
        return Err(if n as u64 >= MAX_HEAD_BYTES {
            HttpError::HeadTooLarge
        } else {
            HttpError::Closed
        });
    }
    while line.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
        line.pop();
    }
    Ok(n)
}

/// Read a request head. `Ok(None)` means the client closed the connection
/// cleanly between requests.
pub async fn read_head<R>(reader: &mut R, idle: Duration) -> Result<Option<RequestHead>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    timeout(idle, read_head_inner(reader))
        .await
        .map_err(|_| HttpError::Timeout)?
}

async fn read_head_inner<R>(reader: &mut R) -> Result<Option<RequestHead>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    // Tolerate stray blank lines between pipelined requests.
    let request_line = loop {
        if read_line(reader, &mut line).await? == 0 {
            return Ok(None);
        }
        if !line.is_empty() {
            break String::from_utf8_lossy(&line).into_owned();
        }
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::Malformed(format!("request line '{request_line}'")));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::Malformed(format!("unsupported version '{version}'")));
    }

    let mut head = RequestHead {
        method: method.to_string(),
        path: path.to_string(),
        version: version.to_string(),
        headers: Vec::new(),
    };
    let mut total = line.len();
    loop {
        if read_line(reader, &mut line).await? == 0 {
            return Err(HttpError::Closed);
        }
        if line.is_empty() {
            break;
        }
        total += line.len();
        if total as u64 > MAX_HEAD_BYTES {
            return Err(HttpError::HeadTooLarge);
        }
        let text = String::from_utf8_lossy(&line);
        let (name, value) = text
            .split_once(':')
            .ok_or_else(|| HttpError::Malformed(format!("header line '{text}'")))?;
        head.headers
            .push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(Some(head))
}

/// Read a whole body, refusing more than `max` bytes. Each read must make
/// progress within `idle`.
pub async fn read_body<R>(
    reader: &mut R,
    framing: Framing,
    max: usize,
    idle: Duration,
) -> Result<Vec<u8>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    match framing {
        Framing::Length(len) => {
            if len > max {
                return Err(HttpError::BodyTooLarge(max));
            }
            body.reserve(len);
            read_exact_into(reader, &mut body, len, idle).await?;
        }
        Framing::UntilClose => {
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                let n = timeout(idle, reader.read(&mut chunk))
                    .await
                    .map_err(|_| HttpError::Timeout)??;
                if n == 0 {
                    break;
                }
                if body.len() + n > max {
                    return Err(HttpError::BodyTooLarge(max));
                }
                body.extend_from_slice(&chunk[..n]);
            }
        }
        Framing::Chunked => {
            let mut line = Vec::new();
            loop {
                timeout(idle, read_line(reader, &mut line))
                    .await
                    .map_err(|_| HttpError::Timeout)??;
                let text = String::from_utf8_lossy(&line);
                let size_field = text.split(';').next().unwrap_or_default().trim();
                let size = usize::from_str_radix(size_field, 16)
                    .map_err(|_| HttpError::Malformed(format!("chunk size '{size_field}'")))?;
                if size == 0 {
                    // Trailers end with an empty line.
                    loop {
                        let n = timeout(idle, read_line(reader, &mut line))
                            .await
                            .map_err(|_| HttpError::Timeout)??;
                        if n == 0 || line.is_empty() {
                            break;
                        }
                    }
                    break;
                }
                if body.len() + size > max {
                    return Err(HttpError::BodyTooLarge(max));
                }
                read_exact_into(reader, &mut body, size, idle).await?;
                timeout(idle, read_line(reader, &mut line))
                    .await
                    .map_err(|_| HttpError::Timeout)??;
            }
        }
    }
    Ok(body)
}

async fn read_exact_into<R>(
    reader: &mut R,
    body: &mut Vec<u8>,
    mut remaining: usize,
    idle: Duration,
) -> Result<(), HttpError>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; remaining.min(READ_CHUNK)];
    while remaining > 0 {
        let want = remaining.min(chunk.len());
        let n = timeout(idle, reader.read(&mut chunk[..want]))
            .await
            .map_err(|_| HttpError::Timeout)??;
        if n == 0 {
            return Err(HttpError::Closed);
        }
        body.extend_from_slice(&chunk[..n]);
        remaining -= n;
    }
    Ok(())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Request Entity Too Large",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Serialize a complete response.
pub fn response(status: u16, content_type: &str, body: &[u8], keep_alive: bool) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: {}\r\n",
        reason_phrase(status),
        body.len(),
        if keep_alive { "keep-alive" } else { "close" },
    );
    if status == 405 {
        out.push_str("Allow: POST\r\n");
    }
    out.push_str("\r\n");
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// Interim response sent before reading a body the client is holding back.
pub const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";
