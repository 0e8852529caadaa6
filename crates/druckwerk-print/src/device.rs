// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device transports.
//
// A device URI selects an opener by scheme. Built in:
//
//   - `file:///path`           append to a file, or `<dir>/<job>.prn` when
//                              the path is a directory
//   - `socket://host[:port]`   raw TCP (JetDirect, port 9100)
//
// Other schemes (USB, test transports) are registered at runtime. Opening is
// never retried here; the scheduler owns retry.

use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use druckwerk_core::{DruckwerkError, Result};
use serde::Serialize;
use tracing::{debug, info, instrument};

/// Default raw TCP port (HP JetDirect).
pub const RAW_PORT: u16 = 9100;

/// Connect timeout for raw TCP devices.
const RAW_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read/write timeout for raw TCP devices.
const RAW_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// A byte stream to a physical device. A kept-open handle lives inside the
/// printer's shared state, so transports must be `Sync` as well as `Send`.
pub trait Transport: Read + Write + Send + Sync {}

impl<T: Read + Write + Send + Sync> Transport for T {}

/// What an opener is asked to open.
#[derive(Debug, Clone, Copy)]
pub struct DeviceRequest<'a> {
    pub uri: &'a str,
    pub scheme: &'a str,
    /// Everything after `scheme://`.
    pub target: &'a str,
    /// Job the device is opened for, if any.
    pub job_id: Option<i32>,
}

type Opener = Arc<dyn Fn(&DeviceRequest<'_>) -> Result<Box<dyn Transport>> + Send + Sync>;

/// Scheme to opener table.
pub struct DeviceRegistry {
    openers: RwLock<HashMap<String, Opener>>,
}

impl DeviceRegistry {
    /// A registry with the `file` and `socket` schemes.
    pub fn new() -> Self {
        let registry = Self {
            openers: RwLock::new(HashMap::new()),
        };
        registry.register("file", open_file);
        registry.register("socket", open_socket);
        registry
    }

    /// Add or replace the opener for `scheme`.
    pub fn register<F>(&self, scheme: &str, opener: F)
    where
        F: Fn(&DeviceRequest<'_>) -> Result<Box<dyn Transport>> + Send + Sync + 'static,
    {
        self.openers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scheme.to_ascii_lowercase(), Arc::new(opener));
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self
            .openers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        schemes.sort();
        schemes
    }

    fn opener(&self, scheme: &str) -> Option<Opener> {
        self.openers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&scheme.to_ascii_lowercase())
            .cloned()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// IO counters for one open handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceMetrics {
    pub read_bytes: u64,
    pub read_requests: u64,
    pub read_ms: u64,
    pub write_bytes: u64,
    pub write_requests: u64,
    pub write_ms: u64,
}

/// An open device connection.
pub struct DeviceHandle {
    uri: String,
    transport: Box<dyn Transport>,
    metrics: DeviceMetrics,
}

impl DeviceHandle {
    #[instrument(skip(registry))]
    pub fn open(uri: &str, registry: &DeviceRegistry, job_id: Option<i32>) -> Result<Self> {
        let (scheme, target) = uri
            .split_once("://")
            .ok_or_else(|| DruckwerkError::DeviceScheme(uri.to_string()))?;
        let opener = registry
            .opener(scheme)
            .ok_or_else(|| DruckwerkError::DeviceScheme(scheme.to_string()))?;

        let request = DeviceRequest {
            uri,
            scheme,
            target,
            job_id,
        };
        let transport = opener(&request)?;
        debug!(uri, "device opened");
        Ok(Self {
            uri: uri.to_string(),
            transport,
            metrics: DeviceMetrics::default(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn metrics(&self) -> DeviceMetrics {
        self.metrics
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let started = Instant::now();
        let n = self
            .transport
            .read(buf)
            .map_err(|e| DruckwerkError::DeviceIo(format!("read from {}: {e}", self.uri)))?;
        self.metrics.read_requests += 1;
        self.metrics.read_bytes += n as u64;
        self.metrics.read_ms += elapsed_ms(started);
        Ok(n)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let started = Instant::now();
        self.transport
            .write_all(data)
            .map_err(|e| DruckwerkError::DeviceIo(format!("write to {}: {e}", self.uri)))?;
        self.metrics.write_requests += 1;
        self.metrics.write_bytes += data.len() as u64;
        self.metrics.write_ms += elapsed_ms(started);
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.transport
            .flush()
            .map_err(|e| DruckwerkError::DeviceIo(format!("flush {}: {e}", self.uri)))
    }

    /// Flush, drop the transport, and log the handle's metrics.
    pub fn close(mut self) -> DeviceMetrics {
        if let Err(e) = self.flush() {
            debug!(error = %e, "flush on close failed");
        }
        let m = self.metrics;
        info!(
            uri = %self.uri,
            read_bytes = m.read_bytes,
            read_requests = m.read_requests,
            read_ms = m.read_ms,
            write_bytes = m.write_bytes,
            write_requests = m.write_requests,
            write_ms = m.write_ms,
            "device closed"
        );
        m
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("uri", &self.uri)
            .field("metrics", &self.metrics)
            .finish()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Built-in schemes
// ---------------------------------------------------------------------------

fn open_file(request: &DeviceRequest<'_>) -> Result<Box<dyn Transport>> {
    let open_err = |e: std::io::Error| DruckwerkError::DeviceOpen {
        uri: request.uri.to_string(),
        reason: e.to_string(),
    };

    // file:///path and file://localhost/path both name /path.
    let path = request.target.strip_prefix("localhost").unwrap_or(request.target);
    if path.is_empty() {
        return Err(DruckwerkError::DeviceOpen {
            uri: request.uri.to_string(),
            reason: "empty path".into(),
        });
    }
    let mut path = PathBuf::from(path);
    if path.is_dir() {
        path.push(format!("{}.prn", request.job_id.unwrap_or(0)));
        let file = File::create(&path).map_err(open_err)?;
        return Ok(Box::new(file));
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(&path)
        .map_err(open_err)?;
    Ok(Box::new(file))
}

fn open_socket(request: &DeviceRequest<'_>) -> Result<Box<dyn Transport>> {
    let open_err = |reason: String| DruckwerkError::DeviceOpen {
        uri: request.uri.to_string(),
        reason,
    };

    let authority = request
        .target
        .split(['/', '?'])
        .next()
        .unwrap_or_default();
    if authority.is_empty() {
        return Err(open_err("missing host".into()));
    }
    let addr = if has_port(authority) {
        authority.to_string()
    } else {
        format!("{authority}:{RAW_PORT}")
    };

    let candidates: Vec<_> = addr
        .to_socket_addrs()
        .map_err(|e| open_err(format!("resolve {addr}: {e}")))?
        .collect();
    let mut last_err = format!("{addr} did not resolve");
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, RAW_CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream
                    .set_write_timeout(Some(RAW_IO_TIMEOUT))
                    .and_then(|()| stream.set_read_timeout(Some(RAW_IO_TIMEOUT)))
                    .map_err(|e| open_err(e.to_string()))?;
                info!(addr = %candidate, "raw TCP device connected");
                return Ok(Box::new(stream));
            }
            Err(e) => last_err = format!("connect {candidate}: {e}"),
        }
    }
    Err(open_err(last_err))
}

/// Whether `host[:port]` (or `[v6]:port`) carries a port.
fn has_port(authority: &str) -> bool {
    match authority.rsplit_once(':') {
        Some((host, port)) => {
            port.parse::<u16>().is_ok() && (!host.contains(':') || host.ends_with(']'))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;

    #[test]
    fn file_directory_gets_one_file_per_job() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = DeviceRegistry::new();
        let uri = format!("file://{}", dir.path().display());

        let mut device = DeviceHandle::open(&uri, &registry, Some(17)).expect("open");
        device.write(b"RaS2").expect("write");
        device.write(b"....").expect("write");
        let metrics = device.close();

        assert_eq!(metrics.write_bytes, 8);
        assert_eq!(metrics.write_requests, 2);
        let written = std::fs::read(dir.path().join("17.prn")).expect("read");
        assert_eq!(written, b"RaS2....");
    }

    #[test]
    fn file_path_is_appended() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.prn");
        let registry = DeviceRegistry::new();
        let uri = format!("file://{}", path.display());

        for chunk in [b"ab", b"cd"] {
            let mut device = DeviceHandle::open(&uri, &registry, None).expect("open");
            device.write(chunk).expect("write");
            device.close();
        }
        assert_eq!(std::fs::read(&path).expect("read"), b"abcd");
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let registry = DeviceRegistry::new();
        let err = DeviceHandle::open("usb://Acme/Label", &registry, None).unwrap_err();
        assert!(matches!(err, DruckwerkError::DeviceScheme(s) if s == "usb"));
        assert!(matches!(
            DeviceHandle::open("no-scheme", &registry, None),
            Err(DruckwerkError::DeviceScheme(_))
        ));
    }

    #[test]
    fn custom_schemes_can_be_registered() {
        let registry = DeviceRegistry::new();
        registry.register("mem", |request: &DeviceRequest<'_>| {
            assert_eq!(request.target, "printer");
            Ok(Box::new(Cursor::new(b"status-ok".to_vec())) as Box<dyn Transport>)
        });
        assert!(registry.schemes().contains(&"mem".to_string()));

        let mut device = DeviceHandle::open("mem://printer", &registry, None).expect("open");
        let mut buf = [0u8; 9];
        assert_eq!(device.read(&mut buf).expect("read"), 9);
        assert_eq!(&buf, b"status-ok");
        assert_eq!(device.metrics().read_requests, 1);
        assert_eq!(device.metrics().read_bytes, 9);
    }

    #[test]
    fn socket_scheme_writes_raw_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut received = Vec::new();
            stream.read_to_end(&mut received).expect("read");
            received
        });

        let registry = DeviceRegistry::new();
        let uri = format!("socket://127.0.0.1:{port}");
        let mut device = DeviceHandle::open(&uri, &registry, Some(1)).expect("open");
        device.write(b"\x1b%-12345X").expect("write");
        device.close();

        assert_eq!(server.join().expect("join"), b"\x1b%-12345X");
    }

    #[test]
    fn unreachable_socket_is_an_open_error() {
        // Bind then drop to find a port nothing listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("probe")
            .port();
        let registry = DeviceRegistry::new();
        let err = DeviceHandle::open(&format!("socket://127.0.0.1:{port}"), &registry, None)
            .unwrap_err();
        assert!(matches!(err, DruckwerkError::DeviceOpen { .. }));
    }

    #[test]
    fn port_detection_handles_ipv6() {
        assert!(has_port("printer.local:9101"));
        assert!(!has_port("printer.local"));
        assert!(has_port("[::1]:9100"));
        assert!(!has_port("::1"));
    }
}
