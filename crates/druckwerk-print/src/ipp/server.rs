// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Embedded IPP server: accepts HTTP/1.1 connections, frames each POST of
// `application/ipp`, and hands the body to the operation dispatcher.
//
// Every connection runs in its own task and may carry many requests
// (keep-alive). Operation handlers take blocking locks and may print a
// streamed document before replying, so they run on the blocking pool.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use druckwerk_core::{DruckwerkError, Result};

use super::http::{self, HttpError};
use super::operations::{self, Reply};
use crate::system::System;

/// MIME type of IPP request and response bodies.
const IPP_MIME: &str = "application/ipp";

/// Embedded IPP server for every printer of a [`System`].
///
/// Printers are served at `/ipp/print/<name>`; `/ipp/print` is the default
/// printer.
pub struct IppServer {
    system: Arc<System>,
    /// Bound address once started.
    local_addr: Option<SocketAddr>,
    /// Signals the accept loop to exit.
    shutdown_signal: Arc<Notify>,
    /// The accept loop task.
    task_handle: Option<JoinHandle<()>>,
    active_connections: Arc<AtomicU32>,
}

/// State shared by connection tasks.
struct Shared {
    system: Arc<System>,
    active_connections: Arc<AtomicU32>,
    idle_timeout: Duration,
    max_request_bytes: usize,
}

impl IppServer {
    pub fn new(system: Arc<System>) -> Self {
        Self {
            system,
            local_addr: None,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Address the server is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Number of currently open client connections.
    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind the configured address and start accepting connections.
    ///
    /// Port 0 binds an ephemeral port; the bound address is returned.
    ///
    /// # Errors
    ///
    /// Returns [`DruckwerkError::PrintServer`] when the address cannot be
    /// bound.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr.filter(|_| self.is_running()) {
            debug!(%addr, "IPP server already running");
            return Ok(addr);
        }

        let config = self.system.config();
        let bind_addr = config.listen_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| DruckwerkError::PrintServer(format!("bind {bind_addr}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| DruckwerkError::PrintServer(format!("local address: {e}")))?;

        let shared = Arc::new(Shared {
            system: Arc::clone(&self.system),
            active_connections: Arc::clone(&self.active_connections),
            idle_timeout: config.idle_timeout(),
            max_request_bytes: config.max_request_bytes,
        });
        let shutdown = Arc::clone(&self.shutdown_signal);
        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, shared).await;
        });

        info!(%addr, printers = self.system.printers().len(), "IPP server listening");
        self.local_addr = Some(addr);
        self.task_handle = Some(handle);
        Ok(addr)
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// Connections already open finish their current request.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Ok(());
        };
        info!(addr = ?self.local_addr, "stopping IPP server");
        self.shutdown_signal.notify_one();
        handle
            .await
            .map_err(|e| DruckwerkError::PrintServer(format!("task join: {e}")))?;
        info!("IPP server stopped");
        Ok(())
    }

    async fn accept_loop(listener: TcpListener, shutdown: Arc<Notify>, shared: Arc<Shared>) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "incoming IPP connection");
                            let state = Arc::clone(&shared);
                            tokio::spawn(async move {
                                state.active_connections.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) = Self::handle_connection(stream, peer, &state).await {
                                    warn!(%peer, error = %e, "connection handler error");
                                }
                                state.active_connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    /// Serve requests on one connection until the client closes it, asks
    /// for close, idles out, or sends something unparseable.
    async fn handle_connection(
        stream: TcpStream,
        peer: SocketAddr,
        state: &Shared,
    ) -> std::result::Result<(), HttpError> {
        let fallback_host = stream
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "localhost".into());
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        loop {
            let head = match http::read_head(&mut reader, state.idle_timeout).await {
                Ok(Some(head)) => head,
                Ok(None) | Err(HttpError::Timeout) => {
                    debug!(%peer, "connection closed");
                    return Ok(());
                }
                Err(e @ (HttpError::Malformed(_) | HttpError::HeadTooLarge)) => {
                    let _ = writer
                        .write_all(&http::response(400, "text/plain", e.to_string().as_bytes(), false))
                        .await;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            let keep_alive = head.keep_alive();
            debug!(%peer, method = %head.method, path = %head.path, "HTTP request");

            if head.method != "POST" {
                writer
                    .write_all(&http::response(405, "text/plain", b"only POST is supported", keep_alive))
                    .await?;
                if keep_alive && head.framing()? != http::Framing::UntilClose {
                    // Discard any body so the next request lines up.
                    http::read_body(&mut reader, head.framing()?, state.max_request_bytes, state.idle_timeout)
                        .await?;
                    continue;
                }
                return Ok(());
            }
            let content_type = head.header("content-type").unwrap_or_default();
            if !content_type
                .split(';')
                .next()
                .is_some_and(|t| t.trim().eq_ignore_ascii_case(IPP_MIME))
            {
                writer
                    .write_all(&http::response(415, "text/plain", b"expected application/ipp", false))
                    .await?;
                return Ok(());
            }

            let framing = head.framing()?;
            if head.expects_continue() {
                writer.write_all(http::CONTINUE).await?;
            }
            let body = match http::read_body(
                &mut reader,
                framing,
                state.max_request_bytes,
                state.idle_timeout,
            )
            .await
            {
                Ok(body) => body,
                Err(HttpError::BodyTooLarge(max)) => {
                    warn!(%peer, max, "request body too large");
                    writer
                        .write_all(&http::response(413, "text/plain", b"request too large", false))
                        .await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let system = Arc::clone(&state.system);
            let path = head.path.clone();
            let host = head.host(&fallback_host).to_string();
            let reply = tokio::task::spawn_blocking(move || {
                operations::handle(&system, &path, &host, &body)
            })
            .await;

            let (response, keep_alive) = match reply {
                Ok(Reply::Ipp(bytes)) => (http::response(200, IPP_MIME, &bytes, keep_alive), keep_alive),
                Ok(Reply::NotFound) => (
                    http::response(404, "text/plain", b"no such printer", keep_alive),
                    keep_alive,
                ),
                Err(e) => {
                    error!(%peer, error = %e, "IPP handler panicked");
                    (http::response(500, "text/plain", b"internal error", false), false)
                }
            };
            writer.write_all(&response).await?;
            writer.flush().await?;
            if !keep_alive || framing == http::Framing::UntilClose {
                return Ok(());
            }
        }
    }
}
