// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// WebSocket print server.
//
// Listens on a TCP port (default 3333), upgrades each connection to a
// WebSocket, and treats every text or binary frame as one print request.
// Each request runs in its own task; status events flow back through a
// per-connection writer task so concurrent requests never interleave frames.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use htmlprint_core::config::DEFAULT_WEBSOCKET_PORT;
use htmlprint_core::error::{HtmlPrintError, Result};
use htmlprint_core::{PrinterStatus, ServerStatus, StatusEvent};

use crate::coordinator::RequestCoordinator;

/// Outbound events buffered per connection before request tasks wait.
const OUTBOUND_BUFFER: usize = 64;

/// Pause after a failed accept (e.g. EMFILE) before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct PrintServer {
    /// The TCP port to listen on (0 picks a free port).
    port: u16,
    status: ServerStatus,
    /// Address actually bound, once running.
    local_addr: Option<SocketAddr>,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    active_connections: Arc<AtomicU32>,
    coordinator: Arc<RequestCoordinator>,
}

impl PrintServer {
    /// Create a server in `Stopped` state. Call [`PrintServer::start`] to
    /// begin accepting connections.
    pub fn new(port: Option<u16>, coordinator: Arc<RequestCoordinator>) -> Self {
        Self {
            port: port.unwrap_or(DEFAULT_WEBSOCKET_PORT),
            status: ServerStatus::Stopped,
            local_addr: None,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
            coordinator,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind `0.0.0.0:{port}` and spawn the accept loop.
    ///
    /// # Errors
    ///
    /// Fails if the port cannot be bound; the server is then in `Error` state.
    pub async fn start(&mut self) -> Result<()> {
        if self.status == ServerStatus::Running {
            debug!(port = self.port, "print server already running");
            return Ok(());
        }

        self.status = ServerStatus::Starting;

        let bind_addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.status = ServerStatus::Error;
                error!(addr = %bind_addr, error = %e, "cannot bind print server");
                return Err(HtmlPrintError::Server(format!("bind {bind_addr}: {e}")));
            }
        };
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        info!(addr = %local_addr, "print server listening");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let connections = Arc::clone(&self.active_connections);
        let coordinator = Arc::clone(&self.coordinator);

        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, connections, coordinator).await;
        });

        self.task_handle = Some(handle);
        self.status = ServerStatus::Running;
        Ok(())
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// Open connections and in-flight requests run to completion.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }

        info!(port = self.port, "stopping print server");
        self.shutdown_signal.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| HtmlPrintError::Server(format!("task join: {e}")))?;
        }

        self.status = ServerStatus::Stopped;
        self.local_addr = None;
        info!(port = self.port, "print server stopped");
        Ok(())
    }

    async fn accept_loop(
        listener: TcpListener,
        shutdown: Arc<Notify>,
        connections: Arc<AtomicU32>,
        coordinator: Arc<RequestCoordinator>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "incoming connection");
                            let connections = Arc::clone(&connections);
                            let coordinator = Arc::clone(&coordinator);
                            tokio::spawn(async move {
                                connections.fetch_add(1, Ordering::Relaxed);
                                let served =
                                    Self::handle_connection(stream, peer_addr, coordinator).await;
                                if let Err(e) = served {
                                    warn!(peer = %peer_addr, error = %e, "connection failed");
                                }
                                connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        }
                    }
                }
            }
        }
    }

    /// Serve one WebSocket connection until the peer closes it.
    async fn handle_connection(
        stream: TcpStream,
        peer_addr: SocketAddr,
        coordinator: Arc<RequestCoordinator>,
    ) -> Result<()> {
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| HtmlPrintError::Server(format!("handshake with {peer_addr}: {e}")))?;
        info!(peer = %peer_addr, "client connected");

        let (mut sink, mut source) = ws.split();
        let (tx, mut rx) = mpsc::channel::<StatusEvent>(OUTBOUND_BUFFER);

        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let json = match event.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error = %e, "cannot encode status event");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json)).await {
                    debug!(peer = %peer_addr, error = %e, "connection no longer writable");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        while let Some(frame) = source.next().await {
            let message = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "connection error");
                    let err = HtmlPrintError::Server(e.to_string());
                    let _ = tx
                        .send(StatusEvent::rejected(PrinterStatus::Error, err.to_string()))
                        .await;
                    break;
                }
            };

            debug!(peer = %peer_addr, bytes = message.len(), "request received");
            let coordinator = Arc::clone(&coordinator);
            let events = tx.clone();
            tokio::spawn(async move { coordinator.handle(message, events).await });
        }

        // The writer drains until every in-flight request has sent its
        // terminal event.
        drop(tx);
        writer
            .await
            .map_err(|e| HtmlPrintError::Server(format!("writer task: {e}")))?;

        info!(peer = %peer_addr, "client disconnected");
        Ok(())
    }
}
