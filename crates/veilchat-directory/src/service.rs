//! TCP front-end for the peer directory.
//!
//! Each accepted connection is served by its own tokio task and
//! carries exactly one request: read until the peer half-closes (or
//! the byte cap trips), parse, dispatch against the directory, reply
//! if the request was a `DISCOVER`, close. No connection reuse, no
//! pipelining.
//!
//! A malformed request drops its own connection without touching
//! directory state; the accept loop keeps running across any single
//! connection failure.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use veilchat_proto::request::DirectoryRequest;
use veilchat_proto::snapshot::encode_snapshot;
use veilchat_types::config::DirectoryConfig;
use veilchat_types::{Result, VeilchatError};

use crate::directory::PeerDirectory;

// ---------------------------------------------------------------------------
// DiscoveryService
// ---------------------------------------------------------------------------

/// Accept loop + reaper around a [`PeerDirectory`].
pub struct DiscoveryService {
    listener: TcpListener,
    directory: Arc<PeerDirectory>,
    config: DirectoryConfig,
    shutdown_rx: watch::Receiver<bool>,
}

/// Handle for signalling service shutdown.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signals the service to stop accepting and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl DiscoveryService {
    /// Binds the listener and prepares the service.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::Config`] on invalid configuration,
    /// [`VeilchatError::Network`] if the bind fails.
    pub async fn bind(config: DirectoryConfig) -> Result<(Self, ShutdownHandle)> {
        config.validate()?;
        let bind_addr = config.bind_addr()?;

        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| VeilchatError::Network {
                reason: format!("failed to bind {bind_addr}: {e}"),
            })?;

        let (tx, shutdown_rx) = watch::channel(false);

        Ok((
            Self {
                listener,
                directory: Arc::new(PeerDirectory::new()),
                config,
                shutdown_rx,
            },
            ShutdownHandle { tx },
        ))
    }

    /// The actual bound address (useful when the port was 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| VeilchatError::Network {
                reason: format!("failed to read local address: {e}"),
            })
    }

    /// Shared handle to the directory (tests and metrics).
    pub fn directory(&self) -> Arc<PeerDirectory> {
        Arc::clone(&self.directory)
    }

    /// Runs the accept loop and the stale-entry reaper until shutdown
    /// is signalled.
    pub async fn run(mut self) {
        let mut reap_tick =
            tokio::time::interval(Duration::from_secs(self.config.reap_interval_secs));
        // The first tick fires immediately; harmless for a reaper.
        let ttl = Duration::from_secs(self.config.peer_ttl_secs);

        tracing::info!(
            ttl_secs = self.config.peer_ttl_secs,
            "discovery service running"
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            let directory = Arc::clone(&self.directory);
                            let max_bytes = self.config.max_request_bytes;
                            tokio::spawn(async move {
                                if let Err(e) =
                                    handle_connection(stream, peer_addr, &directory, max_bytes).await
                                {
                                    tracing::debug!(%peer_addr, %e, "request rejected");
                                }
                            });
                        }
                        Err(e) => {
                            // Transient accept errors (EMFILE, resets) must
                            // not kill the service.
                            tracing::warn!(%e, "accept failed");
                        }
                    }
                }

                _ = reap_tick.tick() => {
                    let reaped = self.directory.reap_stale(ttl);
                    if reaped > 0 {
                        tracing::info!(reaped, remaining = self.directory.len(), "reaped stale peers");
                    }
                }

                changed = self.shutdown_rx.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        tracing::info!("shutdown signal received -- stopping discovery service");
                        break;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

/// Serves one request on one connection.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    directory: &PeerDirectory,
    max_request_bytes: usize,
) -> Result<()> {
    let raw = read_request(&mut stream, max_request_bytes).await?;
    let line = std::str::from_utf8(&raw).map_err(|_| VeilchatError::Protocol {
        reason: "request is not UTF-8".into(),
    })?;

    match DirectoryRequest::parse(line)? {
        DirectoryRequest::Discover { username } => {
            let body = encode_snapshot(&directory.snapshot());
            tracing::debug!(%username, peers = directory.len(), "discover");
            stream
                .write_all(body.as_bytes())
                .await
                .map_err(|e| VeilchatError::Network {
                    reason: format!("failed to write snapshot: {e}"),
                })?;
            let _ = stream.shutdown().await;
        }
        DirectoryRequest::Keepalive {
            username,
            listen_port,
        } => {
            // Host comes from the connection, never from the client;
            // the port is the advertised listener, falling back to the
            // observed source port for older clients.
            let port = listen_port.unwrap_or_else(|| peer_addr.port());
            let addr = SocketAddr::new(peer_addr.ip(), port);
            tracing::debug!(%username, %addr, "keepalive");
            directory.register(username, addr);
        }
    }

    Ok(())
}

/// Reads the request line, bounded by `max` bytes.
///
/// Stops at the first newline or at EOF; errors if the cap is reached
/// without either.
async fn read_request(stream: &mut TcpStream, max: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(128);
    let mut chunk = [0u8; 256];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| VeilchatError::Network {
                reason: format!("request read failed: {e}"),
            })?;
        if n == 0 {
            return Ok(buf);
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.iter().any(|&b| b == b'\n') {
            return Ok(buf);
        }
        if buf.len() > max {
            return Err(VeilchatError::Protocol {
                reason: format!("request exceeds {max} bytes"),
            });
        }
    }
}
