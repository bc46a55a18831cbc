//! Client side of the discovery protocol, plus the refresh loop.
//!
//! One request per connection, mirroring the service: keepalives are
//! fire-and-close, discovers read the snapshot until the service
//! closes the connection.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use veilchat_proto::request::DirectoryRequest;
use veilchat_proto::snapshot::parse_snapshot;
use veilchat_types::{NodeEvent, PeerRecord, Result, Username, VeilchatError};

use crate::transport::read_bounded;

// ---------------------------------------------------------------------------
// DiscoveryClient
// ---------------------------------------------------------------------------

/// Talks to the rendezvous directory on behalf of one node.
pub struct DiscoveryClient {
    /// Directory address as `host:port`.
    directory_addr: String,
    /// Own username, sent with every request.
    username: Username,
    /// Listening port advertised in keepalives. Atomic so a node that
    /// binds an ephemeral port can publish the real one after binding.
    listen_port: AtomicU16,
    connect_timeout: Duration,
    max_response_bytes: usize,
}

impl DiscoveryClient {
    /// Creates a client for the given directory and identity.
    pub fn new(
        directory_addr: String,
        username: Username,
        listen_port: u16,
        connect_timeout: Duration,
        max_response_bytes: usize,
    ) -> Self {
        Self {
            directory_addr,
            username,
            listen_port: AtomicU16::new(listen_port),
            connect_timeout,
            max_response_bytes,
        }
    }

    /// Updates the advertised listening port, after an ephemeral bind.
    pub fn set_listen_port(&self, port: u16) {
        self.listen_port.store(port, Ordering::Relaxed);
    }

    /// Registers or refreshes this node's directory entry.
    pub async fn keepalive(&self) -> Result<()> {
        let request = DirectoryRequest::Keepalive {
            username: self.username.clone(),
            listen_port: Some(self.listen_port.load(Ordering::Relaxed)),
        };
        let mut stream = self.connect().await?;
        self.send_line(&mut stream, &request).await?;
        // No response; closing ends the exchange.
        Ok(())
    }

    /// Fetches the full membership snapshot.
    pub async fn discover(&self) -> Result<Vec<PeerRecord>> {
        let request = DirectoryRequest::Discover {
            username: self.username.clone(),
        };
        let mut stream = self.connect().await?;
        self.send_line(&mut stream, &request).await?;

        let body = read_bounded(&mut stream, self.max_response_bytes).await?;
        let body = std::str::from_utf8(&body).map_err(|_| VeilchatError::Protocol {
            reason: "snapshot is not UTF-8".into(),
        })?;
        parse_snapshot(body)
    }

    async fn connect(&self) -> Result<TcpStream> {
        let connect = TcpStream::connect(&self.directory_addr);
        tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| VeilchatError::Network {
                reason: format!("connect to directory {} timed out", self.directory_addr),
            })?
            .map_err(|e| VeilchatError::Network {
                reason: format!("connect to directory {} failed: {e}", self.directory_addr),
            })
    }

    async fn send_line(&self, stream: &mut TcpStream, request: &DirectoryRequest) -> Result<()> {
        let line = format!("{}\n", request.encode());
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| VeilchatError::Network {
                reason: format!("directory write failed: {e}"),
            })?;
        // Half-close so the service sees the end of the request.
        let _ = stream.shutdown().await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Refresh loop
// ---------------------------------------------------------------------------

/// Keepalive + discover cycle, forever until shutdown.
///
/// Every tick sends a keepalive, then a discover, then applies the
/// snapshot to the peer table. No backoff, no jitter, no dedup of
/// identical snapshots; a failed cycle is logged and the next tick
/// tries again.
pub(crate) async fn run_refresh_loop(
    ctx: std::sync::Arc<crate::node::NodeContext>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let mut tick =
        tokio::time::interval(Duration::from_secs(ctx.config.keepalive_interval_secs));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(e) = ctx.discovery.keepalive().await {
                    tracing::warn!(%e, "keepalive failed");
                }

                match ctx.discovery.discover().await {
                    Ok(records) => {
                        let applied = ctx.table.apply_snapshot(&records);
                        tracing::debug!(
                            records = records.len(),
                            applied,
                            "discovery snapshot applied"
                        );
                        let _ = ctx.event_tx.try_send(NodeEvent::SnapshotApplied {
                            peers: applied,
                        });
                    }
                    Err(e) => tracing::warn!(%e, "discover failed"),
                }
            }

            changed = shutdown_rx.changed() => {
                // A dropped sender counts as shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::debug!("refresh loop exiting");
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use veilchat_directory::service::{DiscoveryService, ShutdownHandle};
    use veilchat_types::config::DirectoryConfig;

    /// The handle must outlive the test — dropping it shuts the
    /// service down.
    async fn start_directory() -> (String, ShutdownHandle) {
        let config = DirectoryConfig {
            bind_host: "127.0.0.1".into(),
            bind_port: 0,
            ..DirectoryConfig::default()
        };
        let (service, shutdown) = DiscoveryService::bind(config).await.expect("bind");
        let addr = service.local_addr().expect("local addr");
        tokio::spawn(service.run());
        (addr.to_string(), shutdown)
    }

    fn client(directory_addr: String, name: &str, port: u16) -> DiscoveryClient {
        DiscoveryClient::new(
            directory_addr,
            name.parse().expect("valid username"),
            port,
            Duration::from_secs(2),
            64 * 1024,
        )
    }

    #[tokio::test]
    async fn keepalive_then_discover_roundtrip() -> Result<()> {
        let (directory, _shutdown) = start_directory().await;

        client(directory.clone(), "alice", 9100).keepalive().await?;

        let records = client(directory, "bob", 9200).discover().await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username.as_str(), "alice");
        assert_eq!(records[0].addr.port(), 9100);
        Ok(())
    }

    #[tokio::test]
    async fn discover_against_dead_directory_fails() {
        // Bind then drop to get a dead port.
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind");
            listener.local_addr().expect("local addr").to_string()
        };

        let err = client(addr, "alice", 9100).discover().await.unwrap_err();
        assert!(matches!(err, VeilchatError::Network { .. }));
    }
}
