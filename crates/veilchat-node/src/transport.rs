//! One-shot message connections.
//!
//! Every message travels on its own short-lived TCP connection: open,
//! write the frame, close. The connection boundary *is* the frame
//! boundary — there is no length prefix, so all reads are bounded by a
//! configured byte cap to keep buffering finite.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use veilchat_types::{Result, VeilchatError};

// ---------------------------------------------------------------------------
// MessageTransport
// ---------------------------------------------------------------------------

/// Opens outbound one-shot connections to peers.
pub struct MessageTransport {
    connect_timeout: Duration,
    max_frame_bytes: usize,
}

impl MessageTransport {
    /// Creates a transport with the given connect timeout and frame cap.
    pub fn new(connect_timeout: Duration, max_frame_bytes: usize) -> Self {
        Self {
            connect_timeout,
            max_frame_bytes,
        }
    }

    /// The configured frame cap, shared with the inbound path.
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Delivers one encoded frame to `addr` and closes the connection.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::UnreachablePeer`] if the connection cannot be
    /// established (refused, timed out) or the write fails. There is
    /// no automatic retry.
    pub async fn deliver(&self, addr: SocketAddr, frame: &[u8]) -> Result<()> {
        let connect = TcpStream::connect(addr);
        let mut stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| VeilchatError::UnreachablePeer {
                reason: format!("connect to {addr} timed out"),
            })?
            .map_err(|e| VeilchatError::UnreachablePeer {
                reason: format!("connect to {addr} failed: {e}"),
            })?;

        stream
            .write_all(frame)
            .await
            .map_err(|e| VeilchatError::UnreachablePeer {
                reason: format!("write to {addr} failed: {e}"),
            })?;
        let _ = stream.shutdown().await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bounded reads
// ---------------------------------------------------------------------------

/// Reads a stream to EOF with a hard byte cap.
///
/// # Errors
///
/// [`VeilchatError::Network`] on an I/O failure,
/// [`VeilchatError::Protocol`] if the peer sends more than `max` bytes.
pub async fn read_bounded(stream: &mut TcpStream, max: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| VeilchatError::Network {
                reason: format!("read failed: {e}"),
            })?;
        if n == 0 {
            return Ok(buf);
        }
        if buf.len() + n > max {
            return Err(VeilchatError::Protocol {
                reason: format!("frame exceeds {max} bytes"),
            });
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn delivers_one_frame() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let transport = MessageTransport::new(Duration::from_secs(2), 1024);
        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            read_bounded(&mut stream, 1024).await
        });

        transport.deliver(addr, b"frame bytes").await?;
        let received = accept.await.expect("join")?;
        assert_eq!(received, b"frame bytes");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_peer_is_typed_error() {
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("local addr")
        };

        let transport = MessageTransport::new(Duration::from_secs(2), 1024);
        let err = transport.deliver(addr, b"frame").await.unwrap_err();
        assert!(matches!(err, VeilchatError::UnreachablePeer { .. }));
    }

    #[tokio::test]
    async fn read_bounded_enforces_cap() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.expect("connect");
            stream.write_all(&[0u8; 2048]).await.expect("write");
            let _ = stream.shutdown().await;
        });

        let (mut stream, _) = listener.accept().await.expect("accept");
        let err = read_bounded(&mut stream, 1024).await.unwrap_err();
        assert!(matches!(err, VeilchatError::Protocol { .. }));
    }
}
