//! The listener and inbound message path.
//!
//! Each accepted connection carries one message frame and is handled
//! by its own task. Attribution never relies on the source address:
//! the frame's cleartext convo-id header selects the chat key, and the
//! sender identity rides inside the sealed payload, authenticated by
//! the AEAD tag.
//!
//! Failure handling per frame, never fatal to the listener:
//!
//! - unknown convo id — dropped **without decrypting** (no key) and
//!   surfaced as an unrecognized-sender event
//! - integrity failure — dropped, not stored, surfaced as an
//!   integrity-failure event
//! - sender mismatch against the conversation's counterpart — dropped
//! - blocked sender — dropped silently (inbound moderation gate)

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use veilchat_crypto::aead::open;
use veilchat_proto::envelope::{MessageFrame, MessagePayload};
use veilchat_types::{NodeEvent, Result, Timestamp, VeilchatError};

use crate::moderation::Direction;
use crate::node::NodeContext;
use crate::transport::read_bounded;

// ---------------------------------------------------------------------------
// Listener loop
// ---------------------------------------------------------------------------

/// Accepts inbound message connections until shutdown.
pub(crate) async fn run_listener(
    listener: TcpListener,
    ctx: Arc<NodeContext>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move {
                            if let Err(e) = handle_message(stream, peer_addr, &ctx).await {
                                tracing::debug!(%peer_addr, %e, "inbound message dropped");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(%e, "accept failed");
                    }
                }
            }

            changed = shutdown_rx.changed() => {
                // A dropped sender counts as shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::debug!("listener exiting");
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-message handler
// ---------------------------------------------------------------------------

/// Reads, attributes, decrypts, gates, and persists one message.
async fn handle_message(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: &Arc<NodeContext>,
) -> Result<()> {
    let bytes = read_bounded(&mut stream, ctx.transport.max_frame_bytes()).await?;
    let frame = MessageFrame::decode(&bytes)?;

    // Unknown conversation: no key, so drop without decrypting.
    let Some((key, peer)) = ctx.table.conversation(&frame.convo_id) else {
        tracing::warn!(%peer_addr, convo_id = %frame.convo_id, "unrecognized sender");
        let _ = ctx
            .event_tx
            .try_send(NodeEvent::UnrecognizedSender { addr: peer_addr });
        return Ok(());
    };

    let plaintext = match open(&key, &frame.ciphertext, &MessageFrame::aad(&frame.convo_id)) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            tracing::warn!(%peer_addr, convo_id = %frame.convo_id, %e, "inbound frame failed integrity check");
            let _ = ctx.event_tx.try_send(NodeEvent::IntegrityFailed {
                convo_id: frame.convo_id,
                addr: peer_addr,
            });
            return Err(e);
        }
    };
    let payload = MessagePayload::decode(&plaintext)?;

    // The sealed sender must be the conversation's counterpart.
    if payload.sender != peer {
        return Err(VeilchatError::Protocol {
            reason: format!(
                "payload sender '{}' does not match conversation counterpart '{peer}'",
                payload.sender
            ),
        });
    }

    // Inbound moderation gate: blocked senders are dropped silently.
    if !ctx
        .moderation
        .is_deliverable(&payload.sender, Direction::Inbound)
    {
        tracing::debug!(sender = %payload.sender, "inbound message gated by moderation state");
        return Ok(());
    }

    ctx.log.append(
        frame.convo_id,
        payload.sender.clone(),
        &payload.body_text(),
        Timestamp::now(),
    )?;

    tracing::debug!(sender = %payload.sender, convo_id = %frame.convo_id, "message received");
    let _ = ctx.event_tx.try_send(NodeEvent::MessageReceived {
        convo_id: frame.convo_id,
        sender: payload.sender,
    });
    Ok(())
}
