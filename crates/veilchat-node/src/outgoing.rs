//! The outbound message path.
//!
//! Ordering is deliberate: moderation gate, encrypt, persist the
//! plaintext locally (sender = self), resolve the recipient's address,
//! deliver. Persisting before the network touch means a failed
//! delivery still leaves the message in local storage, which is all
//! the reliability the base design promises — there is no automatic
//! retry.

use std::sync::Arc;

use veilchat_crypto::aead::seal;
use veilchat_proto::envelope::{MessageFrame, MessagePayload};
use veilchat_types::{NodeEvent, Result, Timestamp, Username, VeilchatError};

use crate::moderation::Direction;
use crate::node::NodeContext;

// ---------------------------------------------------------------------------
// SendOutcome
// ---------------------------------------------------------------------------

/// What happened to an outbound message.
///
/// A moderation gate is not an error — the caller gets a quiet
/// outcome, nothing more.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    /// The ciphertext was written to the peer's socket.
    Sent,
    /// The recipient is blocked or muted; nothing was sent or stored.
    Suppressed,
}

// ---------------------------------------------------------------------------
// Send path
// ---------------------------------------------------------------------------

/// Sends one message to a conversation counterpart.
///
/// # Errors
///
/// - [`VeilchatError::Config`] if no conversation exists for
///   `recipient` (no key to encrypt under).
/// - [`VeilchatError::UnreachablePeer`] if the recipient's address is
///   unknown or the connection fails; the message remains in local
///   storage either way.
pub(crate) async fn send_message(
    ctx: &Arc<NodeContext>,
    recipient: &Username,
    text: &str,
) -> Result<SendOutcome> {
    // 1. Moderation gate: silent suppression, no error surfaced.
    if !ctx.moderation.is_deliverable(recipient, Direction::Outbound) {
        tracing::debug!(%recipient, "send suppressed by moderation state");
        let _ = ctx.event_tx.try_send(NodeEvent::MessageSuppressed {
            recipient: recipient.clone(),
        });
        return Ok(SendOutcome::Suppressed);
    }

    // 2. Encrypt under the conversation key.
    let (convo_id, key) = ctx.table.conversation_for(recipient).ok_or_else(|| {
        VeilchatError::Config {
            reason: format!("no conversation configured for '{recipient}'"),
        }
    })?;
    let payload = MessagePayload {
        sender: ctx.config.username.clone(),
        body: text.as_bytes().to_vec(),
    };
    let ciphertext = seal(&key, &payload.encode(), &MessageFrame::aad(&convo_id))?;
    let frame = MessageFrame {
        convo_id,
        ciphertext,
    }
    .encode();

    // 3. Persist the plaintext, tagged with sender = self.
    ctx.log.append(
        convo_id,
        ctx.config.username.clone(),
        text,
        Timestamp::now(),
    )?;

    // 4. Resolve and deliver.
    let addr = match ctx.table.resolve(recipient) {
        Some(addr) => addr,
        None => {
            let reason = format!(
                "no known address for '{recipient}' until the next discovery cycle"
            );
            let _ = ctx.event_tx.try_send(NodeEvent::DeliveryFailed {
                recipient: recipient.clone(),
                reason: reason.clone(),
            });
            return Err(VeilchatError::UnreachablePeer { reason });
        }
    };

    if let Err(e) = ctx.transport.deliver(addr, &frame).await {
        let _ = ctx.event_tx.try_send(NodeEvent::DeliveryFailed {
            recipient: recipient.clone(),
            reason: e.to_string(),
        });
        return Err(e);
    }

    tracing::debug!(%recipient, %convo_id, bytes = frame.len(), "message delivered");
    Ok(SendOutcome::Sent)
}
