//! Client-side view of conversations and peer addresses.
//!
//! One entry per conversation: the chat key, the counterpart's
//! username, and the counterpart's last-known address as learned from
//! discovery snapshots. A chat key uniquely determines exactly one
//! counterpart for the lifetime of the conversation — reusing a key
//! for a different counterpart is rejected, never silently accepted.
//!
//! Thread-safe via a single `std::sync::Mutex` around both indexes so
//! they can never disagree.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use veilchat_crypto::key::ChatKey;
use veilchat_types::{ConvoId, PeerRecord, Result, Username, VeilchatError};

// ---------------------------------------------------------------------------
// ConvoEntry
// ---------------------------------------------------------------------------

/// One conversation as the local node sees it.
struct ConvoEntry {
    /// Shared symmetric key for this conversation.
    key: ChatKey,
    /// The counterpart's username.
    peer: Username,
    /// Last-known address; `None` until a discovery cycle supplies one.
    addr: Option<SocketAddr>,
}

// ---------------------------------------------------------------------------
// PeerTable
// ---------------------------------------------------------------------------

/// Conversation registry keyed by conversation id, with a username
/// index for the outbound path.
pub struct PeerTable {
    /// Own username; snapshot records for self are ignored.
    self_username: Username,
    inner: Mutex<Inner>,
}

struct Inner {
    by_convo: HashMap<ConvoId, ConvoEntry>,
    by_user: HashMap<Username, ConvoId>,
}

impl PeerTable {
    /// Creates an empty table for the given local identity.
    pub fn new(self_username: Username) -> Self {
        Self {
            self_username,
            inner: Mutex::new(Inner {
                by_convo: HashMap::new(),
                by_user: HashMap::new(),
            }),
        }
    }

    /// Registers a conversation: the shared key and its counterpart.
    ///
    /// Idempotent for an identical (key, peer) pair. Returns the
    /// derived conversation id.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::ConversationConflict`] if the key is already
    /// bound to a different counterpart, or the counterpart already
    /// has a different key.
    pub fn add_conversation(&self, key: ChatKey, peer: Username) -> Result<ConvoId> {
        if peer == self.self_username {
            return Err(VeilchatError::ConversationConflict {
                reason: "cannot open a conversation with yourself".into(),
            });
        }

        let convo_id = key.convo_id();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = inner.by_convo.get(&convo_id) {
            if existing.peer != peer {
                return Err(VeilchatError::ConversationConflict {
                    reason: format!(
                        "chat key {convo_id} is already bound to '{}'",
                        existing.peer
                    ),
                });
            }
            // Same key, same counterpart: nothing to do.
            return Ok(convo_id);
        }

        if let Some(other) = inner.by_user.get(&peer) {
            return Err(VeilchatError::ConversationConflict {
                reason: format!("'{peer}' is already bound to conversation {other}"),
            });
        }

        inner.by_user.insert(peer.clone(), convo_id);
        inner.by_convo.insert(
            convo_id,
            ConvoEntry {
                key,
                peer,
                addr: None,
            },
        );
        Ok(convo_id)
    }

    /// Looks up the counterpart's last-known address.
    ///
    /// `None` means no message can be sent until the next successful
    /// discovery cycle.
    pub fn resolve(&self, username: &Username) -> Option<SocketAddr> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let convo_id = inner.by_user.get(username)?;
        inner.by_convo.get(convo_id)?.addr
    }

    /// Applies a discovery snapshot. Last snapshot wins per username —
    /// the same policy the directory applies on its side.
    ///
    /// Records for unknown usernames and for self are ignored. Returns
    /// the number of conversations whose address was set.
    pub fn apply_snapshot(&self, records: &[PeerRecord]) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut applied = 0;
        for record in records {
            if record.username == self.self_username {
                continue;
            }
            let Some(convo_id) = inner.by_user.get(&record.username).copied() else {
                continue;
            };
            if let Some(entry) = inner.by_convo.get_mut(&convo_id) {
                entry.addr = Some(record.addr);
                applied += 1;
            }
        }
        applied
    }

    /// Looks up the key and counterpart for an inbound frame.
    pub fn conversation(&self, convo_id: &ConvoId) -> Option<(ChatKey, Username)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .by_convo
            .get(convo_id)
            .map(|entry| (entry.key.clone(), entry.peer.clone()))
    }

    /// Looks up the conversation id and key for an outbound send.
    pub fn conversation_for(&self, peer: &Username) -> Option<(ConvoId, ChatKey)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let convo_id = *inner.by_user.get(peer)?;
        inner
            .by_convo
            .get(&convo_id)
            .map(|entry| (convo_id, entry.key.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
