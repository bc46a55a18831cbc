//! Append-only per-conversation message log.
//!
//! Messages are keyed as `convo_id(16) || timestamp_millis_be(8) ||
//! seq_be(8)` so sled's lexicographic iterator yields each
//! conversation's messages in timestamp-ascending order via prefix
//! scan. The sequence component comes from sled's monotonic ID
//! generator, so two appends within the same millisecond never collide.
//!
//! The log is strictly append-only from the core's point of view:
//! records are never mutated or deleted here.

use serde::{Deserialize, Serialize};
use veilchat_types::{ConvoId, Result, Timestamp, Username, VeilchatError};

/// Full key length: convo id + timestamp + sequence.
const KEY_LEN: usize = ConvoId::LEN + 8 + 8;

// ---------------------------------------------------------------------------
// StoredMessage
// ---------------------------------------------------------------------------

/// One persisted plaintext message.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Conversation the message belongs to.
    pub convo_id: ConvoId,
    /// Username of the message author (self for outbound, the
    /// counterpart for inbound).
    pub sender: Username,
    /// Message body as UTF-8 text.
    pub body: String,
    /// Wall-clock time of the encrypt-or-decrypt, millis since epoch.
    pub timestamp_millis: i64,
}

// ---------------------------------------------------------------------------
// MessageLog
// ---------------------------------------------------------------------------

/// Append-only message log backed by a sled tree.
///
/// Cheap to clone — sled handles are reference-counted.
#[derive(Clone)]
pub struct MessageLog {
    db: sled::Db,
    tree: sled::Tree,
}

impl MessageLog {
    /// Creates a log over an opened tree (crate-internal; obtain via
    /// [`StorageEngine::messages`](crate::engine::StorageEngine::messages)).
    pub(crate) fn new(db: sled::Db, tree: sled::Tree) -> Self {
        Self { db, tree }
    }

    /// Appends one message.
    pub fn append(
        &self,
        convo_id: ConvoId,
        sender: Username,
        body: &str,
        timestamp: Timestamp,
    ) -> Result<()> {
        let seq = self.db.generate_id().map_err(|e| VeilchatError::Storage {
            reason: format!("failed to generate sequence id: {e}"),
        })?;
        let key = build_key(&convo_id, timestamp.as_millis(), seq);

        let record = StoredMessage {
            convo_id,
            sender,
            body: body.to_owned(),
            timestamp_millis: timestamp.as_millis(),
        };
        let value = bincode::serialize(&record).map_err(|e| VeilchatError::Storage {
            reason: format!("failed to serialize message: {e}"),
        })?;

        self.tree
            .insert(key, value)
            .map_err(|e| VeilchatError::Storage {
                reason: format!("sled insert failed: {e}"),
            })?;
        Ok(())
    }

    /// Retrieves messages for a conversation, timestamp-ascending,
    /// with limit and offset.
    pub fn messages_for(
        &self,
        convo_id: &ConvoId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredMessage>> {
        let mut out = Vec::new();
        for item in self
            .tree
            .scan_prefix(convo_id.as_bytes())
            .skip(offset)
            .take(limit)
        {
            let (_, value) = item.map_err(|e| VeilchatError::Storage {
                reason: format!("sled scan failed: {e}"),
            })?;
            let record: StoredMessage =
                bincode::deserialize(&value).map_err(|e| VeilchatError::Storage {
                    reason: format!("failed to deserialize message: {e}"),
                })?;
            out.push(record);
        }
        Ok(out)
    }

    /// Returns the total message count for a conversation.
    pub fn count(&self, convo_id: &ConvoId) -> Result<u64> {
        let mut count = 0u64;
        for item in self.tree.scan_prefix(convo_id.as_bytes()) {
            item.map_err(|e| VeilchatError::Storage {
                reason: format!("sled scan failed: {e}"),
            })?;
            count += 1;
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Key construction
// ---------------------------------------------------------------------------

/// Builds a 32-byte message key:
/// `convo_id(16) || timestamp_millis_be(8) || seq_be(8)`.
fn build_key(convo_id: &ConvoId, timestamp_millis: i64, seq: u64) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    key[..ConvoId::LEN].copy_from_slice(convo_id.as_bytes());
    key[ConvoId::LEN..ConvoId::LEN + 8].copy_from_slice(&timestamp_millis.to_be_bytes());
    key[ConvoId::LEN + 8..].copy_from_slice(&seq.to_be_bytes());
    key
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
