//! Core shared types for the Veilchat peer-to-peer chat system.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

pub mod config;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Username
// ---------------------------------------------------------------------------

/// Self-declared peer label used throughout the discovery protocol.
///
/// Usernames are **unauthenticated** — the directory accepts whatever
/// label a peer claims. Validation here is purely about wire safety:
/// the discovery protocol is colon- and line-oriented, so a username
/// may not contain `:` or control characters.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Maximum username length in bytes.
    pub const MAX_LEN: usize = 64;

    /// Creates a validated username.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::InvalidUsername`] if the label is empty, longer
    /// than [`MAX_LEN`](Self::MAX_LEN) bytes, or contains `:` or ASCII
    /// control characters.
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        if label.is_empty() {
            return Err(VeilchatError::InvalidUsername {
                reason: "username must not be empty".into(),
            });
        }
        if label.len() > Self::MAX_LEN {
            return Err(VeilchatError::InvalidUsername {
                reason: format!(
                    "username exceeds {} bytes (got {})",
                    Self::MAX_LEN,
                    label.len()
                ),
            });
        }
        if label.contains(':') {
            return Err(VeilchatError::InvalidUsername {
                reason: "username must not contain ':'".into(),
            });
        }
        if label.chars().any(|c| c.is_ascii_control()) {
            return Err(VeilchatError::InvalidUsername {
                reason: "username must not contain control characters".into(),
            });
        }
        Ok(Self(label))
    }

    /// Returns the label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Username {
    type Err = VeilchatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Username {
    type Error = VeilchatError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Username> for String {
    fn from(u: Username) -> Self {
        u.0
    }
}

// ---------------------------------------------------------------------------
// ConvoId
// ---------------------------------------------------------------------------

/// Conversation identifier: truncated SHA-256 fingerprint of the chat key.
///
/// Safe to transmit and store in the clear — it reveals nothing about
/// the key itself, and both ends of a conversation derive the same id
/// from their shared key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ConvoId([u8; 16]);

impl ConvoId {
    /// The fixed byte length of a conversation id.
    pub const LEN: usize = 16;

    /// Creates a new `ConvoId` from raw bytes.
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for ConvoId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ConvoId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ConvoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ConvoId {
    type Err = VeilchatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| VeilchatError::Protocol {
            reason: "invalid hex encoding for conversation id".into(),
        })?;
        if bytes.len() != Self::LEN {
            return Err(VeilchatError::Protocol {
                reason: format!(
                    "expected {} bytes for conversation id, got {}",
                    Self::LEN,
                    bytes.len()
                ),
            });
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// UTC wall-clock timestamp.
///
/// Used for stored messages and mute expiry. All timestamps are UTC so
/// behaviour does not depend on the local timezone.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` representing the current UTC time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Creates a `Timestamp` from milliseconds since the Unix epoch.
    pub fn from_millis(millis: i64) -> Result<Self> {
        let dt = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            VeilchatError::Config {
                reason: format!("invalid timestamp millis: {millis}"),
            }
        })?;
        Ok(Self(dt))
    }

    /// Returns the timestamp as milliseconds since the Unix epoch.
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Returns the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns this timestamp shifted forward by `secs` seconds.
    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0 + Duration::seconds(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl FromStr for Timestamp {
    type Err = VeilchatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| VeilchatError::Config {
                reason: format!("invalid RFC 3339 timestamp: {e}"),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }
}

// ---------------------------------------------------------------------------
// PeerRecord
// ---------------------------------------------------------------------------

/// One directory entry: a username and its last-known network address.
///
/// Owned values only — the directory hands out copies, never references
/// into its own map.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Self-declared peer label.
    pub username: Username,
    /// Last-known listening address.
    pub addr: SocketAddr,
}

// ---------------------------------------------------------------------------
// NodeEvent
// ---------------------------------------------------------------------------

/// Events emitted by the node runtime to its embedder (daemon, tests).
#[derive(Clone, Debug)]
pub enum NodeEvent {
    /// A message was received, decrypted, and stored.
    MessageReceived {
        /// Conversation the message belongs to.
        convo_id: ConvoId,
        /// Sender username as carried in the encrypted payload.
        sender: Username,
    },
    /// An outbound message was suppressed by the moderation gate.
    MessageSuppressed {
        /// The recipient whose block/mute state suppressed the send.
        recipient: Username,
    },
    /// An outbound delivery attempt failed; the message remains in
    /// local storage only.
    DeliveryFailed {
        /// Intended recipient.
        recipient: Username,
        /// Human-readable failure description.
        reason: String,
    },
    /// An inbound frame named a known conversation but failed
    /// decryption — tampered, truncated, or sealed under another key.
    /// The message was dropped and never stored.
    IntegrityFailed {
        /// Conversation named by the frame's cleartext header.
        convo_id: ConvoId,
        /// Source address of the dropped connection.
        addr: SocketAddr,
    },
    /// An inbound connection could not be matched to any conversation.
    UnrecognizedSender {
        /// Source address of the dropped connection.
        addr: SocketAddr,
    },
    /// A discovery snapshot was applied to the peer table.
    SnapshotApplied {
        /// Number of conversations whose address was updated.
        peers: usize,
    },
}

// ---------------------------------------------------------------------------
// VeilchatError
// ---------------------------------------------------------------------------

/// Central error type for the Veilchat system.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum. None of these are fatal to a running process:
/// the discovery service and node background loops keep running across
/// any single request or connection failure.
#[derive(Debug, Error)]
pub enum VeilchatError {
    /// A username failed validation.
    #[error("invalid username: {reason}")]
    InvalidUsername {
        /// Human-readable description of the validation failure.
        reason: String,
    },

    /// A malformed request or frame on the wire. The offending
    /// connection is dropped without any state change.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Human-readable description of the protocol failure.
        reason: String,
    },

    /// Decryption failed: the ciphertext was not produced under the
    /// same key (tampered, truncated, or wrong key). The message is
    /// dropped and never stored.
    #[error("integrity error: {reason}")]
    Integrity {
        /// Human-readable description of the integrity failure.
        reason: String,
    },

    /// An outbound connection to a peer failed. The message remains
    /// only in local storage; there is no automatic retry.
    #[error("peer unreachable: {reason}")]
    UnreachablePeer {
        /// Human-readable description of the connection failure.
        reason: String,
    },

    /// An inbound connection could not be matched to a known
    /// conversation. Dropped without decrypting.
    #[error("unrecognized sender: {reason}")]
    UnrecognizedSender {
        /// Human-readable description of the mismatch.
        reason: String,
    },

    /// A chat key or counterpart is already bound to a different
    /// conversation. Reusing a chat key for another counterpart is
    /// rejected, never silently accepted.
    #[error("conversation conflict: {reason}")]
    ConversationConflict {
        /// Human-readable description of the conflict.
        reason: String,
    },

    /// A storage or database operation failed.
    #[error("storage error: {reason}")]
    Storage {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A networking operation failed outside the unreachable-peer path
    /// (bind, accept, read).
    #[error("network error: {reason}")]
    Network {
        /// Human-readable description of the network failure.
        reason: String,
    },

    /// A configuration value is invalid, or a lifecycle transition was
    /// attempted out of order.
    #[error("config error: {reason}")]
    Config {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`VeilchatError`].
pub type Result<T> = std::result::Result<T, VeilchatError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
