//! Per-conversation symmetric chat keys.
//!
//! A [`ChatKey`] is the shared secret that both identifies and secures
//! exactly one conversation. It is generated once by either party and
//! distributed through an out-of-band channel this crate does not
//! implement (the hex encoding exists for that hand-off). One static
//! key per conversation for its lifetime — no rotation, no forward
//! secrecy.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use veilchat_types::{ConvoId, Result, VeilchatError};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Domain separator for conversation-id fingerprinting, so a fingerprint
/// can never collide with any other SHA-256 use of the key bytes.
const CONVO_ID_DOMAIN: &[u8] = b"veilchat-convo-id-v1";

// ---------------------------------------------------------------------------
// ChatKey
// ---------------------------------------------------------------------------

/// 256-bit symmetric key shared by exactly two parties.
///
/// Key material is zeroized on drop. `Debug` and `Display` render only
/// the conversation-id fingerprint, never the key bytes.
#[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct ChatKey([u8; 32]);

impl ChatKey {
    /// The fixed byte length of a chat key.
    pub const LEN: usize = 32;

    /// Generates a fresh key from OS entropy.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hex encoding for out-of-band transfer to the counterpart.
    pub fn encode(&self) -> String {
        hex::encode(self.0)
    }

    /// Decodes a key from its out-of-band hex form.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::Config`] if the string is not exactly 64 hex
    /// characters.
    pub fn decode(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|_| VeilchatError::Config {
            reason: "chat key must be hex-encoded".into(),
        })?;
        if bytes.len() != Self::LEN {
            return Err(VeilchatError::Config {
                reason: format!(
                    "chat key must be {} bytes, got {}",
                    Self::LEN,
                    bytes.len()
                ),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Derives the conversation id: domain-separated SHA-256 of the key,
    /// truncated to 16 bytes.
    ///
    /// Both parties derive the same id from the shared key, so it serves
    /// as the cleartext conversation label on the wire.
    pub fn convo_id(&self) -> ConvoId {
        let mut hasher = Sha256::new();
        hasher.update(CONVO_ID_DOMAIN);
        hasher.update(self.0);
        let digest = hasher.finalize();
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest[..16]);
        ConvoId::new(id)
    }

    /// Returns the raw key bytes (crate-internal; only the AEAD layer
    /// touches key material).
    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ChatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChatKey({})", self.convo_id())
    }
}

impl fmt::Display for ChatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.convo_id())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let a = ChatKey::generate();
        let b = ChatKey::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn hex_roundtrip() -> Result<()> {
        let key = ChatKey::generate();
        let decoded = ChatKey::decode(&key.encode())?;
        assert_eq!(key, decoded);
        Ok(())
    }

    #[test]
    fn decode_trims_whitespace() -> Result<()> {
        let key = ChatKey::generate();
        let padded = format!("  {}\n", key.encode());
        assert_eq!(ChatKey::decode(&padded)?, key);
        Ok(())
    }

    #[test]
    fn decode_rejects_short_input() {
        assert!(ChatKey::decode("abcd").is_err());
    }

    #[test]
    fn decode_rejects_non_hex() {
        let not_hex = "zz".repeat(32);
        assert!(ChatKey::decode(&not_hex).is_err());
    }

    #[test]
    fn convo_id_is_deterministic() {
        let key = ChatKey::from_bytes([7u8; 32]);
        assert_eq!(key.convo_id(), key.convo_id());
    }

    #[test]
    fn convo_id_differs_per_key() {
        let a = ChatKey::from_bytes([1u8; 32]);
        let b = ChatKey::from_bytes([2u8; 32]);
        assert_ne!(a.convo_id(), b.convo_id());
    }

    #[test]
    fn debug_hides_key_bytes() {
        let key = ChatKey::from_bytes([0x41u8; 32]);
        let rendered = format!("{key:?}");
        assert!(!rendered.contains(&hex::encode([0x41u8; 32])));
    }
}
