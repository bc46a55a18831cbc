//! XChaCha20-Poly1305 authenticated encryption for message payloads.
//!
//! Every sealed payload is framed as `nonce(24) || ciphertext+tag`.
//! Nonces are generated from OS entropy per call and **must never be
//! reused** with the same key; the 192-bit space makes accidental
//! collision negligible.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use veilchat_types::{Result, VeilchatError};

use crate::key::ChatKey;

/// Size of the XChaCha20-Poly1305 nonce prepended to every frame.
pub const NONCE_LEN: usize = 24;

/// Size of the Poly1305 authentication tag appended by the cipher.
pub const TAG_LEN: usize = 16;

/// Smallest possible sealed frame: nonce + tag around an empty payload.
pub const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// Seal / Open
// ---------------------------------------------------------------------------

/// Encrypts `plaintext` under the conversation key.
///
/// # Parameters
///
/// - `key` — the conversation's shared [`ChatKey`].
/// - `plaintext` — data to encrypt.
/// - `aad` — additional authenticated data. Authenticated but **not**
///   encrypted; pass `&[]` if unused. The message envelope uses the
///   cleartext convo-id header here so a swapped header fails
///   verification.
///
/// # Returns
///
/// `nonce(24) || ciphertext+tag` ready for the wire.
pub fn seal(key: &ChatKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let payload = Payload {
        msg: plaintext,
        aad,
    };
    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|_| VeilchatError::Integrity {
            reason: "encryption failed".into(),
        })?;

    let mut frame = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    frame.extend_from_slice(&nonce_bytes);
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// Decrypts a sealed frame produced by [`seal`].
///
/// # Errors
///
/// [`VeilchatError::Integrity`] when the frame was not produced by
/// [`seal`] under the same key and aad — tampered, truncated, or wrong
/// key. Always a typed error, never a silent empty result.
pub fn open(key: &ChatKey, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(VeilchatError::Integrity {
            reason: format!(
                "sealed frame too short: {} bytes, need at least {MIN_SEALED_LEN}",
                sealed.len()
            ),
        });
    }

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let nonce = XNonce::from_slice(&sealed[..NONCE_LEN]);

    let payload = Payload {
        msg: &sealed[NONCE_LEN..],
        aad,
    };
    cipher
        .decrypt(nonce, payload)
        .map_err(|_| VeilchatError::Integrity {
            reason: "authentication tag verification failed".into(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() -> Result<()> {
        let key = ChatKey::generate();
        let sealed = seal(&key, b"hi", b"")?;
        assert_eq!(open(&key, &sealed, b"")?, b"hi");
        Ok(())
    }

    #[test]
    fn roundtrip_empty_plaintext() -> Result<()> {
        let key = ChatKey::generate();
        let sealed = seal(&key, b"", b"")?;
        assert_eq!(open(&key, &sealed, b"")?, b"");
        Ok(())
    }

    #[test]
    fn nonces_are_fresh_per_seal() -> Result<()> {
        let key = ChatKey::generate();
        let a = seal(&key, b"same plaintext", b"")?;
        let b = seal(&key, b"same plaintext", b"")?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn tampered_ciphertext_fails_integrity() -> Result<()> {
        let key = ChatKey::generate();
        let mut sealed = seal(&key, b"payload", b"")?;
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        let err = open(&key, &sealed, b"").unwrap_err();
        assert!(matches!(err, VeilchatError::Integrity { .. }));
        Ok(())
    }

    #[test]
    fn truncated_frame_fails_integrity() -> Result<()> {
        let key = ChatKey::generate();
        let sealed = seal(&key, b"payload", b"")?;

        let err = open(&key, &sealed[..MIN_SEALED_LEN - 1], b"").unwrap_err();
        assert!(matches!(err, VeilchatError::Integrity { .. }));
        Ok(())
    }

    #[test]
    fn wrong_key_fails_integrity() -> Result<()> {
        let sealed = seal(&ChatKey::generate(), b"payload", b"")?;

        let err = open(&ChatKey::generate(), &sealed, b"").unwrap_err();
        assert!(matches!(err, VeilchatError::Integrity { .. }));
        Ok(())
    }

    #[test]
    fn mismatched_aad_fails_integrity() -> Result<()> {
        let key = ChatKey::generate();
        let sealed = seal(&key, b"payload", b"convo-a")?;

        let err = open(&key, &sealed, b"convo-b").unwrap_err();
        assert!(matches!(err, VeilchatError::Integrity { .. }));
        Ok(())
    }
}
