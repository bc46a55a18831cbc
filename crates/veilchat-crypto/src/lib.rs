//! Cryptographic primitives for the Veilchat peer-to-peer chat system.
//!
//! This crate is the **sole** location for all cryptographic operations.
//! No other crate in the workspace may perform raw crypto directly.
//!
//! # Modules
//!
//! - [`key`] — per-conversation symmetric [`key::ChatKey`] generation,
//!   out-of-band hex transfer, and conversation-id fingerprinting
//! - [`aead`] — XChaCha20-Poly1305 seal/open for message payloads

pub mod aead;
pub mod key;
