//! Local message persistence for Veilchat.
//!
//! Provides an append-only, per-conversation message log backed by
//! sled. The core writes a record after every successful encrypt or
//! decrypt and never mutates or deletes it; retention policy is out of
//! scope.

pub mod engine;
pub mod messages;
