//! Veilchat node runtime.
//!
//! Composes the peer table, moderation state, message transport, and
//! discovery client into one per-user runtime: the [`node::ChatNode`].
//!
//! # Modules
//!
//! - [`peer_table`] — local view of conversations and peer addresses
//! - [`moderation`] — per-peer block/mute state gating delivery
//! - [`transport`] — one-shot encrypted message connections
//! - [`discovery_client`] — keepalive/discover calls and refresh loop
//! - [`outgoing`] — the send path (gate, encrypt, persist, deliver)
//! - [`incoming`] — the listener and receive path
//! - [`node`] — lifecycle state machine and background task wiring

pub mod discovery_client;
pub mod incoming;
pub mod moderation;
pub mod node;
pub mod outgoing;
pub mod peer_table;
pub mod transport;
