//! Rendezvous discovery service for Veilchat peers.
//!
//! Peers register their address with a `KEEPALIVE` and learn every
//! other peer's address with a `DISCOVER`. The directory never sees
//! message content — it only maps usernames to addresses.
//!
//! # Modules
//!
//! - [`directory`] — the in-memory [`directory::PeerDirectory`] map
//! - [`service`] — the TCP accept loop dispatching requests

pub mod directory;
pub mod service;
