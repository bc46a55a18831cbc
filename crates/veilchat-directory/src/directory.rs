//! Server-side peer directory.
//!
//! One record per registered username, overwritten on every keepalive
//! (last-write-wins, no staleness check, no vector clocks). Liveness
//! is tracked with a monotonic instant per record so the reaper can
//! drop peers that stopped sending keepalives.
//!
//! Thread-safe via `std::sync::Mutex` — record updates are single-key
//! upserts, so one mutex around the whole map is enough.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use veilchat_types::{PeerRecord, Username};

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// One registered peer.
struct Entry {
    /// Last-known listening address.
    addr: SocketAddr,
    /// When the last keepalive for this record arrived.
    last_seen: Instant,
}

// ---------------------------------------------------------------------------
// PeerDirectory
// ---------------------------------------------------------------------------

/// Username → address map with liveness tracking.
///
/// Records are owned exclusively by the directory; [`snapshot`]
/// hands out copies, never references.
///
/// [`snapshot`]: Self::snapshot
pub struct PeerDirectory {
    inner: Mutex<HashMap<Username, Entry>>,
}

impl PeerDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Registers or refreshes a peer. Idempotent upsert: the last
    /// writer for a username wins regardless of arrival order.
    pub fn register(&self, username: Username, addr: SocketAddr) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(
            username,
            Entry {
                addr,
                last_seen: Instant::now(),
            },
        );
    }

    /// Returns the full current membership snapshot, unordered.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.iter()
            .map(|(username, entry)| PeerRecord {
                username: username.clone(),
                addr: entry.addr,
            })
            .collect()
    }

    /// Removes records whose last keepalive is older than `ttl`.
    ///
    /// Returns the number of reaped records.
    pub fn reap_stale(&self, ttl: Duration) -> usize {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = map.len();
        let now = Instant::now();
        map.retain(|_, entry| now.duration_since(entry.last_seen) < ttl);
        before - map.len()
    }

    /// Returns the number of registered peers.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if no peer is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PeerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
