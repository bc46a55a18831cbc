//! Per-peer block and mute state gating message delivery.
//!
//! A peer is in at most one entry; the entry carries an independent
//! block flag and an optional mute expiry. Block is sticky — only an
//! explicit unblock lifts it, and an unmute never does. Mutes expire
//! on wall-clock time: a periodic sweep removes them, and every
//! delivery check also evaluates expiry lazily, so a missed sweep tick
//! can never leave a peer incorrectly gated.
//!
//! Policy: a mute gates **outbound** sends only (the local user chose
//! not to talk for a while). A block gates both directions — silently
//! accepting messages from a blocked peer would violate what "block"
//! means to a user.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use veilchat_types::{Timestamp, Username};

/// Largest mute expiry the map will store (9999-12-31T23:59:59Z).
/// Durations past the representable range clamp here rather than
/// wrapping or expiring early.
const MAX_MUTE_EXPIRY_MILLIS: i64 = 253_402_300_799_000;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way a message is moving through the gate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// A message the local user is sending.
    Outbound,
    /// A message arriving from a peer.
    Inbound,
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// Moderation flags for one peer.
#[derive(Clone, Copy, Debug, Default)]
struct Entry {
    /// Sticky block; cleared only by an explicit unblock.
    blocked: bool,
    /// Wall-clock expiry of a temporary mute, if any.
    muted_until: Option<Timestamp>,
}

impl Entry {
    /// An entry with no remaining flags is removed from the map.
    fn is_clear(&self) -> bool {
        !self.blocked && self.muted_until.is_none()
    }
}

// ---------------------------------------------------------------------------
// ModerationState
// ---------------------------------------------------------------------------

/// Thread-safe per-peer moderation map.
pub struct ModerationState {
    inner: Mutex<HashMap<Username, Entry>>,
}

impl ModerationState {
    /// Creates an empty moderation map.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks a peer. Idempotent.
    pub fn block(&self, user: &Username) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(user.clone()).or_default().blocked = true;
    }

    /// Unblocks a peer. Idempotent on a non-existent entry. Does not
    /// touch an active mute.
    pub fn unblock(&self, user: &Username) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = map.get_mut(user) {
            entry.blocked = false;
            if entry.is_clear() {
                map.remove(user);
            }
        }
    }

    /// Mutes a peer for `duration` from now. Calling again resets the
    /// expiry — durations are not additive.
    pub fn mute(&self, user: &Username, duration: Duration) {
        self.mute_at(user, duration, Timestamp::now());
    }

    /// Unmutes a peer. Idempotent on a non-existent entry. Does not
    /// lift a block — block is independent and must be cleared
    /// separately.
    pub fn unmute(&self, user: &Username) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = map.get_mut(user) {
            entry.muted_until = None;
            if entry.is_clear() {
                map.remove(user);
            }
        }
    }

    /// Whether a message may pass the gate right now.
    pub fn is_deliverable(&self, user: &Username, direction: Direction) -> bool {
        self.is_deliverable_at(user, direction, Timestamp::now())
    }

    /// Removes expired mutes. Returns the number of entries whose mute
    /// was lifted.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Timestamp::now())
    }

    /// Number of peers with any active moderation entry.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if no peer is gated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- time-explicit internals (deterministic in tests) -------------------

    fn mute_at(&self, user: &Username, duration: Duration, now: Timestamp) {
        let millis = i64::try_from(duration.as_millis())
            .unwrap_or(i64::MAX)
            .saturating_add(now.as_millis())
            .min(MAX_MUTE_EXPIRY_MILLIS);
        let expires = Timestamp::from_millis(millis).unwrap_or(now);
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(user.clone()).or_default().muted_until = Some(expires);
    }

    fn is_deliverable_at(&self, user: &Username, direction: Direction, now: Timestamp) -> bool {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = map.get(user) else {
            return true;
        };
        if entry.blocked {
            return false;
        }
        match direction {
            // Lazy expiry: an expired mute no longer gates, swept or not.
            Direction::Outbound => match entry.muted_until {
                Some(expires) => now >= expires,
                None => true,
            },
            Direction::Inbound => true,
        }
    }

    fn sweep_expired_at(&self, now: Timestamp) -> usize {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut lifted = 0;
        map.retain(|_, entry| {
            if matches!(entry.muted_until, Some(expires) if now >= expires) {
                entry.muted_until = None;
                lifted += 1;
            }
            !entry.is_clear()
        });
        lifted
    }
}

impl Default for ModerationState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> Username {
        name.parse().expect("valid username")
    }

    #[test]
    fn unknown_peer_is_deliverable_both_ways() {
        let state = ModerationState::new();
        assert!(state.is_deliverable(&user("bob"), Direction::Outbound));
        assert!(state.is_deliverable(&user("bob"), Direction::Inbound));
    }

    #[test]
    fn block_gates_both_directions() {
        let state = ModerationState::new();
        state.block(&user("bob"));

        assert!(!state.is_deliverable(&user("bob"), Direction::Outbound));
        assert!(!state.is_deliverable(&user("bob"), Direction::Inbound));
    }

    #[test]
    fn unblock_restores_delivery() {
        let state = ModerationState::new();
        state.block(&user("bob"));
        state.unblock(&user("bob"));

        assert!(state.is_deliverable(&user("bob"), Direction::Outbound));
        assert!(state.is_empty());
    }

    #[test]
    fn unblock_without_entry_is_noop() {
        let state = ModerationState::new();
        state.unblock(&user("bob"));
        assert!(state.is_empty());
    }

    #[test]
    fn mute_gates_outbound_only() {
        let state = ModerationState::new();
        state.mute(&user("bob"), Duration::from_secs(60));

        assert!(!state.is_deliverable(&user("bob"), Direction::Outbound));
        assert!(state.is_deliverable(&user("bob"), Direction::Inbound));
    }

    #[test]
    fn mute_expires_lazily_without_sweep() {
        let state = ModerationState::new();
        let now = Timestamp::now();
        state.mute_at(&user("bob"), Duration::from_secs(5), now);

        assert!(!state.is_deliverable_at(&user("bob"), Direction::Outbound, now));
        assert!(!state.is_deliverable_at(
            &user("bob"),
            Direction::Outbound,
            now.plus_secs(4)
        ));
        // No sweep has run; the lazy check alone lifts the gate.
        assert!(state.is_deliverable_at(&user("bob"), Direction::Outbound, now.plus_secs(5)));
    }

    #[test]
    fn sweep_removes_expired_mutes() {
        let state = ModerationState::new();
        let now = Timestamp::now();
        state.mute_at(&user("bob"), Duration::from_secs(5), now);
        state.mute_at(&user("carol"), Duration::from_secs(600), now);

        assert_eq!(state.sweep_expired_at(now.plus_secs(10)), 1);
        assert_eq!(state.len(), 1);
        assert!(!state.is_deliverable_at(&user("carol"), Direction::Outbound, now.plus_secs(10)));
    }

    #[test]
    fn remute_resets_expiry_not_additive() {
        let state = ModerationState::new();
        let now = Timestamp::now();
        state.mute_at(&user("bob"), Duration::from_secs(5), now);
        // Re-muted at t+4 for another 5s: expiry is t+9, not t+10.
        state.mute_at(&user("bob"), Duration::from_secs(5), now.plus_secs(4));

        assert!(!state.is_deliverable_at(&user("bob"), Direction::Outbound, now.plus_secs(8)));
        assert!(state.is_deliverable_at(&user("bob"), Direction::Outbound, now.plus_secs(9)));
    }

    #[test]
    fn enormous_mute_duration_clamps_to_far_future() {
        let state = ModerationState::new();
        let now = Timestamp::now();
        state.mute_at(&user("bob"), Duration::MAX, now);

        assert!(!state.is_deliverable_at(&user("bob"), Direction::Outbound, now));
        // Still gated a century out, not expired instantly.
        let century = 100 * 365 * 24 * 60 * 60;
        assert!(!state.is_deliverable_at(
            &user("bob"),
            Direction::Outbound,
            now.plus_secs(century)
        ));
    }

    #[test]
    fn unmute_does_not_lift_block() {
        let state = ModerationState::new();
        state.block(&user("bob"));
        state.mute(&user("bob"), Duration::from_secs(60));

        state.unmute(&user("bob"));
        assert!(!state.is_deliverable(&user("bob"), Direction::Outbound));

        state.unblock(&user("bob"));
        assert!(state.is_deliverable(&user("bob"), Direction::Outbound));
    }

    #[test]
    fn mute_expiry_does_not_lift_block() {
        let state = ModerationState::new();
        let now = Timestamp::now();
        state.block(&user("bob"));
        state.mute_at(&user("bob"), Duration::from_secs(5), now);

        state.sweep_expired_at(now.plus_secs(10));
        assert!(!state.is_deliverable_at(&user("bob"), Direction::Outbound, now.plus_secs(10)));
    }
}
