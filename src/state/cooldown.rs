use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::host::PlayerId;

/// Outcome of a cooldown check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownDecision {
    pub allowed: bool,
    /// Whole seconds left until the action is allowed again (0 when allowed)
    pub remaining_secs: u64,
}

impl CooldownDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            remaining_secs: 0,
        }
    }

    fn rejected(remaining_secs: u64) -> Self {
        Self {
            allowed: false,
            remaining_secs,
        }
    }
}

/// Per-player gate for a rate-limited action.
///
/// Keyed by account id so the timestamp survives a reconnect. Entries are
/// never removed; the table is bounded by the player population.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_action: Mutex<HashMap<PlayerId, Instant>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_consume(&self, player: PlayerId, cooldown: Duration) -> CooldownDecision {
        self.try_consume_at(player, cooldown, Instant::now())
    }

    /// Atomically check the cooldown and, if it has elapsed, record `now`.
    ///
    /// A rejected attempt leaves the stored timestamp untouched.
    pub fn try_consume_at(&self, player: PlayerId, cooldown: Duration, now: Instant) -> CooldownDecision {
        let mut last_action = self.last_action.lock();

        if let Some(last) = last_action.get(&player) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < cooldown {
                let remaining = cooldown.as_secs().saturating_sub(elapsed.as_secs());
                return CooldownDecision::rejected(remaining);
            }
        }

        last_action.insert(player, now);
        CooldownDecision::allowed()
    }

    pub fn last_action(&self, player: PlayerId) -> Option<Instant> {
        self.last_action.lock().get(&player).copied()
    }

    pub fn len(&self) -> usize {
        self.last_action.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_action.lock().is_empty()
    }
}
