use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::host::SessionId;

/// HUD/map interaction state for one connected session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerUiState {
    /// Last time the cursor rested on the map icon
    pub last_hover: Option<Instant>,
    /// Last activate gesture
    pub last_click: Option<Instant>,
    pub full_screen_map_open: bool,
}

impl PlayerUiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_hover(&mut self, now: Instant) {
        self.last_hover = Some(now);
    }

    /// Most recent hover or activate stamp
    pub fn last_update(&self) -> Option<Instant> {
        self.last_hover.max(self.last_click)
    }

    /// Record an activate gesture.
    ///
    /// The click is stamped first, so the gesture qualifies whenever the
    /// latest update falls within `window`. A zero window disables it.
    pub fn register_activate(&mut self, now: Instant, window: Duration) -> bool {
        self.last_click = Some(now);
        self.last_update()
            .is_some_and(|last| now.saturating_duration_since(last) < window)
    }

    /// Flip the full-screen flag and return the new value
    pub fn toggle_full_screen(&mut self) -> bool {
        self.full_screen_map_open = !self.full_screen_map_open;
        self.full_screen_map_open
    }
}

/// Session-keyed store of `PlayerUiState`
#[derive(Debug, Default)]
pub struct PlayerStateStore {
    states: RwLock<HashMap<SessionId, PlayerUiState>>,
}

impl PlayerStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create default state for a session.
    ///
    /// Idempotent: an existing entry is left untouched. Returns true if an
    /// entry was created.
    pub fn put(&self, session: SessionId) -> bool {
        let mut states = self.states.write();
        if states.contains_key(&session) {
            return false;
        }
        states.insert(session, PlayerUiState::new());
        true
    }

    pub fn get(&self, session: SessionId) -> Option<PlayerUiState> {
        self.states.read().get(&session).copied()
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.states.read().contains_key(&session)
    }

    /// Mutate a session's state in place under the write lock.
    ///
    /// Returns None (and does nothing) for untracked sessions.
    pub fn update<R>(&self, session: SessionId, f: impl FnOnce(&mut PlayerUiState) -> R) -> Option<R> {
        self.states.write().get_mut(&session).map(f)
    }

    pub fn remove(&self, session: SessionId) -> Option<PlayerUiState> {
        self.states.write().remove(&session)
    }

    /// Remove every entry whose session fails `is_online`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_stale(&self, is_online: impl Fn(SessionId) -> bool) -> usize {
        let mut states = self.states.write();
        let before = states.len();
        states.retain(|session, _| is_online(*session));
        before - states.len()
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        self.states.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}
