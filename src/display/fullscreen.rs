use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::display::status_bar::StatusBarRegistry;
use crate::host::{DisplayTransport, SessionId};
use crate::metrics::PluginMetrics;
use crate::state::PlayerStateStore;

pub const OPENED_TITLE: &str = "Full-screen map opened";
pub const CLOSED_TITLE: &str = "Map closed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Session has no UI state
    Untracked,
    /// Gesture fell outside the click window
    NotQualified,
    Opened,
    Closed,
}

/// Flips the full-screen map on qualifying activate gestures.
///
/// The status bar is hidden while the map covers the screen.
pub struct FullScreenToggle {
    store: Arc<PlayerStateStore>,
    bars: Arc<StatusBarRegistry>,
    transport: Arc<dyn DisplayTransport>,
    metrics: Arc<PluginMetrics>,
    click_window: Duration,
}

impl FullScreenToggle {
    pub fn new(
        store: Arc<PlayerStateStore>,
        bars: Arc<StatusBarRegistry>,
        transport: Arc<dyn DisplayTransport>,
        metrics: Arc<PluginMetrics>,
        click_window: Duration,
    ) -> Self {
        Self {
            store,
            bars,
            transport,
            metrics,
            click_window,
        }
    }

    pub fn on_hover(&self, session: SessionId, now: Instant) -> bool {
        self.store
            .update(session, |state| state.register_hover(now))
            .is_some()
    }

    pub fn on_activate(&self, session: SessionId, now: Instant) -> ToggleOutcome {
        let window = self.click_window;
        // Stamp, flip and update the bar under one store write lock so
        // racing gestures cannot leave the bar out of step with the flag.
        let flipped = self.store.update(session, |state| {
            if !state.register_activate(now, window) {
                return None;
            }
            let open = state.toggle_full_screen();
            self.apply(session, open);
            Some(open)
        });

        match flipped {
            None => ToggleOutcome::Untracked,
            Some(None) => ToggleOutcome::NotQualified,
            Some(Some(true)) => ToggleOutcome::Opened,
            Some(Some(false)) => ToggleOutcome::Closed,
        }
    }

    fn apply(&self, session: SessionId, open: bool) {
        PluginMetrics::incr(&self.metrics.full_screen_toggles);
        info!("Session {} full-screen map {}", session, if open { "opened" } else { "closed" });

        let title = if open { OPENED_TITLE } else { CLOSED_TITLE };
        if let Err(e) = self.transport.send_title(session, title) {
            PluginMetrics::incr(&self.metrics.display_errors);
            debug!("Title push to {} failed: {}", session, e);
        }

        if let Some(bar) = self.bars.set_visible(session, !open) {
            if let Err(e) = self.transport.push_status_bar(session, &bar) {
                PluginMetrics::incr(&self.metrics.display_errors);
                debug!("Status bar push to {} failed: {}", session, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{PlayerHandle, Position};
    use crate::sim::{DisplayMessage, SimulatedHost};
    use uuid::Uuid;

    const WINDOW: Duration = Duration::from_millis(200);

    struct Fixture {
        host: Arc<SimulatedHost>,
        store: Arc<PlayerStateStore>,
        bars: Arc<StatusBarRegistry>,
        toggle: FullScreenToggle,
        session: SessionId,
    }

    fn fixture() -> Fixture {
        let host = Arc::new(SimulatedHost::new());
        let store = Arc::new(PlayerStateStore::new());
        let bars = Arc::new(StatusBarRegistry::new());
        let toggle = FullScreenToggle::new(
            store.clone(),
            bars.clone(),
            host.clone(),
            Arc::new(PluginMetrics::new()),
            WINDOW,
        );

        let player = PlayerHandle::new(Uuid::new_v4(), 1, "Viewer");
        host.connect(player.clone(), Position::default());
        store.put(player.session);
        bars.create(player.session);

        Fixture {
            host,
            store,
            bars,
            toggle,
            session: player.session,
        }
    }

    #[test]
    fn test_two_gestures_restore_visibility() {
        let f = fixture();
        let t0 = Instant::now();
        f.toggle.on_hover(f.session, t0);

        assert_eq!(
            f.toggle.on_activate(f.session, t0 + Duration::from_millis(20)),
            ToggleOutcome::Opened
        );
        assert!(!f.bars.get(f.session).unwrap().visible);
        assert!(f.store.get(f.session).unwrap().full_screen_map_open);

        assert_eq!(
            f.toggle.on_activate(f.session, t0 + Duration::from_millis(120)),
            ToggleOutcome::Closed
        );
        assert!(f.bars.get(f.session).unwrap().visible);
        assert!(!f.store.get(f.session).unwrap().full_screen_map_open);

        let titles: Vec<String> = f
            .host
            .drain_messages()
            .into_iter()
            .filter_map(|m| match m {
                DisplayMessage::Title { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(titles, vec![OPENED_TITLE.to_string(), CLOSED_TITLE.to_string()]);
    }

    #[test]
    fn test_activates_without_hover_toggle() {
        let f = fixture();
        let t0 = Instant::now();

        assert_eq!(f.toggle.on_activate(f.session, t0), ToggleOutcome::Opened);
        assert_eq!(
            f.toggle.on_activate(f.session, t0 + Duration::from_millis(100)),
            ToggleOutcome::Closed
        );
        assert!(f.bars.get(f.session).unwrap().visible);
        assert!(!f.store.get(f.session).unwrap().full_screen_map_open);
    }

    #[test]
    fn test_zero_window_disables_gesture() {
        let f = fixture();
        let toggle = FullScreenToggle::new(
            f.store.clone(),
            f.bars.clone(),
            f.host.clone(),
            Arc::new(PluginMetrics::new()),
            Duration::ZERO,
        );

        assert_eq!(
            toggle.on_activate(f.session, Instant::now()),
            ToggleOutcome::NotQualified
        );
        assert!(!f.store.get(f.session).unwrap().full_screen_map_open);
        assert!(f.host.drain_messages().is_empty());
    }

    #[test]
    fn test_racing_activates_keep_bar_in_step() {
        let f = fixture();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        f.toggle.on_activate(f.session, Instant::now());
                    }
                });
            }
        });

        // 200 flips: back to closed with the bar shown
        let open = f.store.get(f.session).unwrap().full_screen_map_open;
        assert!(!open);
        assert_eq!(f.bars.get(f.session).unwrap().visible, !open);

        let last_bar = f
            .host
            .drain_messages()
            .into_iter()
            .filter_map(|m| match m {
                DisplayMessage::StatusBar { bar, .. } => Some(bar),
                _ => None,
            })
            .last()
            .unwrap();
        assert!(last_bar.visible);
    }

    #[test]
    fn test_untracked_session_is_noop() {
        let f = fixture();
        let stranger = Uuid::new_v4();

        assert!(!f.toggle.on_hover(stranger, Instant::now()));
        assert_eq!(
            f.toggle.on_activate(stranger, Instant::now()),
            ToggleOutcome::Untracked
        );
    }
}
