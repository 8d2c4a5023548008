use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::host::{BlockPos, DisplayTransport, PlayerRegistry, SessionId};
use crate::metrics::PluginMetrics;

/// Text shown before the first coordinate refresh
pub const LOCATING_TEXT: &str = "Locating...";

/// Persistent on-screen coordinate widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBar {
    pub text: String,
    pub visible: bool,
    /// Fill fraction, 0.0..=1.0
    pub progress: f32,
}

impl StatusBar {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visible: true,
            progress: 1.0,
        }
    }
}

pub fn coordinate_text(pos: BlockPos) -> String {
    format!("Coords: {}, {}, {}", pos.x, pos.y, pos.z)
}

/// Result of offering new text to a bar
#[derive(Debug, Clone, PartialEq)]
pub enum TextChange {
    /// No bar for this session
    Missing,
    Unchanged,
    Changed(StatusBar),
}

/// Session-keyed status bars
#[derive(Debug, Default)]
pub struct StatusBarRegistry {
    bars: RwLock<HashMap<SessionId, StatusBar>>,
}

impl StatusBarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the bar if absent and return its current contents
    pub fn create(&self, session: SessionId) -> StatusBar {
        self.bars
            .write()
            .entry(session)
            .or_insert_with(|| StatusBar::new(LOCATING_TEXT))
            .clone()
    }

    pub fn get(&self, session: SessionId) -> Option<StatusBar> {
        self.bars.read().get(&session).cloned()
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.bars.read().contains_key(&session)
    }

    pub fn remove(&self, session: SessionId) -> Option<StatusBar> {
        self.bars.write().remove(&session)
    }

    pub fn set_text(&self, session: SessionId, text: String) -> TextChange {
        let mut bars = self.bars.write();
        match bars.get_mut(&session) {
            None => TextChange::Missing,
            Some(bar) if bar.text == text => TextChange::Unchanged,
            Some(bar) => {
                bar.text = text;
                TextChange::Changed(bar.clone())
            }
        }
    }

    pub fn set_visible(&self, session: SessionId, visible: bool) -> Option<StatusBar> {
        self.bars.write().get_mut(&session).map(|bar| {
            bar.visible = visible;
            bar.clone()
        })
    }

    pub fn sweep_stale(&self, is_online: impl Fn(SessionId) -> bool) -> usize {
        let mut bars = self.bars.write();
        let before = bars.len();
        bars.retain(|session, _| is_online(*session));
        before - bars.len()
    }

    pub fn len(&self) -> usize {
        self.bars.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.read().is_empty()
    }
}

/// Periodic coordinate refresh for every online player with a bar.
///
/// Only pushes when the text actually changed.
pub struct StatusBarJob {
    registry: Arc<dyn PlayerRegistry>,
    bars: Arc<StatusBarRegistry>,
    transport: Arc<dyn DisplayTransport>,
    metrics: Arc<PluginMetrics>,
}

impl StatusBarJob {
    pub fn new(
        registry: Arc<dyn PlayerRegistry>,
        bars: Arc<StatusBarRegistry>,
        transport: Arc<dyn DisplayTransport>,
        metrics: Arc<PluginMetrics>,
    ) -> Self {
        Self {
            registry,
            bars,
            transport,
            metrics,
        }
    }

    /// Returns the number of updates pushed
    pub fn run(&self) -> usize {
        let mut sent = 0;

        for player in self.registry.online_players() {
            let Some(position) = self.registry.position(player.session) else {
                continue;
            };

            match self.bars.set_text(player.session, coordinate_text(position.to_block())) {
                TextChange::Missing => {}
                TextChange::Unchanged => {
                    PluginMetrics::incr(&self.metrics.status_bar_updates_suppressed);
                }
                TextChange::Changed(bar) => {
                    match self.transport.push_status_bar(player.session, &bar) {
                        Ok(()) => {
                            PluginMetrics::incr(&self.metrics.status_bar_updates_sent);
                            sent += 1;
                        }
                        Err(e) => {
                            PluginMetrics::incr(&self.metrics.display_errors);
                            debug!("Status bar push to {} failed: {}", player.name, e);
                        }
                    }
                }
            }
        }

        sent
    }
}
