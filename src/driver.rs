//! Async tick driver
//!
//! Drives the plugin at a fixed rate on a tokio interval. Queued host
//! events are dispatched at the start of each tick so they are applied in
//! arrival order before any job runs.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::events::EventQueue;
use crate::plugin::HybridMapPlugin;

const STATS_PERIOD: Duration = Duration::from_secs(30);

/// Run until `shutdown` flips to true or its sender is dropped.
///
/// Returns the number of ticks driven.
pub async fn run_tick_loop(
    plugin: Arc<HybridMapPlugin>,
    events: Arc<EventQueue>,
    tick_period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut ticker = interval(tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let stats_every = (STATS_PERIOD.as_nanos() / tick_period.as_nanos().max(1)).max(1) as u64;
    info!("Tick loop started, period {:?}", tick_period);

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for event in events.drain() {
                    plugin.dispatch(event);
                }
                plugin.tick();
                ticks += 1;

                if ticks % stats_every == 0 {
                    let metrics = plugin.metrics();
                    info!(
                        "Tick {}: {} sessions, {} overlays, {} status bar updates, map interval {}",
                        ticks,
                        metrics.sessions_active.load(Ordering::Relaxed),
                        metrics.overlay_updates_sent.load(Ordering::Relaxed),
                        metrics.status_bar_updates_sent.load(Ordering::Relaxed),
                        metrics.map_refresh_interval.load(Ordering::Relaxed),
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Tick loop stopped after {} ticks", ticks);
    ticks
}
