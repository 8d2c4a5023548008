//! Plugin counters
//!
//! Plain atomics updated from jobs and event handlers; rendered in
//! Prometheus text format for whatever the host exposes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct PluginMetrics {
    // Sessions
    pub sessions_active: AtomicU64,
    pub sessions_swept: AtomicU64,

    // Display traffic
    pub overlay_updates_sent: AtomicU64,
    pub status_bar_updates_sent: AtomicU64,
    pub status_bar_updates_suppressed: AtomicU64,
    pub display_errors: AtomicU64,
    pub full_screen_toggles: AtomicU64,

    // Adaptive controller
    pub controller_runs: AtomicU64,
    pub reschedules_applied: AtomicU64,
    pub reschedule_failures: AtomicU64,
    pub map_refresh_interval: AtomicU64,
    pub status_bar_refresh_interval: AtomicU64,

    // Teleports
    pub teleports_requested: AtomicU64,
    pub teleports_rejected: AtomicU64,
    pub teleports_completed: AtomicU64,

    pub ticks: AtomicU64,

    start_time: Instant,
}

impl PluginMetrics {
    pub fn new() -> Self {
        Self {
            sessions_active: AtomicU64::new(0),
            sessions_swept: AtomicU64::new(0),
            overlay_updates_sent: AtomicU64::new(0),
            status_bar_updates_sent: AtomicU64::new(0),
            status_bar_updates_suppressed: AtomicU64::new(0),
            display_errors: AtomicU64::new(0),
            full_screen_toggles: AtomicU64::new(0),
            controller_runs: AtomicU64::new(0),
            reschedules_applied: AtomicU64::new(0),
            reschedule_failures: AtomicU64::new(0),
            map_refresh_interval: AtomicU64::new(0),
            status_bar_refresh_interval: AtomicU64::new(0),
            teleports_requested: AtomicU64::new(0),
            teleports_rejected: AtomicU64::new(0),
            teleports_completed: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("hybridmap_uptime_seconds", "Plugin uptime", "counter", self.uptime_seconds());
        metric!("hybridmap_ticks_total", "Scheduler ticks driven", "counter", Self::get(&self.ticks));
        metric!("hybridmap_sessions_active", "Tracked player sessions", "gauge", Self::get(&self.sessions_active));
        metric!("hybridmap_sessions_swept_total", "Stale sessions removed by sweeps", "counter", Self::get(&self.sessions_swept));
        metric!("hybridmap_overlay_updates_total", "Map overlay updates pushed", "counter", Self::get(&self.overlay_updates_sent));
        metric!("hybridmap_status_bar_updates_total", "Status bar updates pushed", "counter", Self::get(&self.status_bar_updates_sent));
        metric!("hybridmap_status_bar_suppressed_total", "Status bar updates skipped (text unchanged)", "counter", Self::get(&self.status_bar_updates_suppressed));
        metric!("hybridmap_display_errors_total", "Failed display pushes", "counter", Self::get(&self.display_errors));
        metric!("hybridmap_full_screen_toggles_total", "Full-screen map toggles", "counter", Self::get(&self.full_screen_toggles));
        metric!("hybridmap_controller_runs_total", "Load controller runs", "counter", Self::get(&self.controller_runs));
        metric!("hybridmap_reschedules_total", "Job interval changes applied", "counter", Self::get(&self.reschedules_applied));
        metric!("hybridmap_reschedule_failures_total", "Job interval changes that failed", "counter", Self::get(&self.reschedule_failures));
        metric!("hybridmap_map_refresh_ticks", "Current map overlay interval", "gauge", Self::get(&self.map_refresh_interval));
        metric!("hybridmap_status_bar_refresh_ticks", "Current status bar interval", "gauge", Self::get(&self.status_bar_refresh_interval));
        metric!("hybridmap_teleports_requested_total", "Teleport requests", "counter", Self::get(&self.teleports_requested));
        metric!("hybridmap_teleports_rejected_total", "Teleports rejected by cooldown", "counter", Self::get(&self.teleports_rejected));
        metric!("hybridmap_teleports_completed_total", "Teleports executed", "counter", Self::get(&self.teleports_completed));

        output
    }
}

impl Default for PluginMetrics {
    fn default() -> Self {
        Self::new()
    }
}
