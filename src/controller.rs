//! Load-adaptive refresh control
//!
//! Every run doubles the map-overlay and status-bar refresh intervals until
//! each reaches its ceiling, then schedules a deferred sweep of state left
//! behind by players who are gone.
//!
//! Gating is on the configured interval ceiling, not on the sampled load:
//! samples are only logged. Intervals are never lowered again once raised.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::config::{keys, ConfigStore};
use crate::display::StatusBarRegistry;
use crate::host::{PlayerRegistry, SessionId};
use crate::load::{LoadSample, LoadSampler};
use crate::metrics::PluginMetrics;
use crate::scheduler::{jobs, JobId, TaskHandle, TaskScheduler};
use crate::state::PlayerStateStore;
use crate::teleport::TeleportService;

/// Live handle per registered job
#[derive(Debug, Default)]
pub struct JobTable {
    handles: Mutex<FxHashMap<JobId, TaskHandle>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: TaskHandle) -> Option<TaskHandle> {
        self.handles.lock().insert(handle.job(), handle)
    }

    pub fn get(&self, job: JobId) -> Option<TaskHandle> {
        self.handles.lock().get(job).cloned()
    }

    pub fn interval_of(&self, job: JobId) -> Option<u32> {
        self.handles.lock().get(job).map(TaskHandle::interval_ticks)
    }

    /// Remove every handle, returning them for cancellation
    pub fn drain(&self) -> Vec<TaskHandle> {
        self.handles.lock().drain().map(|(_, handle)| handle).collect()
    }
}

/// A job whose interval the controller may raise
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveTarget {
    pub job: JobId,
    pub config_key: &'static str,
    pub ceiling: u32,
}

/// What one controller run did
#[derive(Debug, Clone)]
pub struct ControllerReport {
    pub sample: LoadSample,
    /// New map-overlay interval, if it changed
    pub map_interval: Option<u32>,
    /// New status-bar interval, if it changed
    pub status_bar_interval: Option<u32>,
    pub sweep: TaskHandle,
}

/// Removes state for sessions the registry no longer reports online
pub struct StaleSweep {
    registry: Arc<dyn PlayerRegistry>,
    store: Arc<PlayerStateStore>,
    bars: Arc<StatusBarRegistry>,
    teleports: Option<Arc<TeleportService>>,
    metrics: Arc<PluginMetrics>,
}

impl StaleSweep {
    pub fn new(
        registry: Arc<dyn PlayerRegistry>,
        store: Arc<PlayerStateStore>,
        bars: Arc<StatusBarRegistry>,
        metrics: Arc<PluginMetrics>,
    ) -> Self {
        Self {
            registry,
            store,
            bars,
            teleports: None,
            metrics,
        }
    }

    pub fn with_teleports(mut self, teleports: Arc<TeleportService>) -> Self {
        self.teleports = Some(teleports);
        self
    }

    /// Returns the number of state entries removed
    pub fn run(&self) -> usize {
        let is_online = |session: SessionId| self.registry.is_online(session);

        let removed = self.store.sweep_stale(is_online);
        let bars_removed = self.bars.sweep_stale(is_online);
        let pending_removed = self
            .teleports
            .as_ref()
            .map_or(0, |teleports| teleports.sweep_stale(is_online));

        self.metrics
            .sessions_swept
            .fetch_add(removed as u64, Ordering::Relaxed);
        self.metrics
            .sessions_active
            .store(self.store.len() as u64, Ordering::Relaxed);

        if removed + bars_removed + pending_removed > 0 {
            info!(
                "Stale sweep removed {} states, {} status bars, {} pending teleports",
                removed, bars_removed, pending_removed
            );
        }
        removed
    }
}

/// Collaborators of the controller
pub struct ControllerDeps {
    pub scheduler: Arc<TaskScheduler>,
    pub jobs: Arc<JobTable>,
    pub config: Arc<dyn ConfigStore>,
    pub sampler: Arc<dyn LoadSampler>,
    pub sweep: Arc<StaleSweep>,
    pub metrics: Arc<PluginMetrics>,
}

pub struct LoadAdaptiveController {
    deps: ControllerDeps,
    map_target: AdaptiveTarget,
    status_bar_target: AdaptiveTarget,
}

impl LoadAdaptiveController {
    pub fn new(deps: ControllerDeps, map_ceiling: u32, status_bar_ceiling: u32) -> Self {
        Self {
            deps,
            map_target: AdaptiveTarget {
                job: jobs::MAP_OVERLAY,
                config_key: keys::MAP_ICON_REFRESH_RATE,
                ceiling: map_ceiling,
            },
            status_bar_target: AdaptiveTarget {
                job: jobs::STATUS_BAR,
                config_key: keys::BOSSBAR_REFRESH_RATE,
                ceiling: status_bar_ceiling,
            },
        }
    }

    pub fn run_once(&self) -> ControllerReport {
        PluginMetrics::incr(&self.deps.metrics.controller_runs);

        let sample = self.deps.sampler.sample();
        self.log_sample(sample);

        // Both adjustments happen under the job table lock so concurrent
        // runs cannot lose a reschedule.
        let (map_interval, status_bar_interval) = {
            let mut handles = self.deps.jobs.handles.lock();
            (
                self.double_if_below(&mut handles, self.map_target),
                self.double_if_below(&mut handles, self.status_bar_target),
            )
        };

        let sweep = Arc::clone(&self.deps.sweep);
        let sweep = self
            .deps
            .scheduler
            .schedule_once_as(jobs::STALE_SWEEP, 1, move |_| {
                sweep.run();
            });

        ControllerReport {
            sample,
            map_interval,
            status_bar_interval,
            sweep,
        }
    }

    fn log_sample(&self, sample: LoadSample) {
        let max_cpu = self.deps.config.get_int(keys::MAX_CPU_USAGE, 70) as f32;
        let max_memory = self.deps.config.get_int(keys::MAX_MEMORY_USAGE, 80) as f32;

        if sample.exceeds(max_cpu, max_memory) {
            warn!(
                "Load above limits: cpu {:.1}% (max {}), memory {:.1}% (max {})",
                sample.cpu_percent, max_cpu, sample.memory_percent, max_memory
            );
        } else {
            debug!(
                "Load sample: cpu {:.1}%, memory {:.1}%",
                sample.cpu_percent, sample.memory_percent
            );
        }
    }

    fn double_if_below(
        &self,
        handles: &mut FxHashMap<JobId, TaskHandle>,
        target: AdaptiveTarget,
    ) -> Option<u32> {
        let Some(handle) = handles.get(target.job).cloned() else {
            warn!("No live handle for job {}, skipping", target.job);
            return None;
        };

        let current = handle.interval_ticks();
        if current >= target.ceiling {
            return None;
        }
        let next = current.saturating_mul(2);

        match self.deps.scheduler.reschedule(&handle, next) {
            Ok(new_handle) => {
                handles.insert(target.job, new_handle);
                if let Err(e) = self.deps.config.set_int(target.config_key, next as i64) {
                    warn!("Could not persist {}: {}", target.config_key, e);
                }
                PluginMetrics::incr(&self.deps.metrics.reschedules_applied);
                self.record_interval(target.job, next);
                info!("Raised {} interval from {} to {} ticks", target.job, current, next);
                Some(next)
            }
            Err(e) => {
                PluginMetrics::incr(&self.deps.metrics.reschedule_failures);
                warn!("Reschedule of {} failed: {}", target.job, e);
                None
            }
        }
    }

    fn record_interval(&self, job: JobId, interval: u32) {
        let gauge = match job {
            jobs::MAP_OVERLAY => &self.deps.metrics.map_refresh_interval,
            jobs::STATUS_BAR => &self.deps.metrics.status_bar_refresh_interval,
            _ => return,
        };
        gauge.store(interval as u64, Ordering::Relaxed);
    }
}
