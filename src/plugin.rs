//! Plugin wiring
//!
//! `HybridMapPlugin` owns every shared container, registers the periodic
//! jobs on enable and routes host events to the component that handles
//! them. The host calls [`HybridMapPlugin::tick`] once per game tick.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{keys, ConfigError, ConfigStore, PluginConfig};
use crate::controller::{ControllerDeps, JobTable, LoadAdaptiveController, StaleSweep};
use crate::display::{
    FullScreenToggle, MapOverlayJob, StatusBarJob, StatusBarRegistry, ToggleOutcome,
};
use crate::events::{InteractKind, PluginEvent};
use crate::host::{
    BlockPos, DisplayTransport, PlayerHandle, PlayerRegistry, SessionId, TeleportExecutor,
    WorldQuery,
};
use crate::load::LoadSampler;
use crate::metrics::PluginMetrics;
use crate::scheduler::{jobs, TaskScheduler};
use crate::state::{CooldownTracker, PlayerStateStore};
use crate::teleport::{TeleportHost, TeleportOutcome, TeleportService};

/// Everything the host provides
#[derive(Clone)]
pub struct HostServices {
    pub registry: Arc<dyn PlayerRegistry>,
    pub world: Arc<dyn WorldQuery>,
    pub transport: Arc<dyn DisplayTransport>,
    pub teleporter: Arc<dyn TeleportExecutor>,
    pub config: Arc<dyn ConfigStore>,
    pub sampler: Arc<dyn LoadSampler>,
}

pub struct HybridMapPlugin {
    host: HostServices,
    store: Arc<PlayerStateStore>,
    bars: Arc<StatusBarRegistry>,
    scheduler: Arc<TaskScheduler>,
    job_table: Arc<JobTable>,
    overlay: Arc<MapOverlayJob>,
    toggle: FullScreenToggle,
    teleports: Arc<TeleportService>,
    metrics: Arc<PluginMetrics>,
}

impl HybridMapPlugin {
    /// Validate `config`, seed the host's store and start the periodic jobs
    pub fn enable(host: HostServices, config: PluginConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        config.seed(host.config.as_ref());

        let store = Arc::new(PlayerStateStore::new());
        let bars = Arc::new(StatusBarRegistry::new());
        let cooldowns = Arc::new(CooldownTracker::new());
        let metrics = Arc::new(PluginMetrics::new());
        let scheduler = Arc::new(TaskScheduler::new());
        let job_table = Arc::new(JobTable::new());

        let overlay = Arc::new(MapOverlayJob::new(
            Arc::clone(&host.registry),
            Arc::clone(&store),
            Arc::clone(&host.transport),
            Arc::clone(&metrics),
        ));
        let status_bar = Arc::new(StatusBarJob::new(
            Arc::clone(&host.registry),
            Arc::clone(&bars),
            Arc::clone(&host.transport),
            Arc::clone(&metrics),
        ));
        let toggle = FullScreenToggle::new(
            Arc::clone(&store),
            Arc::clone(&bars),
            Arc::clone(&host.transport),
            Arc::clone(&metrics),
            config.map_click_window,
        );
        let teleports = Arc::new(TeleportService::new(
            TeleportHost {
                registry: Arc::clone(&host.registry),
                world: Arc::clone(&host.world),
                teleporter: Arc::clone(&host.teleporter),
                transport: Arc::clone(&host.transport),
                config: Arc::clone(&host.config),
            },
            Arc::clone(&scheduler),
            cooldowns,
            Arc::clone(&metrics),
            config.teleport_delay_ticks,
        ));
        let sweep = Arc::new(
            StaleSweep::new(
                Arc::clone(&host.registry),
                Arc::clone(&store),
                Arc::clone(&bars),
                Arc::clone(&metrics),
            )
            .with_teleports(Arc::clone(&teleports)),
        );
        let controller = Arc::new(LoadAdaptiveController::new(
            ControllerDeps {
                scheduler: Arc::clone(&scheduler),
                jobs: Arc::clone(&job_table),
                config: Arc::clone(&host.config),
                sampler: Arc::clone(&host.sampler),
                sweep,
                metrics: Arc::clone(&metrics),
            },
            config.map_refresh_ceiling,
            config.bossbar_refresh_ceiling,
        ));

        // Intervals come from the store so values persisted by an earlier
        // run survive a restart.
        let store_ref = host.config.as_ref();
        let map_interval = interval_from(
            store_ref,
            keys::MAP_ICON_REFRESH_RATE,
            config.map_icon_refresh_rate,
        );
        let bar_interval = interval_from(
            store_ref,
            keys::BOSSBAR_REFRESH_RATE,
            config.bossbar_refresh_rate,
        );

        let job = Arc::clone(&overlay);
        let map_handle = scheduler.schedule(jobs::MAP_OVERLAY, map_interval, true, move |tick| {
            job.run(tick);
        });
        let job = Arc::clone(&status_bar);
        let bar_handle = scheduler.schedule(jobs::STATUS_BAR, bar_interval, true, move |_| {
            job.run();
        });
        metrics
            .map_refresh_interval
            .store(map_handle.interval_ticks() as u64, Ordering::Relaxed);
        metrics
            .status_bar_refresh_interval
            .store(bar_handle.interval_ticks() as u64, Ordering::Relaxed);
        job_table.insert(map_handle);
        job_table.insert(bar_handle);

        let monitor_handle = scheduler.schedule(jobs::LOAD_MONITOR, config.monitor_interval, true, move |_| {
            controller.run_once();
        });
        job_table.insert(monitor_handle);

        info!(
            "Hybrid map enabled: map every {} ticks, status bar every {} ticks, load check every {} ticks",
            map_interval, bar_interval, config.monitor_interval
        );

        Ok(Arc::new(Self {
            host,
            store,
            bars,
            scheduler,
            job_table,
            overlay,
            toggle,
            teleports,
            metrics,
        }))
    }

    /// Stop every job. Job callbacks hold references back into the plugin,
    /// so this must run before the plugin is dropped.
    pub fn disable(&self) {
        self.job_table.drain();
        let cancelled = self.scheduler.cancel_all();
        info!("Hybrid map disabled, {} tasks cancelled", cancelled);
    }

    pub fn dispatch(&self, event: PluginEvent) {
        match event {
            PluginEvent::Connected(handle) => self.on_join(&handle),
            PluginEvent::Disconnected(session) => self.on_quit(session),
            PluginEvent::Interact { session, kind } => {
                self.on_interact(session, kind, Instant::now());
            }
            PluginEvent::TeleportRequest {
                session,
                destination,
            } => {
                self.request_teleport(session, destination);
            }
        }
    }

    pub fn on_join(&self, player: &PlayerHandle) {
        if !self.store.put(player.session) {
            debug!("{} already tracked", player.name);
            return;
        }

        if self.host.config.get_bool(keys::BOSSBAR_ENABLED, true) {
            let bar = self.bars.create(player.session);
            if let Err(e) = self.host.transport.push_status_bar(player.session, &bar) {
                PluginMetrics::incr(&self.metrics.display_errors);
                debug!("Initial status bar for {} failed: {}", player.name, e);
            }
        }

        if let Err(e) = self.overlay.push(player, self.scheduler.current_tick()) {
            debug!("Initial overlay for {} failed: {}", player.name, e);
        }

        self.record_sessions();
        info!("{} joined, tracking {} sessions", player.name, self.store.len());
    }

    pub fn on_quit(&self, session: SessionId) {
        let had_state = self.store.remove(session).is_some();
        self.bars.remove(session);
        if self.teleports.cancel_pending(session) {
            debug!("Cancelled pending teleport for {}", session);
        }
        self.record_sessions();
        if had_state {
            info!("Session {} left, tracking {} sessions", session, self.store.len());
        }
    }

    pub fn on_interact(&self, session: SessionId, kind: InteractKind, now: Instant) -> Option<ToggleOutcome> {
        match kind {
            InteractKind::Hover => {
                self.toggle.on_hover(session, now);
                None
            }
            InteractKind::Activate => Some(self.toggle.on_activate(session, now)),
        }
    }

    /// Returns None when the session is unknown to the host
    pub fn request_teleport(&self, session: SessionId, destination: BlockPos) -> Option<TeleportOutcome> {
        let Some(player) = self
            .host
            .registry
            .online_players()
            .into_iter()
            .find(|player| player.session == session)
        else {
            warn!("Teleport request from unknown session {}", session);
            return None;
        };
        Some(self.teleports.request(&player, destination))
    }

    /// Advance one host tick
    pub fn tick(&self) -> usize {
        PluginMetrics::incr(&self.metrics.ticks);
        self.scheduler.tick()
    }

    pub fn metrics(&self) -> &Arc<PluginMetrics> {
        &self.metrics
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn jobs(&self) -> &Arc<JobTable> {
        &self.job_table
    }

    pub fn store(&self) -> &Arc<PlayerStateStore> {
        &self.store
    }

    pub fn status_bars(&self) -> &Arc<StatusBarRegistry> {
        &self.bars
    }

    fn record_sessions(&self) {
        self.metrics
            .sessions_active
            .store(self.store.len() as u64, Ordering::Relaxed);
    }
}

fn interval_from(store: &dyn ConfigStore, key: &str, fallback: u32) -> u32 {
    let value = store.get_int(key, fallback as i64);
    match u32::try_from(value) {
        Ok(interval) if interval > 0 => interval,
        _ => {
            warn!("Stored {}={} is not a valid interval, using {}", key, value, fallback);
            fallback
        }
    }
}
