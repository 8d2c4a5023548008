//! Cooldown-gated teleport with a safe landing search

use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{keys, ConfigStore};
use crate::host::{
    BlockPos, DisplayTransport, PlayerHandle, PlayerRegistry, SessionId, TeleportExecutor,
    WorldQuery,
};
use crate::metrics::PluginMetrics;
use crate::scheduler::{jobs, TaskHandle, TaskScheduler};
use crate::state::CooldownTracker;

pub const COMPLETE_MESSAGE: &str = "Teleport complete!";

const DEFAULT_COOLDOWN_SECS: i64 = 300;

/// Find the first passable block at or above `target`.
///
/// Scans `target.y..max_y` (the height bound is exclusive). When nothing is
/// free the requested target is returned unchanged.
pub fn find_safe(target: BlockPos, max_y: i32, is_passable: impl Fn(BlockPos) -> bool) -> BlockPos {
    (target.y..max_y)
        .map(|y| target.with_y(y))
        .find(|pos| is_passable(*pos))
        .unwrap_or(target)
}

pub fn cooldown_message(remaining_secs: u64) -> String {
    format!("Teleport cooling down: {}s", remaining_secs)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeleportOutcome {
    /// Move will happen after the configured delay
    Scheduled { destination: BlockPos, handle: TaskHandle },
    CoolingDown { remaining_secs: u64 },
}

/// Host-side collaborators the teleport path needs
pub struct TeleportHost {
    pub registry: Arc<dyn PlayerRegistry>,
    pub world: Arc<dyn WorldQuery>,
    pub teleporter: Arc<dyn TeleportExecutor>,
    pub transport: Arc<dyn DisplayTransport>,
    pub config: Arc<dyn ConfigStore>,
}

pub struct TeleportService {
    host: TeleportHost,
    scheduler: Arc<TaskScheduler>,
    cooldowns: Arc<CooldownTracker>,
    metrics: Arc<PluginMetrics>,
    delay_ticks: u32,
    pending: Mutex<HashMap<SessionId, TaskHandle>>,
}

impl TeleportService {
    pub fn new(
        host: TeleportHost,
        scheduler: Arc<TaskScheduler>,
        cooldowns: Arc<CooldownTracker>,
        metrics: Arc<PluginMetrics>,
        delay_ticks: u32,
    ) -> Self {
        Self {
            host,
            scheduler,
            cooldowns,
            metrics,
            delay_ticks,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn request(&self, player: &PlayerHandle, destination: BlockPos) -> TeleportOutcome {
        PluginMetrics::incr(&self.metrics.teleports_requested);

        let cooldown_secs = self
            .host
            .config
            .get_int(keys::TELEPORT_COOLDOWN, DEFAULT_COOLDOWN_SECS)
            .max(0) as u64;
        let decision = self
            .cooldowns
            .try_consume(player.player_id, Duration::from_secs(cooldown_secs));

        if !decision.allowed {
            PluginMetrics::incr(&self.metrics.teleports_rejected);
            let message = cooldown_message(decision.remaining_secs);
            if let Err(e) = self.host.transport.send_action_bar(player.session, &message) {
                debug!("Cooldown notice to {} failed: {}", player.name, e);
            }
            return TeleportOutcome::CoolingDown {
                remaining_secs: decision.remaining_secs,
            };
        }

        let world = Arc::clone(&self.host.world);
        let safe = find_safe(destination, world.max_height(), |pos| world.is_passable(pos));
        if safe != destination {
            debug!("Teleport for {} raised from y={} to y={}", player.name, destination.y, safe.y);
        }

        let session = player.session;
        let name = player.name.clone();
        let registry = Arc::clone(&self.host.registry);
        let teleporter = Arc::clone(&self.host.teleporter);
        let transport = Arc::clone(&self.host.transport);
        let metrics = Arc::clone(&self.metrics);

        let handle = self
            .scheduler
            .schedule_once_as(jobs::TELEPORT, self.delay_ticks, move |_| {
                if !registry.is_online(session) {
                    debug!("Dropping teleport for {}: no longer online", name);
                    return;
                }
                match teleporter.teleport(session, safe) {
                    Ok(()) => {
                        PluginMetrics::incr(&metrics.teleports_completed);
                        info!("Teleported {} to {:?}", name, safe);
                        if let Err(e) = transport.send_action_bar(session, COMPLETE_MESSAGE) {
                            debug!("Teleport notice to {} failed: {}", name, e);
                        }
                    }
                    Err(e) => warn!("Teleport of {} failed: {}", name, e),
                }
            });

        if let Some(previous) = self.pending.lock().insert(session, handle.clone()) {
            // Latest request wins
            self.scheduler.cancel(&previous);
        }

        TeleportOutcome::Scheduled {
            destination: safe,
            handle,
        }
    }

    /// Cancel a session's pending teleport. Returns true if one was still waiting.
    pub fn cancel_pending(&self, session: SessionId) -> bool {
        match self.pending.lock().remove(&session) {
            Some(handle) => self.scheduler.cancel(&handle),
            None => false,
        }
    }

    pub fn has_pending(&self, session: SessionId) -> bool {
        self.pending
            .lock()
            .get(&session)
            .is_some_and(|handle| self.scheduler.is_scheduled(handle))
    }

    /// Forget pending entries for sessions that went offline or already ran
    pub fn sweep_stale(&self, is_online: impl Fn(SessionId) -> bool) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|session, handle| {
            let keep = is_online(*session) && self.scheduler.is_scheduled(handle);
            if !keep {
                self.scheduler.cancel(handle);
            }
            keep
        });
        before - pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigStore;
    use crate::host::Position;
    use crate::sim::{DisplayMessage, SimulatedHost, GROUND_LEVEL};
    use uuid::Uuid;

    #[test]
    fn test_find_safe_first_passable() {
        let target = BlockPos::new(10, 60, -3);
        let found = find_safe(target, 100, |pos| pos.y == 75);
        assert_eq!(found, BlockPos::new(10, 75, -3));
    }

    #[test]
    fn test_find_safe_falls_back_to_target() {
        let target = BlockPos::new(10, 60, -3);
        assert_eq!(find_safe(target, 100, |_| false), target);
    }

    #[test]
    fn test_find_safe_bound_is_exclusive() {
        let target = BlockPos::new(0, 60, 0);
        assert_eq!(find_safe(target, 100, |pos| pos.y == 100), target);
        assert_eq!(find_safe(target, 100, |pos| pos.y == 99).y, 99);
    }

    #[test]
    fn test_find_safe_target_already_free() {
        let target = BlockPos::new(0, 80, 0);
        assert_eq!(find_safe(target, 256, |_| true), target);
    }

    fn service(host: &Arc<SimulatedHost>, scheduler: &Arc<TaskScheduler>) -> TeleportService {
        let config = Arc::new(MemoryConfigStore::new());
        config.set_int(keys::TELEPORT_COOLDOWN, 300).unwrap();
        TeleportService::new(
            TeleportHost {
                registry: host.clone(),
                world: host.clone(),
                teleporter: host.clone(),
                transport: host.clone(),
                config,
            },
            Arc::clone(scheduler),
            Arc::new(CooldownTracker::new()),
            Arc::new(PluginMetrics::new()),
            60,
        )
    }

    fn run_ticks(scheduler: &TaskScheduler, n: usize) {
        for _ in 0..n {
            scheduler.tick();
        }
    }

    #[test]
    fn test_teleport_lands_above_ground_after_delay() {
        let host = Arc::new(SimulatedHost::new());
        let scheduler = Arc::new(TaskScheduler::new());
        let teleports = service(&host, &scheduler);
        let player = PlayerHandle::new(Uuid::new_v4(), 1, "Walker");
        host.connect(player.clone(), Position::new(0.0, 70.0, 0.0));

        let outcome = teleports.request(&player, BlockPos::new(100, 10, 100));
        let TeleportOutcome::Scheduled { destination, .. } = outcome.clone() else {
            panic!("expected scheduled teleport, got {:?}", outcome);
        };
        assert_eq!(destination, BlockPos::new(100, GROUND_LEVEL, 100));
        assert!(teleports.has_pending(player.session));

        run_ticks(&scheduler, 59);
        assert_eq!(host.position(player.session).unwrap().to_block().x, 0);

        run_ticks(&scheduler, 1);
        assert_eq!(host.position(player.session).unwrap().to_block(), destination);
        assert!(!teleports.has_pending(player.session));
        assert!(host.drain_messages().iter().any(|m| matches!(
            m,
            DisplayMessage::ActionBar { text, .. } if text == COMPLETE_MESSAGE
        )));
    }

    #[test]
    fn test_second_request_hits_cooldown() {
        let host = Arc::new(SimulatedHost::new());
        let scheduler = Arc::new(TaskScheduler::new());
        let teleports = service(&host, &scheduler);
        let player = PlayerHandle::new(Uuid::new_v4(), 1, "Impatient");
        host.connect(player.clone(), Position::new(0.0, 70.0, 0.0));

        assert!(matches!(
            teleports.request(&player, BlockPos::new(5, 70, 5)),
            TeleportOutcome::Scheduled { .. }
        ));
        let outcome = teleports.request(&player, BlockPos::new(6, 70, 6));
        assert!(matches!(
            outcome,
            TeleportOutcome::CoolingDown { remaining_secs } if remaining_secs > 290
        ));

        let notices: Vec<DisplayMessage> = host
            .drain_messages()
            .into_iter()
            .filter(|m| matches!(m, DisplayMessage::ActionBar { .. }))
            .collect();
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn test_disconnect_cancels_pending() {
        let host = Arc::new(SimulatedHost::new());
        let scheduler = Arc::new(TaskScheduler::new());
        let teleports = service(&host, &scheduler);
        let player = PlayerHandle::new(Uuid::new_v4(), 1, "Leaver");
        host.connect(player.clone(), Position::new(0.0, 70.0, 0.0));

        teleports.request(&player, BlockPos::new(5, 70, 5));
        assert!(teleports.cancel_pending(player.session));
        assert!(!teleports.cancel_pending(player.session));
        assert_eq!(scheduler.task_count(), 0);
    }

    #[test]
    fn test_offline_player_not_moved() {
        let host = Arc::new(SimulatedHost::new());
        let scheduler = Arc::new(TaskScheduler::new());
        let teleports = service(&host, &scheduler);
        let player = PlayerHandle::new(Uuid::new_v4(), 1, "Ghost");
        host.connect(player.clone(), Position::new(0.0, 70.0, 0.0));

        teleports.request(&player, BlockPos::new(5, 70, 5));
        host.disconnect(player.session);
        run_ticks(&scheduler, 60);

        assert_eq!(teleports.sweep_stale(|s| host.is_online(s)), 1);
        assert!(host.drain_messages().is_empty());
    }
}
