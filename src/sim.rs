//! In-memory host
//!
//! Implements every host trait against plain maps so the plugin can run
//! without a game engine: used by the demo binary, tests and benches.
//! Display traffic is captured on a channel for inspection.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};
use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;

use crate::display::overlay::MapOverlayUpdate;
use crate::display::status_bar::StatusBar;
use crate::host::{
    BlockPos, DisplayTransport, HostError, PlayerHandle, PlayerRegistry, Position, SessionId,
    TeleportExecutor, WorldQuery,
};

/// Blocks below this height are solid ground
pub const GROUND_LEVEL: i32 = 64;
pub const WORLD_HEIGHT: i32 = 256;

/// A display packet captured by the simulated transport
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayMessage {
    MapOverlay { session: SessionId, update: MapOverlayUpdate },
    Title { session: SessionId, text: String },
    ActionBar { session: SessionId, text: String },
    StatusBar { session: SessionId, bar: StatusBar },
}

impl DisplayMessage {
    pub fn session(&self) -> SessionId {
        match self {
            DisplayMessage::MapOverlay { session, .. }
            | DisplayMessage::Title { session, .. }
            | DisplayMessage::ActionBar { session, .. }
            | DisplayMessage::StatusBar { session, .. } => *session,
        }
    }
}

#[derive(Debug, Clone)]
struct SimPlayer {
    handle: PlayerHandle,
    position: Position,
}

pub struct SimulatedHost {
    players: RwLock<HashMap<SessionId, SimPlayer>>,
    /// Solid blocks above ground level
    obstacles: RwLock<HashSet<BlockPos>>,
    /// Air pockets below ground level
    cavities: RwLock<HashSet<BlockPos>>,
    sender: Sender<DisplayMessage>,
    receiver: Receiver<DisplayMessage>,
    transport_down: AtomicBool,
}

impl SimulatedHost {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            players: RwLock::new(HashMap::new()),
            obstacles: RwLock::new(HashSet::new()),
            cavities: RwLock::new(HashSet::new()),
            sender,
            receiver,
            transport_down: AtomicBool::new(false),
        }
    }

    pub fn connect(&self, handle: PlayerHandle, position: Position) {
        self.players
            .write()
            .insert(handle.session, SimPlayer { handle, position });
    }

    pub fn disconnect(&self, session: SessionId) -> bool {
        self.players.write().remove(&session).is_some()
    }

    pub fn move_player(&self, session: SessionId, position: Position) -> bool {
        match self.players.write().get_mut(&session) {
            Some(player) => {
                player.position = position;
                true
            }
            None => false,
        }
    }

    pub fn place_block(&self, pos: BlockPos) {
        if pos.y < GROUND_LEVEL {
            self.cavities.write().remove(&pos);
        } else {
            self.obstacles.write().insert(pos);
        }
    }

    pub fn clear_block(&self, pos: BlockPos) {
        if pos.y < GROUND_LEVEL {
            self.cavities.write().insert(pos);
        } else {
            self.obstacles.write().remove(&pos);
        }
    }

    /// Make every display push fail until switched back
    pub fn set_transport_down(&self, down: bool) {
        self.transport_down.store(down, Ordering::Relaxed);
    }

    /// Take all captured display messages
    pub fn drain_messages(&self) -> Vec<DisplayMessage> {
        self.receiver.try_iter().collect()
    }

    fn deliver(&self, session: SessionId, message: DisplayMessage) -> Result<(), HostError> {
        if self.transport_down.load(Ordering::Relaxed) {
            return Err(HostError::Transport("simulated outage".to_string()));
        }
        if !self.is_online(session) {
            return Err(HostError::PlayerOffline(session));
        }
        self.sender
            .send(message)
            .map_err(|e| HostError::Transport(e.to_string()))
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerRegistry for SimulatedHost {
    fn online_players(&self) -> Vec<PlayerHandle> {
        self.players
            .read()
            .values()
            .map(|p| p.handle.clone())
            .collect()
    }

    fn is_online(&self, session: SessionId) -> bool {
        self.players.read().contains_key(&session)
    }

    fn position(&self, session: SessionId) -> Option<Position> {
        self.players.read().get(&session).map(|p| p.position)
    }
}

impl WorldQuery for SimulatedHost {
    fn is_passable(&self, pos: BlockPos) -> bool {
        if pos.y < GROUND_LEVEL {
            self.cavities.read().contains(&pos)
        } else {
            !self.obstacles.read().contains(&pos)
        }
    }

    fn max_height(&self) -> i32 {
        WORLD_HEIGHT
    }
}

impl DisplayTransport for SimulatedHost {
    fn send_map_overlay(&self, session: SessionId, update: &MapOverlayUpdate) -> Result<(), HostError> {
        self.deliver(
            session,
            DisplayMessage::MapOverlay {
                session,
                update: update.clone(),
            },
        )
    }

    fn send_title(&self, session: SessionId, title: &str) -> Result<(), HostError> {
        self.deliver(
            session,
            DisplayMessage::Title {
                session,
                text: title.to_string(),
            },
        )
    }

    fn send_action_bar(&self, session: SessionId, message: &str) -> Result<(), HostError> {
        self.deliver(
            session,
            DisplayMessage::ActionBar {
                session,
                text: message.to_string(),
            },
        )
    }

    fn push_status_bar(&self, session: SessionId, bar: &StatusBar) -> Result<(), HostError> {
        self.deliver(
            session,
            DisplayMessage::StatusBar {
                session,
                bar: bar.clone(),
            },
        )
    }
}

impl TeleportExecutor for SimulatedHost {
    fn teleport(&self, session: SessionId, destination: BlockPos) -> Result<(), HostError> {
        let position = Position::new(
            destination.x as f64 + 0.5,
            destination.y as f64,
            destination.z as f64 + 0.5,
        );
        if self.move_player(session, position) {
            Ok(())
        } else {
            Err(HostError::PlayerOffline(session))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_ground_and_obstacles() {
        let host = SimulatedHost::new();
        assert!(!host.is_passable(BlockPos::new(0, GROUND_LEVEL - 1, 0)));
        assert!(host.is_passable(BlockPos::new(0, GROUND_LEVEL, 0)));

        host.place_block(BlockPos::new(0, GROUND_LEVEL, 0));
        assert!(!host.is_passable(BlockPos::new(0, GROUND_LEVEL, 0)));

        host.clear_block(BlockPos::new(0, 10, 0));
        assert!(host.is_passable(BlockPos::new(0, 10, 0)));
    }

    #[test]
    fn test_delivery_requires_online_player() {
        let host = SimulatedHost::new();
        let player = PlayerHandle::new(Uuid::new_v4(), 7, "Sim");

        assert!(matches!(
            host.send_title(player.session, "hi"),
            Err(HostError::PlayerOffline(_))
        ));

        host.connect(player.clone(), Position::default());
        host.send_title(player.session, "hi").unwrap();
        assert_eq!(host.drain_messages().len(), 1);

        host.set_transport_down(true);
        assert!(matches!(
            host.send_action_bar(player.session, "x"),
            Err(HostError::Transport(_))
        ));
    }

    #[test]
    fn test_teleport_moves_to_block_center() {
        let host = SimulatedHost::new();
        let player = PlayerHandle::new(Uuid::new_v4(), 7, "Sim");
        host.connect(player.clone(), Position::default());

        host.teleport(player.session, BlockPos::new(3, 70, -2)).unwrap();
        assert_eq!(
            host.position(player.session).unwrap().to_block(),
            BlockPos::new(3, 70, -2)
        );
    }
}
