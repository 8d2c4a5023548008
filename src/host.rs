//! Host collaborator contracts
//!
//! The plugin core never talks to the game engine directly. Everything it
//! needs from the host (player registry, world queries, display packets,
//! teleport execution) goes through the traits in this module.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::display::overlay::MapOverlayUpdate;
use crate::display::status_bar::StatusBar;

/// Identifier issued per connection. A reconnect gets a fresh id.
pub type SessionId = Uuid;

/// Stable account identifier, survives reconnects
pub type PlayerId = Uuid;

/// Errors reported by host collaborators
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    #[error("Player session {0} is not online")]
    PlayerOffline(SessionId),
    #[error("Transport failure: {0}")]
    Transport(String),
}

/// A connected player as reported by the host registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerHandle {
    pub session: SessionId,
    pub player_id: PlayerId,
    /// Engine-side numeric entity id
    pub runtime_id: u64,
    pub name: String,
}

impl PlayerHandle {
    pub fn new(player_id: PlayerId, runtime_id: u64, name: impl Into<String>) -> Self {
        Self {
            session: Uuid::new_v4(),
            player_id,
            runtime_id,
            name: name.into(),
        }
    }
}

/// Exact entity position in world units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Block containing this position
    #[inline]
    pub fn to_block(self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

/// Integer block coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn with_y(self, y: i32) -> Self {
        Self { y, ..self }
    }
}

/// Enumerates connected players and reports their positions
pub trait PlayerRegistry: Send + Sync {
    fn online_players(&self) -> Vec<PlayerHandle>;

    fn is_online(&self, session: SessionId) -> bool;

    fn position(&self, session: SessionId) -> Option<Position>;
}

/// Read-only world access
pub trait WorldQuery: Send + Sync {
    /// True when the block is unobstructed (air)
    fn is_passable(&self, pos: BlockPos) -> bool;

    /// Exclusive upper bound for block y coordinates
    fn max_height(&self) -> i32;
}

/// Pushes display packets to a player's client
pub trait DisplayTransport: Send + Sync {
    fn send_map_overlay(&self, session: SessionId, update: &MapOverlayUpdate) -> Result<(), HostError>;

    /// Transient centered title
    fn send_title(&self, session: SessionId, title: &str) -> Result<(), HostError>;

    fn send_action_bar(&self, session: SessionId, message: &str) -> Result<(), HostError>;

    /// Creates or updates the persistent status-bar widget
    fn push_status_bar(&self, session: SessionId, bar: &StatusBar) -> Result<(), HostError>;
}

/// Moves players
pub trait TeleportExecutor: Send + Sync {
    fn teleport(&self, session: SessionId, destination: BlockPos) -> Result<(), HostError>;
}
