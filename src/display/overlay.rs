use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use tracing::debug;

use crate::host::{BlockPos, DisplayTransport, HostError, PlayerHandle, PlayerRegistry, Position};
use crate::metrics::PluginMetrics;
use crate::state::PlayerStateStore;

pub const POSITION_LABEL: &str = "Current position";

/// Map scale sent with every overlay (1:2)
pub const OVERLAY_SCALE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    RedX,
}

/// One decoration drawn on the map item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapMarker {
    pub kind: MarkerKind,
    pub x: i8,
    pub z: i8,
    pub label: String,
}

/// Map-item data pushed to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapOverlayUpdate {
    pub map_id: i64,
    pub scale: u8,
    pub decorations: SmallVec<[MapMarker; 1]>,
}

/// Overlay identifier: entity id in the top 16 bits, then x, z and a
/// 16-bit freshness stamp.
pub fn overlay_id(runtime_id: u64, pos: BlockPos, stamp: u64) -> i64 {
    ((runtime_id as i64) << 48)
        | (((pos.x as i64) & 0xFFFF) << 32)
        | (((pos.z as i64) & 0xFFFF) << 16)
        | ((stamp as i64) & 0xFFFF)
}

/// Marker coordinates in map space (1024 blocks per unit, wrapping)
#[inline]
pub fn marker_coords(pos: BlockPos) -> (i8, i8) {
    ((pos.x >> 10) as i8, (pos.z >> 10) as i8)
}

pub fn build_overlay(player: &PlayerHandle, position: Position, stamp: u64) -> MapOverlayUpdate {
    let block = position.to_block();
    let (x, z) = marker_coords(block);
    MapOverlayUpdate {
        map_id: overlay_id(player.runtime_id, block, stamp),
        scale: OVERLAY_SCALE,
        decorations: smallvec![MapMarker {
            kind: MarkerKind::RedX,
            x,
            z,
            label: POSITION_LABEL.to_string(),
        }],
    }
}

/// Periodic map marker push for every tracked, online player
pub struct MapOverlayJob {
    registry: Arc<dyn PlayerRegistry>,
    store: Arc<PlayerStateStore>,
    transport: Arc<dyn DisplayTransport>,
    metrics: Arc<PluginMetrics>,
}

impl MapOverlayJob {
    pub fn new(
        registry: Arc<dyn PlayerRegistry>,
        store: Arc<PlayerStateStore>,
        transport: Arc<dyn DisplayTransport>,
        metrics: Arc<PluginMetrics>,
    ) -> Self {
        Self {
            registry,
            store,
            transport,
            metrics,
        }
    }

    /// Returns the number of overlays pushed
    pub fn run(&self, tick: u64) -> usize {
        let mut sent = 0;
        for player in self.registry.online_players() {
            if !self.store.contains(player.session) {
                continue;
            }
            if self.push(&player, tick).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Push one overlay to `player`
    pub fn push(&self, player: &PlayerHandle, tick: u64) -> Result<(), HostError> {
        let position = self
            .registry
            .position(player.session)
            .ok_or(HostError::PlayerOffline(player.session))?;

        let update = build_overlay(player, position, tick);
        match self.transport.send_map_overlay(player.session, &update) {
            Ok(()) => {
                PluginMetrics::incr(&self.metrics.overlay_updates_sent);
                Ok(())
            }
            Err(e) => {
                PluginMetrics::incr(&self.metrics.display_errors);
                debug!("Map overlay push to {} failed: {}", player.name, e);
                Err(e)
            }
        }
    }
}
