//! Hybrid Map Plugin Library
//!
//! HUD and map behavior for a game server: a persistent coordinate status
//! bar, a periodically refreshed map marker, a full-screen map toggle and a
//! cooldown-gated teleport with safe landing. Refresh intervals back off
//! under load.
//!
//! The game engine is reached only through the traits in [`host`]; the
//! [`sim`] module provides an in-memory implementation.

pub mod config;
pub mod controller;
pub mod display;
pub mod driver;
pub mod events;
pub mod host;
pub mod load;
pub mod metrics;
pub mod plugin;
pub mod scheduler;
pub mod sim;
pub mod state;
pub mod teleport;

pub use config::PluginConfig;
pub use plugin::{HostServices, HybridMapPlugin};
