//! Per-player state shared between the event path and the scheduled jobs
//!
//! Both containers are internally synchronized; callers never lock.

pub mod cooldown;
pub mod store;

pub use cooldown::{CooldownDecision, CooldownTracker};
pub use store::{PlayerStateStore, PlayerUiState};
