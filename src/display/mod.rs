//! Display update jobs
//!
//! Map overlay refresh, coordinate status bar refresh and the full-screen
//! map toggle. Each job holds only the collaborators it needs.

pub mod fullscreen;
pub mod overlay;
pub mod status_bar;

pub use fullscreen::{FullScreenToggle, ToggleOutcome};
pub use overlay::{MapOverlayJob, MapOverlayUpdate};
pub use status_bar::{StatusBar, StatusBarJob, StatusBarRegistry};
