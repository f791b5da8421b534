//! State management module
//! 
//! This module contains all state-related structures and their management logic.

pub mod app_state;
pub mod mixer_state;
pub mod notice;
pub mod timer_state;

// Re-export main types
pub use app_state::AppState;
pub use mixer_state::{clamp_volume, effective_volume, ChannelState, MixerState};
pub use notice::{Notice, Severity};
pub use timer_state::{BreakKind, Completion, DurationTarget, Mode, TimerKind, TimerState};
