//! Focus Engine - A pomodoro timer and ambience mixer for focus sessions
//! 
//! This library provides the session timer state machine, the multi-channel
//! ambience mixer, their persistence and stats collaborators, and an HTTP
//! control surface for the UI layer.

pub mod config;
pub mod state;
pub mod engine;
pub mod api;
pub mod services;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
pub use engine::{AmbienceMixer, SessionTimer};
pub use api::create_router;
pub use utils::signals::shutdown_signal;
