//! Focus session engine
//! 
//! The session timer and the ambience mixer, each wired to persistence and
//! notices through injected collaborators.

pub mod ambience_mixer;
pub mod audio_channel;
pub mod session_timer;

// Re-export main types
pub use ambience_mixer::{AmbienceMixer, MixerError};
pub use audio_channel::{AudioChannel, ChannelEvent};
pub use session_timer::{SessionTimer, TimerError};
