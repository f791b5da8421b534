//! Background tasks module
//! 
//! This module contains background tasks that run alongside the HTTP server.

pub mod notice_log;
pub mod session_ticker;

// Re-export main functions
pub use notice_log::notice_log_task;
pub use session_ticker::session_ticker;
