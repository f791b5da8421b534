//! Notice logging background task

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::state::{Notice, Severity};

/// Background task that logs every notice emitted by the engine
pub async fn notice_log_task(mut notices: broadcast::Receiver<Notice>) {
    info!("Starting notice log task");

    loop {
        match notices.recv().await {
            Ok(notice) => match notice.severity {
                Severity::Warning => warn!("[notice] {}", notice.message),
                Severity::Info | Severity::Success => {
                    info!("[notice:{:?}] {}", notice.severity, notice.message)
                }
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!("Notice log fell behind, skipped {} notices", skipped);
            }
            Err(RecvError::Closed) => {
                info!("Notice channel closed, stopping notice log task");
                break;
            }
        }
    }
}
