//! Countdown ticker background task

use std::{sync::Arc, time::Duration};
use tokio::time::{interval_at, Instant};
use tracing::debug;

use crate::engine::SessionTimer;

/// Background task that advances the session timer once per second.
///
/// Exits as soon as the timer reports the run is over (paused, superseded by
/// a newer ticker, or the phase completed).
pub async fn session_ticker(timer: Arc<SessionTimer>, run_id: u64) {
    debug!("Starting session ticker (run {})", run_id);

    let period = Duration::from_secs(1);
    let mut interval = interval_at(Instant::now() + period, period);

    loop {
        interval.tick().await;
        if !timer.tick(run_id) {
            break;
        }
    }

    debug!("Session ticker stopped (run {})", run_id);
}
