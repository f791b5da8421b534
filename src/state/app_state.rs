//! Main application state management

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::info;

use super::{Notice, TimerState};
use crate::{
    engine::{AmbienceMixer, SessionTimer},
    services::{AudioBackend, FocusStats, PersistenceGateway, SoundDef},
    utils::format,
};

/// Everything the HTTP layer needs: the engine, stats and server metadata
pub struct AppState {
    pub timer: Arc<SessionTimer>,
    pub mixer: Arc<AmbienceMixer>,
    pub stats: Arc<FocusStats>,
    /// Notices for the UI layer (toasts)
    pub notices: broadcast::Sender<Notice>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Arc<Mutex<Option<String>>>,
    pub last_action_time: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl AppState {
    /// Load persisted state and wire the timer and mixer to their collaborators
    pub async fn load(
        port: u16,
        host: String,
        timer_defaults: TimerState,
        store: Arc<dyn PersistenceGateway>,
        backend: Arc<dyn AudioBackend>,
        catalog: Vec<SoundDef>,
    ) -> Self {
        let (notices, _) = broadcast::channel(100);

        let stats = Arc::new(FocusStats::load(Arc::clone(&store)).await);
        let timer = SessionTimer::load(
            timer_defaults,
            Arc::clone(&store),
            stats.clone(),
            notices.clone(),
        )
        .await;
        let mixer = Arc::new(AmbienceMixer::load(catalog, backend, store, notices.clone()).await);

        info!("Application state loaded");
        Self {
            timer,
            mixer,
            stats,
            notices,
            start_time: Instant::now(),
            port,
            host,
            last_action: Arc::new(Mutex::new(None)),
            last_action_time: Arc::new(Mutex::new(None)),
        }
    }

    /// Remember the most recent user action
    pub fn record_action(&self, action: &str) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        format::uptime(self.start_time.elapsed())
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }

    /// Stop the ticker and every live audio source
    pub fn shutdown(&self) {
        self.timer.shutdown();
        self.mixer.shutdown();
        info!("Engine stopped");
    }
}
