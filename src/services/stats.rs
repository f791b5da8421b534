//! Focus statistics: totals, daily minutes, streaks and achievements

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::persistence::{load_as, save_as, PersistenceGateway, STATS_KEY};

/// Receiver of completed work sessions
pub trait StatsCollector: Send + Sync {
    fn record_session(&self, minutes: u32);
}

/// Achievement thresholds, checked after every recorded session
const ACHIEVEMENTS: &[(&str, Threshold)] = &[
    ("first-session", Threshold::Sessions(1)),
    ("10-sessions", Threshold::Sessions(10)),
    ("100-sessions", Threshold::Sessions(100)),
    ("3-day-streak", Threshold::Streak(3)),
    ("7-day-streak", Threshold::Streak(7)),
    ("30-day-streak", Threshold::Streak(30)),
    ("10-hours", Threshold::Minutes(600)),
    ("100-hours", Threshold::Minutes(6000)),
];

#[derive(Debug, Clone, Copy)]
enum Threshold {
    Sessions(u32),
    Streak(u32),
    Minutes(u64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_minutes: u64,
    pub today_minutes: u64,
    pub sessions: u32,
    pub streak: u32,
    pub last_session_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub achievements: Vec<String>,
}

impl StatsSnapshot {
    /// Fold one session finished on `today` into the totals.
    /// Returns the achievements it unlocked.
    pub fn record(&mut self, minutes: u32, now: DateTime<Utc>, today: NaiveDate) -> Vec<String> {
        let last_day = self
            .last_session_date
            .map(|at| at.with_timezone(&Local).date_naive());

        match last_day {
            Some(day) if day == today => {}
            Some(day) if today.pred_opt() == Some(day) => {
                self.streak += 1;
                self.today_minutes = 0;
            }
            Some(_) => {
                self.streak = 1;
                self.today_minutes = 0;
            }
            None => self.streak = 1,
        }

        self.sessions += 1;
        self.total_minutes += u64::from(minutes);
        self.today_minutes += u64::from(minutes);
        self.last_session_date = Some(now);

        self.unlock_achievements()
    }

    fn unlock_achievements(&mut self) -> Vec<String> {
        let mut unlocked = Vec::new();
        for (id, threshold) in ACHIEVEMENTS {
            let reached = match *threshold {
                Threshold::Sessions(n) => self.sessions >= n,
                Threshold::Streak(n) => self.streak >= n,
                Threshold::Minutes(n) => self.total_minutes >= n,
            };
            if reached && !self.achievements.iter().any(|a| a == id) {
                self.achievements.push(id.to_string());
                unlocked.push(id.to_string());
            }
        }
        unlocked
    }
}

/// Persisted stats collector
pub struct FocusStats {
    snapshot: Mutex<StatsSnapshot>,
    store: Arc<dyn PersistenceGateway>,
}

impl FocusStats {
    pub async fn load(store: Arc<dyn PersistenceGateway>) -> Self {
        let snapshot = load_as(store.as_ref(), STATS_KEY).await.unwrap_or_default();
        Self {
            snapshot: Mutex::new(snapshot),
            store,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl StatsCollector for FocusStats {
    fn record_session(&self, minutes: u32) {
        let mut snapshot = match self.snapshot.lock() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to lock stats: {}", e);
                return;
            }
        };

        let unlocked = snapshot.record(minutes, Utc::now(), Local::now().date_naive());
        info!(
            "Recorded {}-minute session (total {} sessions, streak {})",
            minutes, snapshot.sessions, snapshot.streak
        );
        for id in &unlocked {
            info!("Achievement unlocked: {}", id);
        }
        save_as(self.store.as_ref(), STATS_KEY, &*snapshot);
    }
}
