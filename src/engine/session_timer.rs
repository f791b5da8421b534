//! Session timer service: drives [`TimerState`] with a one-second ticker

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    services::{
        persistence::{load_as, save_as, PersistenceGateway, TIMER_STATE_KEY},
        stats::StatsCollector,
    },
    state::{Completion, DurationTarget, Mode, Notice, TimerKind, TimerState},
    tasks::session_ticker,
};

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("Duration must be at least one minute")]
    InvalidDuration,

    #[error("Failed to lock timer state: {0}")]
    Lock(String),
}

struct TimerCore {
    state: TimerState,
    /// Identifies the ticker allowed to advance the countdown
    run_id: u64,
    ticker: Option<JoinHandle<()>>,
}

impl TimerCore {
    /// Invalidate and abort the live ticker, if any
    fn cancel_ticker(&mut self) {
        self.run_id += 1;
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

/// Pomodoro countdown with persistence, stats reporting and notices
pub struct SessionTimer {
    core: Mutex<TimerCore>,
    store: Arc<dyn PersistenceGateway>,
    stats: Arc<dyn StatsCollector>,
    notices: broadcast::Sender<Notice>,
    updates: watch::Sender<TimerState>,
}

impl SessionTimer {
    pub fn new(
        state: TimerState,
        store: Arc<dyn PersistenceGateway>,
        stats: Arc<dyn StatsCollector>,
        notices: broadcast::Sender<Notice>,
    ) -> Arc<Self> {
        let (updates, _) = watch::channel(state.clone());
        Arc::new(Self {
            core: Mutex::new(TimerCore {
                state,
                run_id: 0,
                ticker: None,
            }),
            store,
            stats,
            notices,
            updates,
        })
    }

    /// Restore the persisted timer, or start from `defaults`
    pub async fn load(
        defaults: TimerState,
        store: Arc<dyn PersistenceGateway>,
        stats: Arc<dyn StatsCollector>,
        notices: broadcast::Sender<Notice>,
    ) -> Arc<Self> {
        let state = match load_as::<TimerState>(store.as_ref(), TIMER_STATE_KEY).await {
            Some(saved) => {
                info!("Restored timer: {} sessions completed", saved.sessions_completed);
                saved.restored()
            }
            None => defaults,
        };
        Self::new(state, store, stats, notices)
    }

    fn lock(&self) -> Result<MutexGuard<'_, TimerCore>, TimerError> {
        self.core.lock().map_err(|e| TimerError::Lock(e.to_string()))
    }

    /// Persist and broadcast a new state
    fn publish(&self, state: &TimerState) {
        save_as(self.store.as_ref(), TIMER_STATE_KEY, state);
        self.updates.send_replace(state.clone());
    }

    fn notify(&self, notice: Notice) {
        if let Err(e) = self.notices.send(notice) {
            debug!("No notice listeners: {}", e);
        }
    }

    pub fn snapshot(&self) -> Result<TimerState, TimerError> {
        Ok(self.lock()?.state.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.updates.subscribe()
    }

    /// Start counting down. Returns false if already running.
    pub fn start(self: &Arc<Self>) -> Result<bool, TimerError> {
        let mut core = self.lock()?;
        if !core.state.start() {
            return Ok(false);
        }

        core.cancel_ticker();
        let run_id = core.run_id;
        core.ticker = Some(tokio::spawn(session_ticker(Arc::clone(self), run_id)));
        self.publish(&core.state);
        info!(
            "Timer started: {:?} with {}s remaining",
            core.state.mode, core.state.remaining_sec
        );
        drop(core);

        self.notify(Notice::info("Timer started!"));
        Ok(true)
    }

    /// Stop counting down. Returns false if not running.
    pub fn pause(&self) -> Result<bool, TimerError> {
        let mut core = self.lock()?;
        if !core.state.pause() {
            return Ok(false);
        }
        core.cancel_ticker();
        self.publish(&core.state);
        info!("Timer paused at {}s", core.state.remaining_sec);
        drop(core);

        self.notify(Notice::info("Timer paused"));
        Ok(true)
    }

    pub fn reset(&self) -> Result<(), TimerError> {
        let mut core = self.lock()?;
        core.cancel_ticker();
        core.state.reset();
        self.publish(&core.state);
        info!("Timer reset to {}s", core.state.remaining_sec);
        Ok(())
    }

    /// Update a configured duration. `Ok(false)` when the phase is running.
    pub fn set_duration(&self, target: DurationTarget, minutes: u32) -> Result<bool, TimerError> {
        if minutes == 0 {
            return Err(TimerError::InvalidDuration);
        }
        let mut core = self.lock()?;
        if !core.state.set_duration(target, minutes) {
            debug!("Ignoring {:?} duration change while running", target);
            return Ok(false);
        }
        self.publish(&core.state);
        info!("{:?} duration set to {} minutes", target, minutes);
        Ok(true)
    }

    pub fn change_mode(&self, mode: Mode) -> Result<(), TimerError> {
        let mut core = self.lock()?;
        core.cancel_ticker();
        core.state.change_mode(mode);
        self.publish(&core.state);
        info!("Timer switched to {:?}", mode);
        Ok(())
    }

    pub fn set_kind(&self, kind: TimerKind) -> Result<bool, TimerError> {
        let mut core = self.lock()?;
        if !core.state.set_kind(kind) {
            return Ok(false);
        }
        self.publish(&core.state);
        info!("Timer kind set to {:?}", kind);
        Ok(true)
    }

    /// End the current phase immediately, as if its countdown had run out
    pub fn complete(&self) -> Result<(), TimerError> {
        let completion = {
            let mut core = self.lock()?;
            core.cancel_ticker();
            let completion = core.state.complete();
            self.publish(&core.state);
            completion
        };
        self.finish(completion);
        Ok(())
    }

    /// Advance one second on behalf of ticker `run_id`.
    ///
    /// Returns false once the ticker should stop: it was superseded, the
    /// timer is no longer running, or the phase just completed.
    pub fn tick(&self, run_id: u64) -> bool {
        let completion = {
            let mut core = match self.lock() {
                Ok(core) => core,
                Err(e) => {
                    warn!("{}", e);
                    return false;
                }
            };
            if core.run_id != run_id || !core.state.is_running {
                return false;
            }

            let completion = core.state.tick();
            if completion.is_some() {
                // The ticker is finishing on its own; just forget its handle.
                core.ticker = None;
            }
            self.publish(&core.state);
            completion
        };

        match completion {
            Some(completion) => {
                self.finish(completion);
                false
            }
            None => true,
        }
    }

    fn finish(&self, completion: Completion) {
        info!("{:?} phase complete", completion.finished);
        if let Some(minutes) = completion.recorded_minutes {
            self.stats.record_session(minutes);
        }
        self.notify(completion.notice);
    }

    /// Cancel the ticker without touching the saved state
    pub fn shutdown(&self) {
        if let Ok(mut core) = self.lock() {
            core.cancel_ticker();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::persistence::MemoryStore;
    use crate::state::Severity;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingStats {
        sessions: std::sync::Mutex<Vec<u32>>,
    }

    impl StatsCollector for RecordingStats {
        fn record_session(&self, minutes: u32) {
            self.sessions.lock().unwrap().push(minutes);
        }
    }

    struct Fixture {
        timer: Arc<SessionTimer>,
        store: Arc<MemoryStore>,
        stats: Arc<RecordingStats>,
        notices: broadcast::Receiver<Notice>,
    }

    fn fixture(state: TimerState) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let stats = Arc::new(RecordingStats::default());
        let (tx, notices) = broadcast::channel(32);
        let timer = SessionTimer::new(state, store.clone(), stats.clone(), tx);
        Fixture {
            timer,
            store,
            stats,
            notices,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_rolls_work_into_paused_break() {
        let mut f = fixture(TimerState::new(120, 60, 180));
        assert!(f.timer.start().unwrap());
        assert!(!f.timer.start().unwrap());

        tokio::time::sleep(Duration::from_millis(120_500)).await;

        let state = f.timer.snapshot().unwrap();
        assert_eq!(state.mode, Mode::Break);
        assert_eq!(state.remaining_sec, 60);
        assert_eq!(state.sessions_completed, 1);
        assert!(!state.is_running);
        assert_eq!(*f.stats.sessions.lock().unwrap(), vec![2]);

        assert_eq!(f.notices.recv().await.unwrap().message, "Timer started!");
        let done = f.notices.recv().await.unwrap();
        assert_eq!(done.severity, Severity::Success);
        assert_eq!(done.message, "Session complete! Take a 1-minute break.");

        // The break waits for an explicit start.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.timer.snapshot().unwrap().remaining_sec, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_ticks() {
        let f = fixture(TimerState::default());
        f.timer.start().unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert!(f.timer.pause().unwrap());
        assert_eq!(f.timer.snapshot().unwrap().remaining_sec, 1497);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(f.timer.snapshot().unwrap().remaining_sec, 1497);
        assert!(!f.timer.pause().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_while_running_stops_ticks() {
        let f = fixture(TimerState::default());
        f.timer.start().unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        f.timer.reset().unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        let state = f.timer.snapshot().unwrap();
        assert_eq!(state.remaining_sec, 1500);
        assert!(!state.is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn mode_change_while_running_stops_ticks() {
        let f = fixture(TimerState::default());
        f.timer.start().unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        f.timer.change_mode(Mode::Break).unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        let state = f.timer.snapshot().unwrap();
        assert_eq!(state.mode, Mode::Break);
        assert_eq!(state.remaining_sec, 300);
        assert!(!state.is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn kind_change_while_running_is_ignored() {
        let f = fixture(TimerState::default());
        f.timer.start().unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(!f.timer.set_kind(TimerKind::Custom).unwrap());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let state = f.timer.snapshot().unwrap();
        assert_eq!(state.kind, TimerKind::Pomodoro);
        assert_eq!(state.remaining_sec, 1497);
        f.timer.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_observe_ticks() {
        let f = fixture(TimerState::default());
        let mut updates = f.timer.subscribe();
        f.timer.start().unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        assert!(updates.has_changed().unwrap());
        let latest = updates.borrow_and_update().clone();
        assert!(latest.is_running);
        assert_eq!(latest.remaining_sec, 1498);
        f.timer.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_keeps_a_single_ticker() {
        let f = fixture(TimerState::default());
        f.timer.start().unwrap();
        f.timer.pause().unwrap();
        f.timer.start().unwrap();
        f.timer.pause().unwrap();
        f.timer.start().unwrap();

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(f.timer.snapshot().unwrap().remaining_sec, 1495);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_ticker_cannot_advance() {
        let f = fixture(TimerState::default());
        f.timer.start().unwrap();
        assert!(!f.timer.tick(0));
        assert_eq!(f.timer.snapshot().unwrap().remaining_sec, 1500);
    }

    #[tokio::test]
    async fn every_mutation_is_persisted() {
        let f = fixture(TimerState::default());
        f.timer.set_duration(DurationTarget::Work, 50).unwrap();
        let saved = f.store.get(TIMER_STATE_KEY).unwrap();
        assert_eq!(saved["workDurationSec"], 3000);
        assert_eq!(saved["remainingSec"], 3000);

        f.timer.change_mode(Mode::Break).unwrap();
        let saved = f.store.get(TIMER_STATE_KEY).unwrap();
        assert_eq!(saved["mode"], "break");
    }

    #[tokio::test]
    async fn zero_minute_duration_is_rejected() {
        let f = fixture(TimerState::default());
        assert!(matches!(
            f.timer.set_duration(DurationTarget::ShortBreak, 0),
            Err(TimerError::InvalidDuration)
        ));
        assert_eq!(f.timer.snapshot().unwrap().short_break_sec, 300);
        assert!(f.store.get(TIMER_STATE_KEY).is_none());
    }

    #[tokio::test]
    async fn running_phase_duration_change_is_ignored() {
        let f = fixture(TimerState::default());
        f.timer.start().unwrap();
        assert!(!f.timer.set_duration(DurationTarget::Work, 45).unwrap());
        assert!(f.timer.set_duration(DurationTarget::LongBreak, 20).unwrap());
        f.timer.shutdown();
    }

    #[tokio::test]
    async fn manual_complete_from_break_skips_stats() {
        let f = fixture(TimerState::default());
        f.timer.change_mode(Mode::Break).unwrap();
        f.timer.complete().unwrap();

        let state = f.timer.snapshot().unwrap();
        assert_eq!(state.mode, Mode::Work);
        assert_eq!(state.sessions_completed, 0);
        assert!(f.stats.sessions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_restores_paused_state() {
        let store = Arc::new(MemoryStore::new());
        let mut saved = TimerState::default();
        saved.sessions_completed = 7;
        saved.remaining_sec = 600;
        saved.is_running = true;
        save_as(store.as_ref(), TIMER_STATE_KEY, &saved);

        let (tx, _) = broadcast::channel(4);
        let timer = SessionTimer::load(
            TimerState::default(),
            store,
            Arc::new(RecordingStats::default()),
            tx,
        )
        .await;
        let state = timer.snapshot().unwrap();
        assert_eq!(state.sessions_completed, 7);
        assert_eq!(state.remaining_sec, 600);
        assert!(!state.is_running);
    }
}
