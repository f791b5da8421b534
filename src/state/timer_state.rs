//! Session timer state machine
//!
//! `TimerState` is the persisted countdown: a `mode` axis (work/break) and a
//! running flag. Every operation here is a pure in-memory transition; the
//! ticking task, persistence and notifications live in
//! [`crate::engine::SessionTimer`].

use serde::{Deserialize, Serialize};

use super::notice::Notice;

pub const DEFAULT_WORK_SEC: u32 = 25 * 60;
pub const DEFAULT_SHORT_BREAK_SEC: u32 = 5 * 60;
pub const DEFAULT_LONG_BREAK_SEC: u32 = 15 * 60;
pub const DEFAULT_LONG_BREAK_INTERVAL: u32 = 4;

/// Current phase of the cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Work,
    Break,
}

/// Which break is in progress while `mode == Break`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    #[default]
    Short,
    Long,
}

/// Whether completed work phases roll into breaks or simply restart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerKind {
    #[default]
    Pomodoro,
    Custom,
}

/// Configurable duration slot addressed by `set_duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DurationTarget {
    Work,
    ShortBreak,
    LongBreak,
}

/// Result of a phase running out
#[derive(Debug, Clone)]
pub struct Completion {
    /// Phase that just finished
    pub finished: Mode,
    /// Minutes to report to the stats collector (work phases only)
    pub recorded_minutes: Option<u32>,
    pub notice: Notice,
}

fn default_long_break_interval() -> u32 {
    DEFAULT_LONG_BREAK_INTERVAL
}

/// Persisted timer state (`timer-state`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub mode: Mode,
    #[serde(default)]
    pub kind: TimerKind,
    #[serde(default)]
    pub break_kind: BreakKind,
    pub work_duration_sec: u32,
    pub short_break_sec: u32,
    pub long_break_sec: u32,
    #[serde(default = "default_long_break_interval")]
    pub long_break_interval: u32,
    pub remaining_sec: u32,
    pub sessions_completed: u32,
    pub is_running: bool,
}

impl TimerState {
    /// Create an idle work phase with the given durations (seconds)
    pub fn new(work_sec: u32, short_break_sec: u32, long_break_sec: u32) -> Self {
        Self {
            mode: Mode::Work,
            kind: TimerKind::Pomodoro,
            break_kind: BreakKind::Short,
            work_duration_sec: work_sec.max(1),
            short_break_sec: short_break_sec.max(1),
            long_break_sec: long_break_sec.max(1),
            long_break_interval: DEFAULT_LONG_BREAK_INTERVAL,
            remaining_sec: work_sec.max(1),
            sessions_completed: 0,
            is_running: false,
        }
    }

    pub fn with_long_break_interval(mut self, interval: u32) -> Self {
        self.long_break_interval = interval.max(1);
        self
    }

    /// Normalize a state read back from storage.
    ///
    /// Nothing is ticking at load time, so the restored timer is always paused.
    pub fn restored(mut self) -> Self {
        self.work_duration_sec = self.work_duration_sec.max(1);
        self.short_break_sec = self.short_break_sec.max(1);
        self.long_break_sec = self.long_break_sec.max(1);
        self.long_break_interval = self.long_break_interval.max(1);
        self.remaining_sec = self.remaining_sec.min(self.active_duration());
        self.is_running = false;
        self
    }

    /// Configured length of the phase currently in `mode`
    pub fn active_duration(&self) -> u32 {
        match (self.mode, self.break_kind) {
            (Mode::Work, _) => self.work_duration_sec,
            (Mode::Break, BreakKind::Short) => self.short_break_sec,
            (Mode::Break, BreakKind::Long) => self.long_break_sec,
        }
    }

    fn active_target(&self) -> DurationTarget {
        match (self.mode, self.break_kind) {
            (Mode::Work, _) => DurationTarget::Work,
            (Mode::Break, BreakKind::Short) => DurationTarget::ShortBreak,
            (Mode::Break, BreakKind::Long) => DurationTarget::LongBreak,
        }
    }

    /// Begin counting down. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.is_running {
            return false;
        }
        if self.remaining_sec == 0 {
            self.remaining_sec = self.active_duration();
        }
        self.is_running = true;
        true
    }

    /// Stop counting down. Returns false if not running.
    pub fn pause(&mut self) -> bool {
        if !self.is_running {
            return false;
        }
        self.is_running = false;
        true
    }

    /// Pause and rewind the current phase; `mode` is untouched
    pub fn reset(&mut self) {
        self.is_running = false;
        self.remaining_sec = self.active_duration();
    }

    /// Advance one second. Returns the completion when the phase runs out.
    pub fn tick(&mut self) -> Option<Completion> {
        if !self.is_running {
            return None;
        }
        self.remaining_sec = self.remaining_sec.saturating_sub(1);
        if self.remaining_sec == 0 {
            Some(self.complete())
        } else {
            None
        }
    }

    /// Finish the current phase and set up the next one, paused
    pub fn complete(&mut self) -> Completion {
        self.is_running = false;
        let finished = self.mode;

        match (self.mode, self.kind) {
            (Mode::Work, TimerKind::Pomodoro) => {
                self.sessions_completed += 1;
                let recorded = self.work_duration_sec / 60;
                self.break_kind = if self.sessions_completed % self.long_break_interval == 0 {
                    BreakKind::Long
                } else {
                    BreakKind::Short
                };
                self.mode = Mode::Break;
                self.remaining_sec = self.active_duration();
                let minutes = self.remaining_sec / 60;
                Completion {
                    finished,
                    recorded_minutes: Some(recorded),
                    notice: Notice::success(format!(
                        "Session complete! Take a {}-minute break.",
                        minutes
                    )),
                }
            }
            (Mode::Work, TimerKind::Custom) => {
                self.sessions_completed += 1;
                self.remaining_sec = self.work_duration_sec;
                Completion {
                    finished,
                    recorded_minutes: Some(self.work_duration_sec / 60),
                    notice: Notice::success("Timer finished!"),
                }
            }
            (Mode::Break, _) => {
                self.mode = Mode::Work;
                self.break_kind = BreakKind::Short;
                self.remaining_sec = self.work_duration_sec;
                Completion {
                    finished,
                    recorded_minutes: None,
                    notice: Notice::success("Break finished! Time to focus."),
                }
            }
        }
    }

    /// Change a configured duration.
    ///
    /// Ignored (returns false) when `target` is the phase currently counting
    /// down. Zero minutes must be rejected by the caller.
    pub fn set_duration(&mut self, target: DurationTarget, minutes: u32) -> bool {
        let is_active = target == self.active_target();
        if is_active && self.is_running {
            return false;
        }
        let seconds = minutes.max(1).saturating_mul(60);
        match target {
            DurationTarget::Work => self.work_duration_sec = seconds,
            DurationTarget::ShortBreak => self.short_break_sec = seconds,
            DurationTarget::LongBreak => self.long_break_sec = seconds,
        }
        if is_active {
            self.remaining_sec = seconds;
        }
        true
    }

    /// Force-switch the phase from an explicit UI toggle
    pub fn change_mode(&mut self, mode: Mode) {
        self.is_running = false;
        self.mode = mode;
        self.break_kind = BreakKind::Short;
        self.remaining_sec = self.active_duration();
    }

    /// Switch between pomodoro and custom cycles. Ignored while running.
    ///
    /// Re-selecting the current kind keeps the phase and its progress.
    pub fn set_kind(&mut self, kind: TimerKind) -> bool {
        if self.is_running {
            return false;
        }
        if kind == self.kind {
            return true;
        }
        self.kind = kind;
        self.change_mode(Mode::Work);
        true
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new(DEFAULT_WORK_SEC, DEFAULT_SHORT_BREAK_SEC, DEFAULT_LONG_BREAK_SEC)
    }
}
