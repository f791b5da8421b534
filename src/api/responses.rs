//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    services::{SoundDef, StatsSnapshot},
    state::{effective_volume, DurationTarget, MixerState, Mode, TimerKind, TimerState},
    utils::format,
};

/// Timer snapshot with its `mm:ss` rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    #[serde(flatten)]
    pub state: TimerState,
    pub display: String,
}

impl From<TimerState> for TimerView {
    fn from(state: TimerState) -> Self {
        let display = format::clock(state.remaining_sec);
        Self { state, display }
    }
}

/// Response for timer commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerResponse {
    /// False when the command was a no-op (already running, phase locked, ...)
    pub applied: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub timer: TimerView,
}

impl TimerResponse {
    pub fn new(applied: bool, message: impl Into<String>, timer: TimerState) -> Self {
        Self {
            applied,
            message: message.into(),
            timestamp: Utc::now(),
            timer: timer.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: String,
    pub display_name: String,
    pub volume: u8,
    pub active: bool,
    pub effective_volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerView {
    pub master_volume: u8,
    pub channels: Vec<ChannelView>,
}

impl MixerView {
    /// Lay the mixer state out in catalog order
    pub fn new(state: &MixerState, catalog: &[SoundDef]) -> Self {
        let channels = catalog
            .iter()
            .filter_map(|def| {
                let channel = state.channel(&def.id)?;
                Some(ChannelView {
                    id: def.id.clone(),
                    display_name: def.display_name.clone(),
                    volume: channel.volume,
                    active: channel.active,
                    effective_volume: effective_volume(channel.volume, state.master_volume),
                })
            })
            .collect();

        Self {
            master_volume: state.master_volume,
            channels,
        }
    }
}

/// Response for mixer commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Non-fatal problem to show the user, e.g. a sound that failed to load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub mixer: MixerView,
}

impl MixerResponse {
    pub fn new(message: impl Into<String>, mixer: MixerView) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
            warning: None,
            mixer,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Full engine status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub timer: TimerView,
    pub mixer: MixerView,
    pub stats: StatsSnapshot,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModeRequest {
    pub mode: Mode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DurationRequest {
    pub target: DurationTarget,
    pub minutes: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KindRequest {
    pub kind: TimerKind,
}

/// Volume request; any integer is accepted and clamped to 0..=100
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeRequest {
    pub value: i64,
}
