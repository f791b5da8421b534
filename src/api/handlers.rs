//! HTTP endpoint handlers

use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use tracing::{error, info, warn};

use crate::{
    engine::{MixerError, TimerError},
    services::{SoundDef, StatsSnapshot},
    state::{AppState, TimerState},
};
use super::responses::{
    DurationRequest, HealthResponse, KindRequest, MixerResponse, MixerView, ModeRequest,
    StatusResponse, TimerResponse, TimerView, VolumeRequest,
};

fn timer_error(e: TimerError) -> StatusCode {
    match e {
        TimerError::InvalidDuration => {
            warn!("Rejected timer request: {}", e);
            StatusCode::BAD_REQUEST
        }
        TimerError::Lock(_) => {
            error!("Timer failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn mixer_error(e: MixerError) -> StatusCode {
    match e {
        MixerError::UnknownChannel(_) => {
            warn!("Rejected mixer request: {}", e);
            StatusCode::NOT_FOUND
        }
        MixerError::Acquisition { .. } | MixerError::Lock(_) => {
            error!("Mixer failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn timer_snapshot(state: &AppState) -> Result<TimerState, StatusCode> {
    state.timer.snapshot().map_err(timer_error)
}

fn mixer_view(state: &AppState) -> Result<MixerView, StatusCode> {
    let snapshot = state.mixer.snapshot().map_err(mixer_error)?;
    Ok(MixerView::new(&snapshot, state.mixer.catalog()))
}

fn timer_reply(state: &AppState, applied: bool, message: &str) -> Result<Json<TimerResponse>, StatusCode> {
    Ok(Json(TimerResponse::new(applied, message, timer_snapshot(state)?)))
}

/// Handle GET /timer - Current timer snapshot
pub async fn timer_handler(State(state): State<Arc<AppState>>) -> Result<Json<TimerView>, StatusCode> {
    Ok(Json(timer_snapshot(&state)?.into()))
}

/// Handle POST /timer/start - Start the countdown
pub async fn timer_start_handler(State(state): State<Arc<AppState>>) -> Result<Json<TimerResponse>, StatusCode> {
    state.record_action("timer-start");
    let applied = state.timer.start().map_err(timer_error)?;
    info!("Timer start endpoint called (applied={})", applied);
    timer_reply(&state, applied, if applied { "Timer started" } else { "Timer already running" })
}

/// Handle POST /timer/pause - Pause the countdown
pub async fn timer_pause_handler(State(state): State<Arc<AppState>>) -> Result<Json<TimerResponse>, StatusCode> {
    state.record_action("timer-pause");
    let applied = state.timer.pause().map_err(timer_error)?;
    info!("Timer pause endpoint called (applied={})", applied);
    timer_reply(&state, applied, if applied { "Timer paused" } else { "Timer not running" })
}

/// Handle POST /timer/reset - Rewind the current phase
pub async fn timer_reset_handler(State(state): State<Arc<AppState>>) -> Result<Json<TimerResponse>, StatusCode> {
    state.record_action("timer-reset");
    state.timer.reset().map_err(timer_error)?;
    timer_reply(&state, true, "Timer reset")
}

/// Handle POST /timer/complete - Finish the current phase now
pub async fn timer_complete_handler(State(state): State<Arc<AppState>>) -> Result<Json<TimerResponse>, StatusCode> {
    state.record_action("timer-complete");
    state.timer.complete().map_err(timer_error)?;
    timer_reply(&state, true, "Phase completed")
}

/// Handle POST /timer/mode - Force-switch between work and break
pub async fn timer_mode_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<TimerResponse>, StatusCode> {
    state.record_action("timer-mode");
    state.timer.change_mode(request.mode).map_err(timer_error)?;
    timer_reply(&state, true, "Timer mode changed")
}

/// Handle POST /timer/duration - Change a configured phase length
pub async fn timer_duration_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DurationRequest>,
) -> Result<Json<TimerResponse>, StatusCode> {
    state.record_action("timer-duration");
    let applied = state
        .timer
        .set_duration(request.target, request.minutes)
        .map_err(timer_error)?;
    timer_reply(
        &state,
        applied,
        if applied { "Duration updated" } else { "Pause the timer before changing the running phase" },
    )
}

/// Handle POST /timer/kind - Switch between pomodoro and custom cycles
pub async fn timer_kind_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<KindRequest>,
) -> Result<Json<TimerResponse>, StatusCode> {
    state.record_action("timer-kind");
    let applied = state.timer.set_kind(request.kind).map_err(timer_error)?;
    timer_reply(
        &state,
        applied,
        if applied { "Timer kind updated" } else { "Pause the timer before changing its kind" },
    )
}

/// Handle GET /mixer - Current mixer snapshot
pub async fn mixer_handler(State(state): State<Arc<AppState>>) -> Result<Json<MixerView>, StatusCode> {
    Ok(Json(mixer_view(&state)?))
}

/// Handle POST /mixer/channels/:id/toggle - Switch a sound on or off
pub async fn channel_toggle_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MixerResponse>, StatusCode> {
    state.record_action("mixer-toggle");
    match state.mixer.toggle_channel(&id).await {
        Ok(active) => {
            let message = format!("{} {}", id, if active { "on" } else { "off" });
            Ok(Json(MixerResponse::new(message, mixer_view(&state)?)))
        }
        Err(e @ MixerError::Acquisition { .. }) => {
            warn!("Toggle endpoint could not start '{}': {}", id, e);
            Ok(Json(
                MixerResponse::new(format!("{} off", id), mixer_view(&state)?)
                    .with_warning(e.to_string()),
            ))
        }
        Err(e) => Err(mixer_error(e)),
    }
}

/// Handle POST /mixer/channels/:id/volume - Set one sound's volume
pub async fn channel_volume_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<VolumeRequest>,
) -> Result<Json<MixerResponse>, StatusCode> {
    state.record_action("mixer-volume");
    let stored = state
        .mixer
        .set_channel_volume(&id, request.value)
        .map_err(mixer_error)?;
    Ok(Json(MixerResponse::new(
        format!("{} volume {}", id, stored),
        mixer_view(&state)?,
    )))
}

/// Handle POST /mixer/master - Set the master volume
pub async fn master_volume_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VolumeRequest>,
) -> Result<Json<MixerResponse>, StatusCode> {
    state.record_action("mixer-master");
    let stored = state.mixer.set_master_volume(request.value).map_err(mixer_error)?;
    Ok(Json(MixerResponse::new(
        format!("Master volume {}", stored),
        mixer_view(&state)?,
    )))
}

/// Handle GET /catalog - Available sounds
pub async fn catalog_handler(State(state): State<Arc<AppState>>) -> Json<Vec<SoundDef>> {
    Json(state.mixer.catalog().to_vec())
}

/// Handle GET /stats - Focus statistics
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

/// Handle GET /status - Return current engine status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, StatusCode> {
    let timer = timer_snapshot(&state)?;
    let mixer = mixer_view(&state)?;
    let (last_action, last_action_time) = state.get_last_action();

    Ok(Json(StatusResponse {
        timer: timer.into(),
        mixer,
        stats: state.stats.snapshot(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    }))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
