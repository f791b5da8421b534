//! HTTP API module
//!
//! This module contains all HTTP endpoint handlers and response structures.

pub mod handlers;
pub mod responses;

use std::sync::Arc;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::*;

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/timer", get(timer_handler))
        .route("/timer/start", post(timer_start_handler))
        .route("/timer/pause", post(timer_pause_handler))
        .route("/timer/reset", post(timer_reset_handler))
        .route("/timer/complete", post(timer_complete_handler))
        .route("/timer/mode", post(timer_mode_handler))
        .route("/timer/duration", post(timer_duration_handler))
        .route("/timer/kind", post(timer_kind_handler))
        .route("/mixer", get(mixer_handler))
        .route("/mixer/channels/:id/toggle", post(channel_toggle_handler))
        .route("/mixer/channels/:id/volume", post(channel_volume_handler))
        .route("/mixer/master", post(master_volume_handler))
        .route("/catalog", get(catalog_handler))
        .route("/stats", get(stats_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
