//! Focus Engine - A pomodoro timer and ambience mixer for focus sessions
//! 
//! This is the main entry point for the focus-engine application.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use focus_engine::{
    config::Config,
    state::AppState,
    api::create_router,
    services::{default_catalog, select_backend, JsonFileStore},
    tasks::notice_log_task,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("focus_engine={},tower_http=info", config.log_level()))
        .init();

    info!("Starting focus-engine v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: host={}, port={}, data={}, work={}min, breaks={}/{}min",
          config.host, config.port, config.data_dir.display(),
          config.work, config.short_break, config.long_break);

    let store = Arc::new(JsonFileStore::open(&config.data_dir).await?);
    let backend = select_backend(config.audio_assets());
    info!("Audio backend: {}", backend.name());

    // Create application state
    let state = Arc::new(
        AppState::load(
            config.port,
            config.host.clone(),
            config.timer_defaults(),
            store.clone(),
            backend,
            default_catalog(),
        )
        .await,
    );

    // Log notices in the background
    tokio::spawn(notice_log_task(state.subscribe_notices()));

    // Create HTTP router with all endpoints
    let app = create_router(Arc::clone(&state));

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /timer                       - Timer snapshot");
    info!("  POST /timer/start|pause|reset     - Timer controls");
    info!("  POST /timer/complete              - Finish the current phase");
    info!("  POST /timer/mode|duration|kind    - Timer configuration");
    info!("  GET  /mixer                       - Mixer snapshot");
    info!("  POST /mixer/channels/:id/toggle   - Switch a sound on/off");
    info!("  POST /mixer/channels/:id/volume   - Set a sound's volume");
    info!("  POST /mixer/master                - Set the master volume");
    info!("  GET  /catalog | /stats | /status | /health");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    state.shutdown();
    store.flush().await;
    info!("Server shutdown complete");
    Ok(())
}
