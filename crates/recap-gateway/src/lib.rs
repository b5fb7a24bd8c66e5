//! recap-gateway: HTTP control surface + daemon composition.
//!
//! Provides:
//! - Task bootstrap from config descriptors (name→factory dispatch)
//! - HTTP endpoints for the legacy singular recording task:
//!   `POST /api/start-recording`, `POST /api/stop-recording`,
//!   `POST /api/set-recording-schedule`
//! - HTTP health check endpoint
//! - Graceful SIGINT/SIGTERM shutdown that tears the registry down

pub mod bootstrap;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use recap_config::RecapConfig;
use recap_cron::{TaskRegistry, validate_pattern};
use recap_types::{ApiResponse, RecordingSchedule};

use bootstrap::{RECORDING_TASK_ID, TaskFactoryMap};

/// Shared server state.
pub struct GatewayState {
    pub registry: Arc<TaskRegistry>,
    pub factories: TaskFactoryMap,
    pub config: Mutex<RecapConfig>,
    pub config_path: PathBuf,
}

/// Start the daemon: register configured tasks, serve the HTTP API, and
/// tear the registry down once a shutdown signal arrives.
pub async fn start_server(
    config: RecapConfig,
    config_path: PathBuf,
    registry: Arc<TaskRegistry>,
    factories: TaskFactoryMap,
    port_override: Option<u16>,
) -> anyhow::Result<()> {
    let port = port_override.unwrap_or(config.server.port);
    let host = config.server.host.clone();

    let count = bootstrap::register_tasks(&registry, &factories, &config.tasks).await;
    info!("Registered {count} scheduled tasks");

    if let Some(schedule) = &config.recording {
        let descriptor = bootstrap::recording_descriptor(schedule);
        if let Err(e) = bootstrap::register_descriptor(&registry, &factories, &descriptor).await {
            warn!("Failed to register recording task: {e}");
        }
    }

    let state = Arc::new(GatewayState {
        registry: registry.clone(),
        factories,
        config: Mutex::new(config),
        config_path,
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/start-recording", post(start_recording_handler))
        .route("/api/stop-recording", post(stop_recording_handler))
        .route(
            "/api/set-recording-schedule",
            post(set_recording_schedule_handler),
        )
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.destroy().await;
    Ok(())
}

/// Resolves once SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutting down server");
}

/// GET /health — simple HTTP health check.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/start-recording — start the legacy recording task now.
async fn start_recording_handler(
    State(state): State<Arc<GatewayState>>,
) -> (StatusCode, Json<ApiResponse>) {
    let Some(task) = state.registry.get_by_id(RECORDING_TASK_ID).await else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error("no recording task configured")),
        );
    };
    match task.start().await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::success("start recording"))),
        Err(e) => {
            warn!("Start recording failed: {e}");
            (StatusCode::OK, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// POST /api/stop-recording — stop the legacy recording task now.
async fn stop_recording_handler(
    State(state): State<Arc<GatewayState>>,
) -> (StatusCode, Json<ApiResponse>) {
    let Some(task) = state.registry.get_by_id(RECORDING_TASK_ID).await else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error("no recording task configured")),
        );
    };
    match task.stop().await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::success("stop recording"))),
        Err(e) => {
            warn!("Stop recording failed: {e}");
            (StatusCode::OK, Json(ApiResponse::error(e.to_string())))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SchedulePayload {
    start: Option<String>,
    stop: Option<String>,
}

/// POST /api/set-recording-schedule — persist a new start/stop cron pair
/// and re-register the recording task under it.
async fn set_recording_schedule_handler(
    State(state): State<Arc<GatewayState>>,
    Json(payload): Json<SchedulePayload>,
) -> (StatusCode, Json<ApiResponse>) {
    let (Some(start), Some(stop)) = (payload.start, payload.stop) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(
                "start and stop cron expressions are required",
            )),
        );
    };

    // Reject bad patterns before touching the config or the registry.
    for pattern in [&start, &stop] {
        if let Err(e) = validate_pattern(pattern) {
            return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())));
        }
    }

    let schedule = RecordingSchedule {
        start: start.clone(),
        stop: stop.clone(),
    };
    match apply_recording_schedule(&state, schedule).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(format!(
                "recording schedule updated to start[{start}] stop[{stop}]"
            ))),
        ),
        Err(e) => {
            warn!("Failed to update recording schedule: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}

/// Persist the new pair into the config file, then swap the registered
/// recording task for one wired to the new patterns.
async fn apply_recording_schedule(
    state: &GatewayState,
    schedule: RecordingSchedule,
) -> anyhow::Result<()> {
    {
        let mut config = state.config.lock().await;
        config.recording = Some(schedule.clone());
        recap_config::save_config_to(&config, &state.config_path)?;
    }

    // Absent just means there is nothing to replace yet.
    let _ = state.registry.remove(RECORDING_TASK_ID).await;

    let descriptor = bootstrap::recording_descriptor(&schedule);
    bootstrap::register_descriptor(&state.registry, &state.factories, &descriptor).await
}
