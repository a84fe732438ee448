//! WebAPI - HTTP & WebSocket Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes (camera, media, system)
//! - MJPEG and media-file streaming
//! - WebSocket push channel

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        camera_enabled: state.cameras.is_some(),
        media_enabled: state.media.is_some(),
        system_enabled: state.system.is_some(),
    };

    Json(response)
}

/// Status endpoint
pub async fn device_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "device_type": "pi-dashboard",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "connections": state.realtime.connection_count(),
    }))
}
