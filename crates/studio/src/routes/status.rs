//! Health, status and metrics routes

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::controller::CameraStatus;
use crate::presenter::{FrameStatus, LogEntry, PresentedFrame};
use crate::telemetry;
use crate::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub camera: ComponentHealth,
    pub model: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub detail: Option<String>,
}

/// Query parameters for the status endpoint
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Number of recent messages to include
    #[serde(default = "default_messages")]
    pub messages: usize,
}

fn default_messages() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct DetectionStatus {
    pub running: bool,
    pub model: Option<String>,
}

/// Response for the status endpoint
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub camera: CameraStatus,
    pub detection: DetectionStatus,
    pub last_status: Option<FrameStatus>,
    pub last_frame: Option<PresentedFrame>,
    pub frames_presented: u64,
    pub messages: Vec<LogEntry>,
}

/// Health check handler
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let controller = &state.controller;
    let camera = controller.camera_status();
    let model = controller.model_name();

    let camera_health = ComponentHealth {
        status: if camera.running { "ok" } else { "stopped" }.to_string(),
        detail: camera.info.map(|info| format!("device {} at {}x{}", info.device_id, info.width, info.height)),
    };
    let model_health = ComponentHealth {
        status: if model.is_some() { "ok" } else { "unavailable" }.to_string(),
        detail: model,
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            camera: camera_health,
            model: model_health,
        },
    })
}

/// Current camera, detection and presentation state
pub async fn status(State(state): State<Arc<AppState>>, Query(params): Query<StatusQuery>) -> Json<StatusResponse> {
    let controller = &state.controller;
    let presenter = &state.presenter;

    Json(StatusResponse {
        camera: controller.camera_status(),
        detection: DetectionStatus {
            running: controller.detection_running(),
            model: controller.model_name(),
        },
        last_status: presenter.status(),
        last_frame: presenter.last_frame(),
        frames_presented: presenter.frames_presented(),
        messages: presenter.messages(params.messages.min(200)),
    })
}

/// Prometheus text exposition
pub async fn metrics() -> Response {
    match telemetry::render_metrics() {
        Some(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
