//! Camera Routes

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use super::{blocking, ControlsResponse};
use crate::controller::CameraStatus;
use crate::{AppState, StudioError};

/// Body for `PUT /api/v1/camera/device`
#[derive(Debug, Deserialize)]
pub struct DeviceRequest {
    pub device_id: u32,
}

/// Body for `PUT /api/v1/camera/resolution`
#[derive(Debug, Deserialize)]
pub struct ResolutionRequest {
    pub width: u32,
    pub height: u32,
}

/// Start or stop the camera
pub async fn toggle(State(state): State<Arc<AppState>>) -> Result<Json<ControlsResponse>, StudioError> {
    let controller = state.controller.clone();
    blocking(move || {
        controller.toggle_camera()?;
        Ok(Json(ControlsResponse {
            camera_running: controller.camera_running(),
            detection_running: controller.detection_running(),
        }))
    })
    .await
}

/// Switch to another camera device
pub async fn change_device(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeviceRequest>,
) -> Result<Json<CameraStatus>, StudioError> {
    let controller = state.controller.clone();
    blocking(move || {
        controller.change_device(request.device_id)?;
        Ok(Json(controller.camera_status()))
    })
    .await
}

/// Change the capture resolution
pub async fn change_resolution(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResolutionRequest>,
) -> Result<Json<CameraStatus>, StudioError> {
    let controller = state.controller.clone();
    blocking(move || {
        controller.change_resolution(request.width, request.height)?;
        Ok(Json(controller.camera_status()))
    })
    .await
}
