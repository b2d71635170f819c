//! Detection Routes

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studio_config::DisplayConfig;

use super::{blocking, ControlsResponse};
use crate::controller::DisplayOptions;
use crate::{AppState, StudioError};

/// Body for `PUT /api/v1/thresholds`
#[derive(Debug, Default, Deserialize)]
pub struct ThresholdRequest {
    pub confidence: Option<f32>,
    pub iou: Option<f32>,
}

/// Thresholds in effect
#[derive(Debug, Serialize)]
pub struct ThresholdResponse {
    pub confidence: f32,
    pub iou: f32,
}

/// Result of a model reload
#[derive(Debug, Serialize)]
pub struct ModelResponse {
    pub model: String,
}

/// Enable or disable detection (requires a running camera)
pub async fn toggle(State(state): State<Arc<AppState>>) -> Result<Json<ControlsResponse>, StudioError> {
    let controller = &state.controller;
    controller.toggle_detection()?;
    Ok(Json(ControlsResponse {
        camera_running: controller.camera_running(),
        detection_running: controller.detection_running(),
    }))
}

/// Update the confidence and/or IoU threshold
pub async fn update_thresholds(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ThresholdRequest>,
) -> Result<Json<ThresholdResponse>, StudioError> {
    let controller = &state.controller;
    if let Some(value) = request.confidence {
        controller.update_confidence(value)?;
    }
    if let Some(value) = request.iou {
        controller.update_iou(value)?;
    }
    let settings = controller.detection_settings();
    Ok(Json(ThresholdResponse {
        confidence: settings.confidence_threshold,
        iou: settings.iou_threshold,
    }))
}

/// Patch the display flags
pub async fn update_display(
    State(state): State<Arc<AppState>>,
    Json(options): Json<DisplayOptions>,
) -> Result<Json<DisplayConfig>, StudioError> {
    Ok(Json(state.controller.update_display_options(&options)?))
}

/// Reload the model from the configured paths
pub async fn reload_model(State(state): State<Arc<AppState>>) -> Result<Json<ModelResponse>, StudioError> {
    let controller = state.controller.clone();
    blocking(move || {
        let model = controller.reload_model()?;
        Ok(Json(ModelResponse { model }))
    })
    .await
}
