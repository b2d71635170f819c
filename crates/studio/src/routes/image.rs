//! Image adjustment routes

use axum::{extract::State, Json};
use camera_capture::ImageAdjustment;
use serde::Deserialize;
use std::sync::Arc;

use crate::{AppState, StudioError};

/// Body for `PUT /api/v1/image`; absent fields are left alone
#[derive(Debug, Default, Deserialize)]
pub struct AdjustmentRequest {
    pub brightness: Option<f32>,
    pub contrast: Option<f32>,
    pub sharpness: Option<f32>,
}

/// Update brightness, contrast and/or sharpness; returns the clamped values in effect
pub async fn update(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AdjustmentRequest>,
) -> Result<Json<ImageAdjustment>, StudioError> {
    let controller = &state.controller;
    if let Some(value) = request.brightness {
        controller.update_brightness(value)?;
    }
    if let Some(value) = request.contrast {
        controller.update_contrast(value)?;
    }
    if let Some(value) = request.sharpness {
        controller.update_sharpness(value)?;
    }
    Ok(Json(controller.capture().adjustment()))
}

/// Restore neutral adjustment
pub async fn reset(State(state): State<Arc<AppState>>) -> Result<Json<ImageAdjustment>, StudioError> {
    Ok(Json(state.controller.reset_image_settings()?))
}
