//! Control-surface errors and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use camera_capture::CaptureError;
use inference_engine::InferenceError;
use serde_json::json;
use studio_config::ConfigError;
use thiserror::Error;

/// Failure of a control action
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("Camera error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Model error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The action is not allowed in the current state
    #[error("{0}")]
    Rejected(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl StudioError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StudioError::Capture(CaptureError::DeviceUnavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            StudioError::Capture(CaptureError::InvalidValue { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            StudioError::Config(ConfigError::UnknownKey(_)) => StatusCode::NOT_FOUND,
            StudioError::Config(ConfigError::Invalid(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            StudioError::Inference(InferenceError::ModelLoad(_)) => StatusCode::SERVICE_UNAVAILABLE,
            StudioError::Rejected(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StudioError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let unavailable = StudioError::from(CaptureError::DeviceUnavailable {
            device_id: 3,
            reason: "busy".to_string(),
        });
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            StudioError::from(ConfigError::UnknownKey("x.y".to_string())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(StudioError::Rejected("no".to_string()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            StudioError::Task("join".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
