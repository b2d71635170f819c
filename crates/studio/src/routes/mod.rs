//! HTTP handlers for the control API

pub mod camera;
pub mod config;
pub mod detection;
pub mod image;
pub mod status;

use serde::Serialize;

use crate::StudioError;

/// Camera and detection state after a toggle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlsResponse {
    pub camera_running: bool,
    pub detection_running: bool,
}

/// Run a control action that may block (camera start/stop, model load) off the async workers
pub(crate) async fn blocking<T, F>(action: F) -> Result<T, StudioError>
where
    F: FnOnce() -> Result<T, StudioError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(action)
        .await
        .map_err(|e| StudioError::Task(e.to_string()))?
}
