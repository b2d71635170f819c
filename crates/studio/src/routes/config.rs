//! Configuration Routes

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use studio_config::ConfigError;

use crate::{AppState, StudioError};

/// Whole configuration
pub async fn get_all(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StudioError> {
    get_value(&state, "")
}

/// One value by dotted path, e.g. `/api/v1/config/model.confidence_threshold`
pub async fn get_key(
    State(state): State<Arc<AppState>>,
    Path(key_path): Path<String>,
) -> Result<Json<Value>, StudioError> {
    get_value(&state, &key_path)
}

fn get_value(state: &AppState, key_path: &str) -> Result<Json<Value>, StudioError> {
    state
        .controller
        .config()
        .get(key_path)
        .map(Json)
        .ok_or_else(|| ConfigError::UnknownKey(key_path.to_string()).into())
}

/// Replace one value by dotted path; the body is the new JSON value
pub async fn set_key(
    State(state): State<Arc<AppState>>,
    Path(key_path): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, StudioError> {
    let controller = state.controller.clone();
    let key = key_path.clone();
    let value = super::blocking(move || controller.set_config_value(&key, value)).await?;
    Ok(Json(json!({ "key": key_path, "value": value })))
}

/// Persist the configuration
pub async fn save(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StudioError> {
    let controller = state.controller.clone();
    super::blocking(move || controller.save_config()).await?;
    Ok(Json(json!({ "saved": state.controller.config().path().display().to_string() })))
}

/// Restore and persist defaults
pub async fn reset(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StudioError> {
    let controller = state.controller.clone();
    super::blocking(move || controller.reset_config()).await?;
    get_value(&state, "")
}
