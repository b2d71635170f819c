//! Studio Configuration
//!
//! Typed configuration for the inspection studio. Values are layered with the
//! `config` crate (built-in defaults, then an optional JSON file, then
//! `STUDIO_<SECTION>__<KEY>` environment variables), validated, and exposed
//! through a [`ConfigStore`] that supports dotted-path reads and writes such as
//! `model.confidence_threshold`.

pub mod schema;
pub mod store;

pub use schema::{
    CameraConfig, ColorConfig, DisplayConfig, ModelConfig, PrecisionConfig, StudioConfig,
    TrackingConfig,
};
pub use store::{load, ConfigStore, ENV_PREFIX};

use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration serialization error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
