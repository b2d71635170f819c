//! Layered loading and the shared configuration store

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use config::{Config, Environment, File, FileFormat};
use serde_json::Value;
use tracing::{error, info};

use crate::{ConfigError, StudioConfig};

/// Environment variable prefix, e.g. `STUDIO_MODEL__CONFIDENCE_THRESHOLD=0.3`
pub const ENV_PREFIX: &str = "STUDIO";

/// Load configuration: defaults, then the JSON file if it exists, then the environment
pub fn load(path: &Path) -> Result<StudioConfig, ConfigError> {
    let config = Config::builder()
        .add_source(Config::try_from(&StudioConfig::default())?)
        .add_source(File::from(path).format(FileFormat::Json).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let studio: StudioConfig = config.try_deserialize()?;
    studio.validate()?;
    Ok(studio)
}

fn pointer(key_path: &str) -> String {
    format!("/{}", key_path.replace('.', "/"))
}

/// Thread-safe configuration shared by the controller and the HTTP API
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<StudioConfig>,
}

impl ConfigStore {
    /// Load from `path`, falling back to defaults if loading fails
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match load(&path) {
            Ok(config) => {
                info!("Configuration loaded from {}", path.display());
                config
            }
            Err(e) => {
                error!("Failed to load {}: {}, using defaults", path.display(), e);
                StudioConfig::default()
            }
        };
        Self::with_config(path, config)
    }

    /// Wrap an already built configuration
    pub fn with_config(path: impl Into<PathBuf>, config: StudioConfig) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(config),
        }
    }

    /// File the store persists to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current configuration
    pub fn snapshot(&self) -> StudioConfig {
        self.read_lock().clone()
    }

    /// Run `f` against the current configuration without copying it
    pub fn read<R>(&self, f: impl FnOnce(&StudioConfig) -> R) -> R {
        f(&self.read_lock())
    }

    /// Mutate a copy, validate it, then commit
    ///
    /// The stored configuration is left untouched when validation fails.
    pub fn update(&self, f: impl FnOnce(&mut StudioConfig)) -> Result<(), ConfigError> {
        let mut guard = self.write_lock();
        let mut candidate = guard.clone();
        f(&mut candidate);
        candidate.validate()?;
        *guard = candidate;
        Ok(())
    }

    /// Read a value by dotted path, e.g. `model.confidence_threshold`
    ///
    /// An empty path returns the whole configuration.
    pub fn get(&self, key_path: &str) -> Option<Value> {
        let value = serde_json::to_value(&*self.read_lock()).ok()?;
        if key_path.is_empty() {
            return Some(value);
        }
        value.pointer(&pointer(key_path)).cloned()
    }

    /// Write a value by dotted path
    ///
    /// Unknown paths are rejected with `UnknownKey`. A value of the wrong type
    /// or one that fails validation is rejected with `Invalid`; the previous
    /// value is retained in both cases.
    pub fn set(&self, key_path: &str, value: Value) -> Result<(), ConfigError> {
        if key_path.is_empty() {
            return Err(ConfigError::UnknownKey(key_path.to_string()));
        }

        let mut guard = self.write_lock();
        let mut tree = serde_json::to_value(&*guard)?;
        let slot = tree
            .pointer_mut(&pointer(key_path))
            .ok_or_else(|| ConfigError::UnknownKey(key_path.to_string()))?;
        *slot = value;

        let candidate: StudioConfig = serde_json::from_value(tree)
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", key_path, e)))?;
        candidate.validate()?;
        *guard = candidate;
        Ok(())
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(&*self.read_lock())?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json)?;
        info!("Configuration saved to {}", self.path.display());
        Ok(())
    }

    /// Restore defaults and persist them
    pub fn reset_to_default(&self) -> Result<(), ConfigError> {
        *self.write_lock() = StudioConfig::default();
        self.save()
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, StudioConfig> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, StudioConfig> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}
