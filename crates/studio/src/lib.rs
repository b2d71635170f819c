//! Inspection Studio
//!
//! Wires the capture service, detection pipeline and configuration store
//! together: a fixed-period orchestrator pushes annotated frames to a
//! headless presenter, and an HTTP control API accepts user commands.

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use camera_capture::{CameraBackend, FfmpegBackend, SyntheticBackend};
use inference_engine::OnnxLoader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use studio_config::ConfigStore;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub mod controller;
mod error;
pub mod orchestrator;
pub mod presenter;
mod routes;
pub mod telemetry;

pub use controller::{Controller, DisplayOptions};
pub use error::StudioError;
pub use orchestrator::Orchestrator;
pub use presenter::{FrameStatus, HeadlessPresenter, Presenter};

/// Application state shared across handlers
pub struct AppState {
    pub controller: Arc<Controller>,
    pub presenter: Arc<HeadlessPresenter>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(controller: Arc<Controller>, presenter: Arc<HeadlessPresenter>) -> Self {
        Self {
            controller,
            presenter,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::status::health))
        .route("/api/v1/status", get(routes::status::status))
        .route("/metrics", get(routes::status::metrics))
        .route("/api/v1/camera/toggle", post(routes::camera::toggle))
        .route("/api/v1/camera/device", put(routes::camera::change_device))
        .route("/api/v1/camera/resolution", put(routes::camera::change_resolution))
        .route("/api/v1/detection/toggle", post(routes::detection::toggle))
        .route("/api/v1/image", put(routes::image::update))
        .route("/api/v1/image/reset", post(routes::image::reset))
        .route("/api/v1/thresholds", put(routes::detection::update_thresholds))
        .route("/api/v1/display", put(routes::detection::update_display))
        .route("/api/v1/model/reload", post(routes::detection::reload_model))
        .route("/api/v1/config", get(routes::config::get_all))
        .route("/api/v1/config/save", post(routes::config::save))
        .route("/api/v1/config/reset", post(routes::config::reset))
        .route(
            "/api/v1/config/:key_path",
            get(routes::config::get_key).put(routes::config::set_key),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Which camera backend devices are opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// V4L2 devices through an ffmpeg subprocess
    Ffmpeg,
    /// Generated test pattern
    Synthetic,
}

impl BackendKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ffmpeg" | "v4l2" => Some(Self::Ffmpeg),
            "synthetic" | "test" => Some(Self::Synthetic),
            _ => None,
        }
    }

    fn build(self) -> Arc<dyn CameraBackend> {
        match self {
            Self::Ffmpeg => Arc::new(FfmpegBackend::new()),
            Self::Synthetic => Arc::new(SyntheticBackend::new()),
        }
    }
}

/// Process-level options, read from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// `STUDIO_CONFIG`, default `config.json`
    pub config_path: PathBuf,
    /// `STUDIO_BIND`, default `127.0.0.1:8080`
    pub bind: String,
    /// `STUDIO_CAMERA_BACKEND`, `ffmpeg` (default) or `synthetic`
    pub backend: BackendKind,
    /// `STUDIO_AUTOSTART`: start the camera and detection on launch
    pub autostart: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.json"),
            bind: "127.0.0.1:8080".to_string(),
            backend: BackendKind::Ffmpeg,
            autostart: false,
        }
    }
}

impl RunOptions {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let backend = match lookup("STUDIO_CAMERA_BACKEND") {
            Some(name) => BackendKind::parse(&name).unwrap_or_else(|| {
                warn!("Unknown camera backend {:?}, using ffmpeg", name);
                BackendKind::Ffmpeg
            }),
            None => defaults.backend,
        };

        Self {
            config_path: lookup("STUDIO_CONFIG").map(PathBuf::from).unwrap_or(defaults.config_path),
            bind: lookup("STUDIO_BIND").unwrap_or(defaults.bind),
            backend,
            autostart: lookup("STUDIO_AUTOSTART")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.autostart),
        }
    }
}

/// Run the studio until Ctrl-C
pub async fn run(options: RunOptions) -> anyhow::Result<()> {
    telemetry::init_metrics();

    let config = Arc::new(ConfigStore::open(&options.config_path));
    let presenter = Arc::new(HeadlessPresenter::new());
    let backend = options.backend.build();
    let controller = {
        let presenter: Arc<dyn Presenter> = presenter.clone();
        tokio::task::spawn_blocking(move || Controller::from_config(backend, Arc::new(OnnxLoader), config, presenter))
            .await
            .context("controller initialization panicked")?
    };
    let controller = Arc::new(controller);

    if options.autostart {
        let starter = controller.clone();
        let started = tokio::task::spawn_blocking(move || {
            starter.toggle_camera()?;
            starter.toggle_detection()
        })
        .await
        .context("autostart panicked")?;
        if let Err(e) = started {
            error!("Autostart failed: {}", e);
        }
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let orchestrator = tokio::spawn(Orchestrator::new(controller.clone()).run(stop_rx.clone()));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => error!("Cannot listen for Ctrl-C: {}", e),
        }
        let _ = stop_tx.send(true);
    });

    let app = create_router(Arc::new(AppState::new(controller, presenter)));
    let listener = tokio::net::TcpListener::bind(&options.bind)
        .await
        .with_context(|| format!("failed to bind {}", options.bind))?;
    info!("Control API listening on {}", options.bind);

    let mut server_stop = stop_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_stop.wait_for(|stop| *stop).await;
        })
        .await?;

    orchestrator.await.context("orchestrator task panicked")?;
    info!("Inspection studio stopped");
    Ok(())
}
