//! Logging and Prometheus setup

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{warn, Level};
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::FmtSubscriber;

/// Set to `json` for structured log output
pub const LOG_FORMAT_ENV: &str = "STUDIO_LOG_FORMAT";

static PROMETHEUS: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global tracing subscriber
pub fn init_logging() -> Result<(), SetGlobalDefaultError> {
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        let subscriber = FmtSubscriber::builder()
            .json()
            .with_max_level(Level::INFO)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Install the Prometheus recorder once and return its handle
///
/// Returns `None` when another recorder is already installed. Only gauges and
/// counters are recorded, so no periodic upkeep runs.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    PROMETHEUS
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                warn!("Metrics recorder not installed: {}", e);
                return None;
            }
            Some(handle)
        })
        .as_ref()
}

/// Prometheus text exposition, if the recorder is installed
pub fn render_metrics() -> Option<String> {
    PROMETHEUS.get().and_then(Option::as_ref).map(PrometheusHandle::render)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::{counter, gauge};

    #[test]
    fn test_recorder_renders_without_upkeep() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            gauge!("studio_fps").set(29.0);
            counter!("studio_frames_presented_total").increment(2);
        });

        let body = handle.render();
        assert!(body.contains("studio_fps 29"));
        assert!(body.contains("studio_frames_presented_total 2"));
    }
}
