//! Inspection Studio - Main Entry Point

use studio::{run, telemetry::init_logging, RunOptions};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    info!("=== Inspection Studio v{} ===", env!("CARGO_PKG_VERSION"));
    let options = RunOptions::from_env();
    info!(
        "Config {}, {:?} camera backend, control API on {}",
        options.config_path.display(),
        options.backend,
        options.bind
    );

    run(options).await
}
