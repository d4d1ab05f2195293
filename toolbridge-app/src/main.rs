use anyhow::Result;
use std::path::PathBuf;
use tokio::io::{stdin, stdout, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use toolbridge_app::{bootstrap, config::AppConfig, transport};

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TOOLBRIDGE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries responses; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load(std::env::args_os().nth(1).map(PathBuf::from))?;
    let engine = bootstrap::build_engine(&config)?;
    let metrics = engine.metrics();

    info!("Serving tool calls on stdin/stdout");
    transport::serve(engine, BufReader::new(stdin()), stdout()).await?;

    let snapshot = metrics.snapshot();
    info!(
        calls = snapshot.calls,
        successes = snapshot.successes,
        failures = snapshot.failures(),
        "Input closed, shutting down"
    );
    Ok(())
}
