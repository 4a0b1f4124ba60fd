//! Accelerator worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use accel_media::{Accelerator, FfmpegCodec, SoftwareAccelerator};
use accel_storage::JobStore;
use accel_worker::{metrics, HandlerRegistry, JobExecutor, WorkerConfig};

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("accel=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

/// Accelerator backend named by `ACCELERATOR`.
fn build_accelerator() -> anyhow::Result<Box<dyn Accelerator>> {
    let backend = std::env::var("ACCELERATOR").unwrap_or_else(|_| "software".to_string());
    match backend.as_str() {
        "software" => Ok(Box::new(SoftwareAccelerator::new())),
        other => anyhow::bail!("unknown accelerator backend: {}", other),
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialise logging: {:#}", e);
        std::process::exit(1);
    }

    info!("Starting accel-worker");

    if let Err(e) = run().await {
        error!("Worker error: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match metrics::init_metrics(port) {
            Ok(()) => info!("Serving metrics on port {}", port),
            Err(e) => warn!("{}", e),
        }
    }

    let store = JobStore::from_env();
    let accelerator = build_accelerator()?;
    info!("Using {} accelerator", accelerator.name());

    let codec = Arc::new(FfmpegCodec::new().with_preset(config.video_preset.clone()));
    let handlers = HandlerRegistry::standard(codec);
    let executor = Arc::new(JobExecutor::new(config, store, accelerator, handlers));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    executor.run().await.context("executor stopped with an error")
}
