use std::env;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use receipt_ocr::config::AppConfig;
use receipt_ocr::engine::TesseractFactory;
use receipt_ocr::errors::error_logging;
use receipt_ocr::observability;
use receipt_ocr::ocr_config::EngineParams;
use receipt_ocr::ReceiptContext;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let started = Instant::now();

    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        error_logging::log_config_error(&e, "environment", "load_config");
        anyhow::anyhow!("Configuration loading failed: {}", e)
    })?;

    // Initialize logging and metrics before anything else logs
    let metrics_handle = observability::init_observability_with_config(&config.observability)?;

    let image_paths: Vec<String> = env::args().skip(1).collect();
    if image_paths.is_empty() {
        return Err(anyhow::anyhow!(
            "Usage: receipt-ocr <image> [<image> ...]"
        ));
    }

    let factory = Arc::new(TesseractFactory::new(config.ocr.clone()));
    let context = Arc::new(
        ReceiptContext::init(&config, factory)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize OCR pool: {}", e))?,
    );
    observability::record_startup_metrics(started.elapsed());
    info!(images = image_paths.len(), "Processing receipt images");

    // Submit everything up front so the pool works in parallel
    let tickets: Vec<_> = image_paths
        .iter()
        .map(|path| {
            (
                path.clone(),
                tokio::spawn({
                    let path = path.clone();
                    let context = Arc::clone(&context);
                    async move { context.process_image(&path, EngineParams::default()).await }
                }),
            )
        })
        .collect();

    let mut failures = 0usize;
    for (path, ticket) in tickets {
        match ticket.await {
            Ok(Ok(processed)) => println!("{}", serde_json::to_string_pretty(&processed)?),
            Ok(Err(e)) => {
                failures += 1;
                error!(image_path = %path, error = %e, retryable = e.is_retryable(), "Receipt processing failed");
            }
            Err(e) => {
                failures += 1;
                error!(image_path = %path, error = %e, "Receipt processing task panicked");
            }
        }
    }

    let report = context.shutdown().await;
    info!(
        failures,
        terminated_handles = report.terminated_handles,
        "Receipt processing finished"
    );

    if let Some(handle) = metrics_handle {
        tracing::debug!(metrics = %handle.render(), "Final metrics snapshot");
    }

    if failures > 0 {
        return Err(anyhow::anyhow!("{} of {} images failed", failures, image_paths.len()));
    }
    Ok(())
}
