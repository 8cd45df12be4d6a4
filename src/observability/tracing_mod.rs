//! Subscriber setup and the spans used around recognition and extraction.

use anyhow::Result;
use tracing_subscriber::prelude::*;

use crate::observability_config::{LogFormat, ObservabilityConfig};

/// Initialize structured logging with tracing and configuration
pub fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("receipt_ocr={}", config.log_level.to_lowercase()).parse()?);

    // Scheduler chatter can be raised on its own, e.g. OCR_POOL_LOG_LEVEL=debug
    if let Ok(pool_level) = std::env::var("OCR_POOL_LOG_LEVEL") {
        filter = filter.add_directive(format!("receipt_ocr::worker_pool={}", pool_level).parse()?);
    }

    match config.effective_log_format() {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_thread_names(false),
                )
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_thread_names(true),
                )
                .try_init()?;
        }
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Create a span for OCR operations
pub fn ocr_span(operation: &str) -> tracing::Span {
    tracing::info_span!("ocr_operation", operation = operation, component = "ocr")
}

/// Create a span for receipt extraction operations
pub fn extraction_span(operation: &str, line_count: usize) -> tracing::Span {
    tracing::info_span!(
        "extraction_operation",
        operation = operation,
        component = "extraction",
        line_count = line_count
    )
}
