//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Metrics collection and Prometheus export
//! - Structured logging with configurable levels and formats
//! - Environment-specific configuration support

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::observability_config::ObservabilityConfig;

pub mod metrics;
pub mod tracing_mod;

pub use self::metrics::{
    init_metrics_with_config, record_confidence_metrics, record_error_metrics,
    record_extraction_metrics, record_handle_metrics, record_job_metrics, record_queue_metrics,
    record_startup_metrics,
};
pub use self::tracing_mod::{extraction_span, init_tracing_with_config, ocr_span};

/// Initialize logging, then metrics if enabled
///
/// Returns the Prometheus handle so the caller can render the exposition text.
pub fn init_observability_with_config(
    config: &ObservabilityConfig,
) -> Result<Option<PrometheusHandle>> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    init_tracing_with_config(config)?;

    let handle = if config.enable_metrics_export {
        Some(init_metrics_with_config(config)?)
    } else {
        tracing::info!("Metrics export disabled");
        None
    };

    tracing::info!(
        environment = %config.environment,
        metrics_enabled = config.enable_metrics_export,
        "Observability stack initialized"
    );
    Ok(handle)
}
