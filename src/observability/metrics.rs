//! Metrics collection and Prometheus export module.
//!
//! Recording functions are thin wrappers over the `metrics` macros; without an
//! installed recorder they are no-ops, which is what the test suites rely on.

use std::time::Duration;

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::observability_config::ObservabilityConfig;

/// Install the Prometheus recorder and return its render handle
pub fn init_metrics_with_config(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();

    tracing::info!(
        environment = %config.environment,
        "Metrics collection initialized"
    );
    Ok(handle)
}

/// Register help text for every metric this crate emits
pub fn describe_metrics() {
    metrics::describe_counter!("ocr_jobs_total", "OCR jobs by terminal outcome");
    metrics::describe_histogram!(
        "ocr_job_wait_seconds",
        "Time a job spent queued before dispatch or expiry"
    );
    metrics::describe_histogram!("ocr_job_run_seconds", "Time spent in recognition");

    metrics::describe_gauge!("queue_depth", "Jobs currently waiting");
    metrics::describe_gauge!("queue_capacity", "Engine handles serving the queue");
    metrics::describe_gauge!("ocr_handles_free", "Engine handles idle and ready for a job");
    metrics::describe_gauge!("ocr_handles_total", "Engine handles owned by the pool");

    metrics::describe_counter!("errors_total", "Errors by type and component");

    metrics::describe_counter!(
        "receipt_total_extractions_total",
        "Receipt total extractions by how the total was chosen"
    );
    metrics::describe_counter!(
        "receipt_date_extractions_total",
        "Receipt date extractions by how the date was chosen"
    );
    metrics::describe_histogram!(
        "receipt_amount_candidates",
        "Amount candidates produced per receipt"
    );
    metrics::describe_histogram!(
        "receipt_extraction_duration_seconds",
        "Time spent extracting fields from OCR text"
    );

    metrics::describe_histogram!("ocr_confidence", "Mean recognition confidence per image");
    metrics::describe_counter!("ocr_quality_total", "Recognitions by confidence label");

    metrics::describe_histogram!(
        "application_startup_duration_seconds",
        "Time from process start to ready"
    );
    metrics::describe_counter!("application_starts_total", "Application starts");
}

/// Record a job reaching a terminal state
pub fn record_job_metrics(outcome: &str, waited: Duration, run_time: Option<Duration>) {
    let outcome = outcome.to_string();
    metrics::counter!("ocr_jobs_total", "outcome" => outcome).increment(1);
    metrics::histogram!("ocr_job_wait_seconds").record(waited.as_secs_f64());
    if let Some(run_time) = run_time {
        metrics::histogram!("ocr_job_run_seconds").record(run_time.as_secs_f64());
    }
}

/// Record queue metrics
pub fn record_queue_metrics(queue_name: &str, depth: usize, capacity: usize) {
    let queue_name = queue_name.to_string();
    metrics::gauge!("queue_depth", "queue" => queue_name.clone()).set(depth as f64);
    metrics::gauge!("queue_capacity", "queue" => queue_name).set(capacity as f64);
}

/// Record engine handle availability
pub fn record_handle_metrics(free: usize, total: usize) {
    metrics::gauge!("ocr_handles_free").set(free as f64);
    metrics::gauge!("ocr_handles_total").set(total as f64);
}

/// Record error metrics
pub fn record_error_metrics(error_type: &str, component: &str) {
    let error_type = error_type.to_string();
    let component = component.to_string();
    metrics::counter!("errors_total", "type" => error_type, "component" => component).increment(1);
}

/// Record the outcome of one receipt extraction
pub fn record_extraction_metrics(
    total_reason: Option<&str>,
    date_reason: &str,
    candidate_count: usize,
    duration: Duration,
) {
    let total_reason = total_reason.unwrap_or("none").to_string();
    let date_reason = date_reason.to_string();
    metrics::counter!("receipt_total_extractions_total", "reason" => total_reason).increment(1);
    metrics::counter!("receipt_date_extractions_total", "reason" => date_reason).increment(1);
    metrics::histogram!("receipt_amount_candidates").record(candidate_count as f64);
    metrics::histogram!("receipt_extraction_duration_seconds").record(duration.as_secs_f64());
}

/// Record one recognition confidence sample and its quality label
pub fn record_confidence_metrics(confidence: f32, label: &str) {
    let label = label.to_string();
    metrics::histogram!("ocr_confidence").record(confidence as f64);
    metrics::counter!("ocr_quality_total", "label" => label).increment(1);
}

/// Record startup metrics
pub fn record_startup_metrics(duration: Duration) {
    metrics::histogram!("application_startup_duration_seconds").record(duration.as_secs_f64());
    metrics::counter!("application_starts_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_job_metrics("completed", Duration::from_millis(5), Some(Duration::from_millis(20)));
        record_queue_metrics("ocr_jobs", 3, 2);
        record_handle_metrics(1, 2);
        record_error_metrics("queue_full", "ocr");
        record_extraction_metrics(None, "fallback", 0, Duration::from_micros(40));
        record_confidence_metrics(88.0, "excellent");
    }

    #[test]
    fn test_every_emitted_metric_is_described() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            record_job_metrics("completed", Duration::from_millis(5), Some(Duration::from_millis(20)));
            record_queue_metrics("ocr_jobs", 3, 2);
            record_handle_metrics(1, 2);
            record_error_metrics("queue_full", "ocr");
            record_extraction_metrics(Some("label_priority_last"), "label", 1, Duration::from_micros(40));
            record_confidence_metrics(88.0, "excellent");
            record_startup_metrics(Duration::from_millis(120));
        });

        let rendered = handle.render();
        for name in [
            "ocr_jobs_total",
            "ocr_job_wait_seconds",
            "ocr_job_run_seconds",
            "queue_depth",
            "queue_capacity",
            "ocr_handles_free",
            "ocr_handles_total",
            "errors_total",
            "receipt_total_extractions_total",
            "receipt_date_extractions_total",
            "receipt_amount_candidates",
            "receipt_extraction_duration_seconds",
            "ocr_confidence",
            "ocr_quality_total",
            "application_startup_duration_seconds",
            "application_starts_total",
        ] {
            assert!(
                rendered.contains(&format!("# HELP {name} ")),
                "missing description for {name}"
            );
        }
    }
}
