//! # Application Error Types
//!
//! This module defines common error types used throughout the receipt OCR crate.
//! It provides structured error handling for configuration and input validation.

use std::fmt;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Validation errors (engine parameters, inputs, etc.)
    Validation(String),
    /// OCR processing errors
    Ocr(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
            AppError::Ocr(msg) => write!(f, "[OCR] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::ocr_errors::OcrError> for AppError {
    fn from(err: crate::ocr_errors::OcrError) -> Self {
        AppError::Ocr(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the crate
pub mod error_logging {
    use tracing::error;

    /// Log OCR job errors with queue and timing context
    pub fn log_ocr_error(
        error: &crate::ocr_errors::OcrError,
        operation: &str,
        image_path: Option<&str>,
        waited: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            error_kind = error.kind(),
            retryable = error.is_retryable(),
            operation = %operation,
            image_path = ?image_path,
            waited_ms = ?waited.map(|d| d.as_millis()),
            "OCR job failed"
        );
        crate::observability::record_error_metrics(error.kind(), "ocr");
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}
