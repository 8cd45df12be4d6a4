//! # OCR Error Types Module
//!
//! This module defines the error taxonomy surfaced by the OCR worker pool.
//! Capacity problems (`QueueFull`, `TimedOut`) are retryable by the caller,
//! engine failures are surfaced verbatim, and `Cancelled` means the pool is shutting down.

use std::time::Duration;

/// Custom error types for OCR operations
#[derive(Debug, Clone, PartialEq)]
pub enum OcrError {
    /// The pending queue is at capacity; the caller should back off and retry later
    QueueFull {
        /// Jobs waiting when the submission was rejected
        depth: usize,
        /// Configured maximum queue depth
        capacity: usize,
    },
    /// The job waited longer than its `max_wait` for a free engine handle
    TimedOut {
        /// How long the job sat in the queue
        waited: Duration,
    },
    /// The underlying recognition failed
    EngineFailure(String),
    /// The pool is shutting down
    Cancelled,
    /// OCR engine initialization errors
    Initialization(String),
    /// The submission's queue options were rejected before queueing
    InvalidOptions(String),
}

impl OcrError {
    /// Whether the caller may retry the same submission later
    pub fn is_retryable(&self) -> bool {
        matches!(self, OcrError::QueueFull { .. } | OcrError::TimedOut { .. })
    }

    /// Stable short name, used as a metric label
    pub fn kind(&self) -> &'static str {
        match self {
            OcrError::QueueFull { .. } => "queue_full",
            OcrError::TimedOut { .. } => "timed_out",
            OcrError::EngineFailure(_) => "engine_failure",
            OcrError::Cancelled => "cancelled",
            OcrError::Initialization(_) => "initialization",
            OcrError::InvalidOptions(_) => "invalid_options",
        }
    }
}

impl std::fmt::Display for OcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrError::QueueFull { depth, capacity } => write!(
                f,
                "[QUEUE_FULL] OCR queue is full ({} of {} slots used), retry later",
                depth, capacity
            ),
            OcrError::TimedOut { waited } => write!(
                f,
                "[OCR_TIMEOUT] No OCR worker became available within {}ms",
                waited.as_millis()
            ),
            OcrError::EngineFailure(msg) => write!(f, "[OCR_ENGINE] Recognition failed: {}", msg),
            OcrError::Cancelled => write!(f, "[CANCELLED] OCR pool is shutting down"),
            OcrError::Initialization(msg) => {
                write!(f, "[OCR_INIT] OCR engine initialization failed: {}", msg)
            }
            OcrError::InvalidOptions(msg) => write!(f, "[OCR_OPTIONS] Invalid queue options: {}", msg),
        }
    }
}

impl std::error::Error for OcrError {}

impl From<anyhow::Error> for OcrError {
    fn from(err: anyhow::Error) -> Self {
        OcrError::EngineFailure(err.to_string())
    }
}
