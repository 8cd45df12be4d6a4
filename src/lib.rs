//! # Receipt OCR
//!
//! Recognises receipt images through a bounded pool of OCR engine handles and
//! extracts structured facts (merchant, total, date, amount candidates) from
//! the recognised text.

pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod extraction;
pub mod job;
pub mod normalize;
pub mod observability;
pub mod observability_config;
pub mod ocr_config;
pub mod ocr_errors;
pub mod quality;
pub mod worker_pool;

// Re-export types for easier access
pub use context::{ProcessedReceipt, ReceiptContext};
pub use extraction::{ParsedReceipt, ReceiptParser};
pub use ocr_errors::OcrError;
pub use worker_pool::{JobTicket, PoolStats, ShutdownReport, WorkerPool};
