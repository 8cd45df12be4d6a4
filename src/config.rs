//! # Application Configuration
//!
//! Aggregates pool, extraction and observability settings and loads them
//! from environment variables.

use std::env;
use std::time::Duration;

use crate::errors::{AppError, AppResult};
use crate::extraction::ExtractionConfig;
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::{ModelType, PageSegMode, PoolConfig};

/// Main application configuration structure
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// OCR worker pool configuration
    pub ocr: PoolConfig,
    /// Receipt extraction heuristics
    pub extraction: ExtractionConfig,
    /// Logging and metrics configuration
    pub observability: ObservabilityConfig,
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> AppResult<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a valid number, got '{}'", key, raw))),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut config = Self::default();

        // OCR pool
        config.ocr.pool_size = parse_var(&lookup, "OCR_POOL_SIZE", config.ocr.pool_size)?;
        if let Some(languages) = lookup("OCR_LANGUAGES") {
            config.ocr.languages = languages;
        }
        if let Some(model) = lookup("OCR_MODEL_TYPE") {
            config.ocr.model_type = ModelType::parse(&model)?;
        }
        config.ocr.tessdata_path = lookup("OCR_TESSDATA_PATH").or(config.ocr.tessdata_path);
        if let Some(psm) = lookup("OCR_PAGE_SEG_MODE") {
            config.ocr.default_page_seg_mode = PageSegMode::parse(&psm)?;
        }
        config.ocr.queue.max_queue_depth = parse_var(
            &lookup,
            "OCR_MAX_QUEUE_DEPTH",
            config.ocr.queue.max_queue_depth,
        )?;
        let max_wait_ms = parse_var(
            &lookup,
            "OCR_MAX_WAIT_MS",
            config.ocr.queue.max_wait.as_millis() as u64,
        )?;
        config.ocr.queue.max_wait = Duration::from_millis(max_wait_ms);

        config.observability = ObservabilityConfig::from_lookup(&lookup).map_err(AppError::Config)?;

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.ocr.validate()?;
        self.extraction.validate()?;
        self.observability.validate().map_err(AppError::Config)?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: pool_size={}, languages={}, model={:?}, max_queue_depth={}, max_wait_ms={}, environment={}",
            self.ocr.pool_size,
            self.ocr.languages,
            self.ocr.model_type,
            self.ocr.queue.max_queue_depth,
            self.ocr.queue.max_wait.as_millis(),
            self.observability.environment
        )
    }
}
