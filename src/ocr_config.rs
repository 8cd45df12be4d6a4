//! # OCR Configuration Module
//!
//! This module defines configuration structures for the OCR worker pool,
//! including queue limits, engine parameters, and Tesseract model selection.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::errors::{AppError, AppResult};

// Constants for OCR configuration
pub const DEFAULT_LANGUAGES: &str = "eng";
pub const DEFAULT_POOL_SIZE: usize = 2;
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 32;
pub const DEFAULT_MAX_WAIT_MS: u64 = 30_000;
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB limit for image files

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSegMode {
    /// Orientation and script detection (OSD) only
    OsdOnly = 0,
    /// Automatic page segmentation with OSD
    AutoOsd = 1,
    /// Automatic page segmentation, no OSD
    AutoNoOsd = 2,
    /// Fully automatic page segmentation
    #[default]
    Auto = 3,
    /// Assume a single column of text
    SingleColumn = 4,
    /// Assume a single uniform block of vertically aligned text
    SingleBlockVert = 5,
    /// Assume a single uniform block of text
    SingleBlock = 6,
    /// Treat the image as a single text line
    SingleLine = 7,
    /// Treat the image as a single word
    SingleWord = 8,
    /// Treat the image as a single word in a circle
    WordInCircle = 9,
    /// Treat the image as a single character
    SingleChar = 10,
    /// Find as much text as possible in no particular order
    SparseText = 11,
    /// Sparse text with OSD
    SparseTextOsd = 12,
    /// Treat the image as a single text line, bypassing hacks that are Tesseract-specific
    RawLine = 13,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::OsdOnly => "0",
            PageSegMode::AutoOsd => "1",
            PageSegMode::AutoNoOsd => "2",
            PageSegMode::Auto => "3",
            PageSegMode::SingleColumn => "4",
            PageSegMode::SingleBlockVert => "5",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SingleLine => "7",
            PageSegMode::SingleWord => "8",
            PageSegMode::WordInCircle => "9",
            PageSegMode::SingleChar => "10",
            PageSegMode::SparseText => "11",
            PageSegMode::SparseTextOsd => "12",
            PageSegMode::RawLine => "13",
        }
    }

    /// Parse the numeric Tesseract value ("0".."13")
    pub fn parse(value: &str) -> AppResult<Self> {
        let mode = match value.trim() {
            "0" => PageSegMode::OsdOnly,
            "1" => PageSegMode::AutoOsd,
            "2" => PageSegMode::AutoNoOsd,
            "3" => PageSegMode::Auto,
            "4" => PageSegMode::SingleColumn,
            "5" => PageSegMode::SingleBlockVert,
            "6" => PageSegMode::SingleBlock,
            "7" => PageSegMode::SingleLine,
            "8" => PageSegMode::SingleWord,
            "9" => PageSegMode::WordInCircle,
            "10" => PageSegMode::SingleChar,
            "11" => PageSegMode::SparseText,
            "12" => PageSegMode::SparseTextOsd,
            "13" => PageSegMode::RawLine,
            other => {
                return Err(AppError::Validation(format!(
                    "page segmentation mode must be 0-13, got '{}'",
                    other
                )))
            }
        };
        Ok(mode)
    }
}

/// Tesseract model type for different accuracy/speed trade-offs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelType {
    /// Fast model (tessdata_fast) - faster processing, lower accuracy
    #[default]
    Fast,
    /// Best model (tessdata_best) - slower processing, higher accuracy
    Best,
}

impl ModelType {
    /// Get the tessdata directory name for this model type
    pub fn tessdata_dir(&self) -> &'static str {
        match self {
            ModelType::Fast => "tessdata_fast",
            ModelType::Best => "tessdata_best",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(ModelType::Fast),
            "best" => Ok(ModelType::Best),
            other => Err(AppError::Validation(format!(
                "model type must be 'fast' or 'best', got '{}'",
                other
            ))),
        }
    }
}

/// Per-job engine configuration
///
/// The typed fields cover what receipts actually need. Anything else an engine
/// understands travels in `overrides` and is applied verbatim by the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineParams {
    /// Page segmentation mode for this job only
    pub page_seg_mode: Option<PageSegMode>,
    /// Keep runs of spaces between words (column-aligned receipts)
    pub preserve_interword_spaces: Option<bool>,
    /// Engine-specific variables, applied after the typed fields
    pub overrides: BTreeMap<String, String>,
}

impl EngineParams {
    /// Convert an open parameter bag into typed parameters
    ///
    /// `tessedit_pageseg_mode` (or `psm`) and `preserve_interword_spaces` are
    /// validated; every other key is kept as an override.
    pub fn from_map(params: &HashMap<String, String>) -> AppResult<Self> {
        let mut typed = EngineParams::default();

        for (key, value) in params {
            match key.as_str() {
                "tessedit_pageseg_mode" | "psm" => {
                    typed.page_seg_mode = Some(PageSegMode::parse(value)?);
                }
                "preserve_interword_spaces" => {
                    typed.preserve_interword_spaces = Some(parse_flag(key, value)?);
                }
                _ => {
                    if key.trim().is_empty() {
                        return Err(AppError::Validation(
                            "engine parameter names cannot be empty".to_string(),
                        ));
                    }
                    typed.overrides.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(typed)
    }

    pub fn with_page_seg_mode(mut self, mode: PageSegMode) -> Self {
        self.page_seg_mode = Some(mode);
        self
    }

    /// True when the job leaves the engine at its baseline configuration
    pub fn is_baseline(&self) -> bool {
        self.page_seg_mode.is_none()
            && self.preserve_interword_spaces.is_none()
            && self.overrides.is_empty()
    }
}

fn parse_flag(key: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(AppError::Validation(format!(
            "{} must be a boolean flag, got '{}'",
            key, other
        ))),
    }
}

/// Queueing limits applied to a single submission
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueOptions {
    /// Submissions are rejected with `QueueFull` once this many jobs are waiting
    pub max_queue_depth: usize,
    /// How long a job may wait for a free engine handle
    pub max_wait: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
        }
    }
}

impl QueueOptions {
    pub fn validate(&self) -> AppResult<()> {
        if self.max_queue_depth == 0 {
            return Err(AppError::Config(
                "max_queue_depth must be greater than 0".to_string(),
            ));
        }
        if self.max_wait.is_zero() {
            return Err(AppError::Config(
                "max_wait must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration structure for the OCR worker pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of engine handles (upper bound on parallel recognitions)
    pub pool_size: usize,
    /// OCR language codes (e.g., "eng", "eng+hin")
    pub languages: String,
    /// Tesseract model type (Fast vs Best accuracy)
    pub model_type: ModelType,
    /// Explicit tessdata directory; probed from common locations when unset
    pub tessdata_path: Option<String>,
    /// Page segmentation mode every handle returns to after a job
    pub default_page_seg_mode: PageSegMode,
    /// Baseline character whitelist
    pub character_whitelist: Option<String>,
    /// Maximum allowed image file size in bytes
    pub max_file_size: u64,
    /// Default queueing limits for submissions
    pub queue: QueueOptions,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            languages: DEFAULT_LANGUAGES.to_string(),
            model_type: ModelType::default(),
            tessdata_path: None,
            default_page_seg_mode: PageSegMode::Auto,
            character_whitelist: None,
            max_file_size: MAX_FILE_SIZE,
            queue: QueueOptions::default(),
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.pool_size == 0 {
            return Err(AppError::Config(
                "pool_size must be greater than 0".to_string(),
            ));
        }
        if self.languages.trim().is_empty() {
            return Err(AppError::Config(
                "languages cannot be empty".to_string(),
            ));
        }
        if self.max_file_size == 0 {
            return Err(AppError::Config(
                "max_file_size must be greater than 0".to_string(),
            ));
        }
        if let Some(path) = &self.tessdata_path {
            if path.trim().is_empty() {
                return Err(AppError::Config(
                    "tessdata_path cannot be empty if provided".to_string(),
                ));
            }
        }

        self.queue.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(unused_assignments)]
    fn test_pool_config_validation() {
        let mut config = PoolConfig::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        config.pool_size = 0;
        assert!(config.validate().is_err());
        config.pool_size = 2;

        config.languages = "  ".to_string();
        assert!(config.validate().is_err());
        config.languages = "eng".to_string();

        config.queue.max_queue_depth = 0;
        assert!(config.validate().is_err());
        config.queue.max_queue_depth = 8;

        config.queue.max_wait = Duration::ZERO;
        assert!(config.validate().is_err());
        config.queue.max_wait = Duration::from_secs(1);

        config.tessdata_path = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_seg_mode_round_trip() {
        for value in 0..=13 {
            let text = value.to_string();
            let mode = PageSegMode::parse(&text).expect("valid psm");
            assert_eq!(mode.as_str(), text);
        }
        assert!(PageSegMode::parse("14").is_err());
        assert!(PageSegMode::parse("auto").is_err());
    }

    #[test]
    fn test_engine_params_from_map() {
        let mut map = HashMap::new();
        map.insert("tessedit_pageseg_mode".to_string(), "6".to_string());
        map.insert("preserve_interword_spaces".to_string(), "1".to_string());
        map.insert("tessedit_char_whitelist".to_string(), "0123456789.".to_string());

        let params = EngineParams::from_map(&map).expect("valid params");
        assert_eq!(params.page_seg_mode, Some(PageSegMode::SingleBlock));
        assert_eq!(params.preserve_interword_spaces, Some(true));
        assert_eq!(
            params.overrides.get("tessedit_char_whitelist").map(String::as_str),
            Some("0123456789.")
        );
        assert!(!params.is_baseline());
    }

    #[test]
    fn test_engine_params_rejects_bad_values() {
        let mut map = HashMap::new();
        map.insert("psm".to_string(), "99".to_string());
        assert!(EngineParams::from_map(&map).is_err());

        let mut map = HashMap::new();
        map.insert("preserve_interword_spaces".to_string(), "maybe".to_string());
        assert!(EngineParams::from_map(&map).is_err());
    }

    #[test]
    fn test_model_type_parse() {
        assert_eq!(ModelType::parse("BEST").unwrap(), ModelType::Best);
        assert_eq!(ModelType::Fast.tessdata_dir(), "tessdata_fast");
        assert!(ModelType::parse("medium").is_err());
    }
}
