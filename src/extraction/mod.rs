//! # Receipt Extraction Module
//!
//! Turns recognised receipt text (and optional word boxes) into a
//! [`ParsedReceipt`]: merchant, total with its provenance, transaction date
//! and the ranked amount candidates behind them.
//!
//! Extraction never fails. Missing facts come back as `None` or a fallback
//! value with a reason, so callers always get something to show.
//!
//! ## Example
//!
//! ```rust
//! use receipt_ocr::extraction::{ReceiptParser, TotalReason};
//!
//! let parser = ReceiptParser::default();
//! let receipt = parser.parse("ACME STORE\nMilk 3.25\nTOTAL 28.25", None);
//! let total = receipt.total.unwrap();
//! assert_eq!(total.value.to_string(), "28.25");
//! assert_eq!(total.reason, TotalReason::LabelPriorityLast);
//! ```

use std::time::Instant;

use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::engine::Word;
use crate::errors::{AppError, AppResult};
use crate::observability;

pub mod candidates;
pub mod date;
pub mod lines;
pub mod merchant;
pub mod total;

pub use candidates::{cluster_lines, extract_bbox_candidates, VisualLine};
pub use lines::split_lines;
pub use total::{Reconciliation, TotalAnalysis};

/// How the total was arrived at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TotalReason {
    /// Value next to the latest total label
    LabelPriorityLast,
    /// Subtotal plus taxes, no usable candidate
    ComputedFromSubtotalAndTaxes,
    /// Candidate corrected to match subtotal plus taxes
    RepairedCandidateNearExpected,
    /// Highest-scoring candidate
    RankedCandidate,
}

impl TotalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TotalReason::LabelPriorityLast => "label_priority_last",
            TotalReason::ComputedFromSubtotalAndTaxes => "computed_from_subtotal_and_taxes",
            TotalReason::RepairedCandidateNearExpected => "repaired_candidate_near_expected",
            TotalReason::RankedCandidate => "ranked_candidate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DateReason {
    /// Follows a date label
    Label,
    /// Best-scoring date in the header area
    HeaderScan,
    /// Nothing found; the reference date was used
    Fallback,
}

impl DateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateReason::Label => "label",
            DateReason::HeaderScan => "header_scan",
            DateReason::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountCandidate {
    pub value: Decimal,
    pub raw_token: String,
    pub normalized_token: String,
    pub line_index: Option<usize>,
    pub has_keyword: bool,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateCandidate {
    pub date: NaiveDate,
    pub raw_token: String,
    pub reason: DateReason,
    pub score: f64,
}

impl DateCandidate {
    /// `YYYY-MM-DD`
    pub fn iso(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalExtractionResult {
    pub value: Decimal,
    pub raw_token: String,
    pub reason: TotalReason,
    pub subtotal: Option<Decimal>,
    pub taxes: Vec<Decimal>,
}

/// Structured facts pulled from one receipt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedReceipt {
    pub merchant: String,
    pub amount_candidates: Vec<AmountCandidate>,
    /// `None` means unknown, never zero
    pub total: Option<TotalExtractionResult>,
    /// Always set; the reference date when nothing was found
    pub date: NaiveDate,
    pub date_raw: Option<String>,
    pub date_reason: DateReason,
    pub line_count: usize,
}

/// Tunables for the extraction heuristics
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Lines scanned for an unlabelled date
    pub header_scan_lines: usize,
    /// Vertical distance under which words share a line
    pub line_merge_tolerance_px: f32,
    /// Score gap within which a keyword candidate is promoted
    pub keyword_promotion_margin: f64,
    /// Trailing lines that earn the recency bonus
    pub recent_lines_window: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            header_scan_lines: 12,
            line_merge_tolerance_px: 8.0,
            keyword_promotion_margin: 6.0,
            recent_lines_window: 3,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.header_scan_lines == 0 {
            return Err(AppError::Config(
                "header_scan_lines must be greater than 0".to_string(),
            ));
        }
        if !self.line_merge_tolerance_px.is_finite() || self.line_merge_tolerance_px <= 0.0 {
            return Err(AppError::Config(format!(
                "line_merge_tolerance_px must be a positive number, got {}",
                self.line_merge_tolerance_px
            )));
        }
        if !self.keyword_promotion_margin.is_finite() || self.keyword_promotion_margin < 0.0 {
            return Err(AppError::Config(format!(
                "keyword_promotion_margin must not be negative, got {}",
                self.keyword_promotion_margin
            )));
        }
        if self.recent_lines_window == 0 {
            return Err(AppError::Config(
                "recent_lines_window must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stateless receipt parser
///
/// The reference date drives two-digit year expansion and the date fallback.
/// Left unset, the local date at parse time is used.
#[derive(Debug, Clone, Default)]
pub struct ReceiptParser {
    config: ExtractionConfig,
    reference_date: Option<NaiveDate>,
}

impl ReceiptParser {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            reference_date: None,
        }
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Best total for `text`, `None` when nothing usable exists
    pub fn extract_total(&self, text: &str) -> Option<TotalExtractionResult> {
        total::analyze_total(&split_lines(text), &self.config).total
    }

    /// Best date for `text`, without the fallback
    pub fn extract_date(&self, text: &str) -> Option<DateCandidate> {
        date::extract_date(&split_lines(text), self.today(), &self.config)
    }

    /// Full extraction
    ///
    /// When `words` carry boxes, amount candidates come from the visual
    /// lines; otherwise from the text lines.
    pub fn parse(&self, text: &str, words: Option<&[Word]>) -> ParsedReceipt {
        let started = Instant::now();
        let lines = split_lines(text);
        let _span = observability::extraction_span("parse_receipt", lines.len()).entered();
        let today = self.today();

        let analysis = total::analyze_total(&lines, &self.config);
        let amount_candidates = match words {
            Some(words) if !words.is_empty() => extract_bbox_candidates(words, &self.config),
            _ => {
                let mut ranked = analysis.candidates.clone();
                ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
                ranked
            }
        };

        let (date, date_raw, date_reason) = match date::extract_date(&lines, today, &self.config) {
            Some(found) => (found.date, Some(found.raw_token), found.reason),
            None => (today, None, DateReason::Fallback),
        };

        let merchant = merchant::extract_merchant(&lines)
            .unwrap_or_else(|| merchant::UNKNOWN_MERCHANT.to_string());

        debug!(
            merchant = %merchant,
            total = ?analysis.total.as_ref().map(|t| t.value),
            total_reason = ?analysis.total.as_ref().map(|t| t.reason),
            date = %date,
            date_reason = date_reason.as_str(),
            candidates = amount_candidates.len(),
            "Receipt parsed"
        );
        observability::record_extraction_metrics(
            analysis.total.as_ref().map(|t| t.reason.as_str()),
            date_reason.as_str(),
            amount_candidates.len(),
            started.elapsed(),
        );

        ParsedReceipt {
            merchant,
            amount_candidates,
            total: analysis.total,
            date,
            date_raw,
            date_reason,
            line_count: lines.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(unused_assignments)]
    #[test]
    fn test_extraction_config_validation() {
        let mut config = ExtractionConfig::default();
        assert!(config.validate().is_ok());

        config.header_scan_lines = 0;
        assert!(config.validate().is_err());
        config.header_scan_lines = 12;

        config.line_merge_tolerance_px = f32::NAN;
        assert!(config.validate().is_err());
        config.line_merge_tolerance_px = 8.0;

        config.keyword_promotion_margin = -1.0;
        assert!(config.validate().is_err());
        config.keyword_promotion_margin = 6.0;

        config.recent_lines_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_text_falls_back() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let receipt = ReceiptParser::default().with_reference_date(today).parse("", None);
        assert_eq!(receipt.total, None);
        assert_eq!(receipt.date, today);
        assert_eq!(receipt.date_reason, DateReason::Fallback);
        assert_eq!(receipt.merchant, merchant::UNKNOWN_MERCHANT);
        assert_eq!(receipt.line_count, 0);
    }

    #[test]
    fn test_date_candidate_iso() {
        let candidate = DateCandidate {
            date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            raw_token: "5/3/24".to_string(),
            reason: DateReason::HeaderScan,
            score: 90.0,
        };
        assert_eq!(candidate.iso(), "2024-03-05");
    }
}
