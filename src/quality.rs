//! # Recognition Quality Tracking
//!
//! Running statistics over recognition confidence scores, plus the best sample
//! seen so far for diagnostics. Independent of the worker pool: callers feed it
//! whatever results they want tracked.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::observability;

/// Number of recent samples kept
pub const RECENT_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QualityLabel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLabel::Excellent => "excellent",
            QualityLabel::Good => "good",
            QualityLabel::Fair => "fair",
            QualityLabel::Poor => "poor",
        }
    }
}

/// Map a 0-100 confidence onto a quality label
pub fn classify_confidence(confidence: f32) -> QualityLabel {
    if confidence >= 85.0 {
        QualityLabel::Excellent
    } else if confidence >= 70.0 {
        QualityLabel::Good
    } else if confidence >= 55.0 {
        QualityLabel::Fair
    } else {
        QualityLabel::Poor
    }
}

/// Where a sample came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleMeta {
    pub filename: Option<String>,
    /// Preprocessing variant that produced the bitmap
    pub variant: Option<String>,
    /// Engine configuration used, e.g. `psm=6`
    pub config: Option<String>,
}

impl SampleMeta {
    pub fn for_file(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestSample {
    pub confidence: f32,
    pub meta: SampleMeta,
    pub recorded_at: DateTime<Utc>,
}

/// Copy of the tracker state at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualitySnapshot {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub avg: Option<f64>,
    /// Oldest first
    pub recent: Vec<f32>,
    pub best: Option<BestSample>,
}

#[derive(Debug, Default)]
struct QualityState {
    count: u64,
    sum: f64,
    min: Option<f32>,
    max: Option<f32>,
    recent: VecDeque<f32>,
    best: Option<BestSample>,
}

/// Thread-safe running aggregate of confidence samples
#[derive(Debug, Default)]
pub struct QualityTracker {
    state: Mutex<QualityState>,
}

impl QualityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample and return its label
    ///
    /// Non-finite values are ignored and labelled `Poor`.
    pub fn record(&self, confidence: f32, meta: SampleMeta) -> QualityLabel {
        let label = classify_confidence(confidence);
        if !confidence.is_finite() {
            tracing::warn!(confidence, "Ignoring non-finite confidence sample");
            return label;
        }

        {
            let mut state = self.state.lock();
            state.count += 1;
            state.sum += confidence as f64;
            state.min = Some(state.min.map_or(confidence, |m| m.min(confidence)));
            state.max = Some(state.max.map_or(confidence, |m| m.max(confidence)));

            state.recent.push_back(confidence);
            while state.recent.len() > RECENT_SAMPLES {
                state.recent.pop_front();
            }

            let is_best = state
                .best
                .as_ref()
                .map_or(true, |best| confidence > best.confidence);
            if is_best {
                state.best = Some(BestSample {
                    confidence,
                    meta,
                    recorded_at: Utc::now(),
                });
            }
        }

        observability::record_confidence_metrics(confidence, label.as_str());
        label
    }

    pub fn snapshot(&self) -> QualitySnapshot {
        let state = self.state.lock();
        QualitySnapshot {
            count: state.count,
            sum: state.sum,
            min: state.min,
            max: state.max,
            avg: (state.count > 0).then(|| state.sum / state.count as f64),
            recent: state.recent.iter().copied().collect(),
            best: state.best.clone(),
        }
    }

    /// Forget every sample
    pub fn reset(&self) {
        *self.state.lock() = QualityState::default();
    }
}
