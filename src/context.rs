//! # Receipt Processing Context
//!
//! Owns the worker pool, quality tracker and parser for the life of the
//! process. Created once by the entry point and passed by reference.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, Instrument};

use crate::config::AppConfig;
use crate::engine::EngineFactory;
use crate::errors::AppResult;
use crate::extraction::{ParsedReceipt, ReceiptParser};
use crate::job::OcrResult;
use crate::observability;
use crate::ocr_config::EngineParams;
use crate::ocr_errors::OcrError;
use crate::quality::{QualityLabel, QualityTracker, SampleMeta};
use crate::worker_pool::{ShutdownReport, WorkerPool};

/// OCR output together with what was extracted from it
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedReceipt {
    pub image_path: String,
    pub confidence: f32,
    pub quality: QualityLabel,
    pub text: String,
    pub receipt: ParsedReceipt,
}

pub struct ReceiptContext {
    pool: WorkerPool,
    quality: QualityTracker,
    parser: ReceiptParser,
}

impl ReceiptContext {
    /// Validate configuration and start the worker pool
    pub async fn init(config: &AppConfig, factory: Arc<dyn EngineFactory>) -> AppResult<Self> {
        config.validate()?;
        let pool = WorkerPool::init(&config.ocr, factory).await?;
        info!(summary = %config.summary(), "Receipt context initialized");

        Ok(Self {
            pool,
            quality: QualityTracker::new(),
            parser: ReceiptParser::new(config.extraction.clone()),
        })
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn quality(&self) -> &QualityTracker {
        &self.quality
    }

    pub fn parser(&self) -> &ReceiptParser {
        &self.parser
    }

    /// Recognise one image with the pool's default queue limits and parse it
    pub async fn process_image(
        &self,
        image_path: &str,
        params: EngineParams,
    ) -> Result<ProcessedReceipt, OcrError> {
        let meta = SampleMeta {
            filename: Some(image_path.to_string()),
            variant: None,
            config: params.page_seg_mode.map(|psm| format!("psm={}", psm.as_str())),
        };

        let result: OcrResult = self
            .pool
            .submit_default(image_path, params)
            .instrument(observability::ocr_span("process_image"))
            .await?;

        let quality = self.quality.record(result.confidence, meta);
        let receipt = self.parser.parse(&result.text, Some(&result.words));

        Ok(ProcessedReceipt {
            image_path: image_path.to_string(),
            confidence: result.confidence,
            quality,
            text: result.text,
            receipt,
        })
    }

    /// Stop the pool; queued jobs are cancelled and handles terminated
    pub async fn shutdown(&self) -> ShutdownReport {
        let report = self.pool.shutdown().await;
        let quality = self.quality.snapshot();
        info!(
            cancelled_jobs = report.cancelled_jobs,
            terminated_handles = report.terminated_handles,
            samples = quality.count,
            average_confidence = ?quality.avg,
            "Receipt context shut down"
        );
        report
    }
}
