//! # OCR Job Module
//!
//! A job is owned by the worker pool from submission until its result has been
//! delivered. Its state only moves forward:
//!
//! ```text
//! Queued ──dispatch──► Started ──success──► Completed
//!   │                     └─────error─────► Failed
//!   ├──deadline──► TimedOut
//!   ├──capacity──► Rejected
//!   └──shutdown──► Cancelled
//! ```
//!
//! Every terminal state resolves the caller's future exactly once.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::engine::{EngineOutput, Word};
use crate::ocr_config::EngineParams;
use crate::ocr_errors::OcrError;

/// Monotonic identifier assigned at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Queued,
    Started,
    Completed,
    Failed,
    TimedOut,
    Rejected,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Queued | JobState::Started)
    }

    /// Whether `self -> next` is an edge of the job state machine
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Started)
                | (JobState::Queued, JobState::TimedOut)
                | (JobState::Queued, JobState::Rejected)
                | (JobState::Queued, JobState::Cancelled)
                | (JobState::Started, JobState::Completed)
                | (JobState::Started, JobState::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Started => "started",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
            JobState::Rejected => "rejected",
            JobState::Cancelled => "cancelled",
        }
    }
}

/// Attempted a transition the state machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[JOB_STATE] invalid transition {} -> {}",
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// What the caller receives for a completed job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrResult {
    pub text: String,
    /// Mean word confidence when word data exists, else the engine's own scalar
    pub confidence: f32,
    pub words: Vec<Word>,
    /// Engine-native output
    pub raw: EngineOutput,
}

impl From<EngineOutput> for OcrResult {
    fn from(raw: EngineOutput) -> Self {
        Self {
            text: raw.text.clone(),
            confidence: raw.effective_confidence(),
            words: raw.words.clone(),
            raw,
        }
    }
}

pub type JobOutcome = Result<OcrResult, OcrError>;

/// A unit of OCR work tracked by the pool
#[derive(Debug)]
pub struct OcrJob {
    pub id: JobId,
    pub image_path: String,
    pub params: EngineParams,
    pub enqueued_at: Instant,
    /// `None` when `max_wait` reaches past any representable instant
    pub deadline: Option<Instant>,
    pub max_queue_depth: usize,
    state: JobState,
    started_at: Option<Instant>,
    reply: Option<oneshot::Sender<JobOutcome>>,
    timer: Option<AbortHandle>,
}

impl OcrJob {
    pub fn new(
        id: JobId,
        image_path: String,
        params: EngineParams,
        max_queue_depth: usize,
        max_wait: Duration,
        reply: oneshot::Sender<JobOutcome>,
    ) -> Self {
        let enqueued_at = Instant::now();
        Self {
            id,
            image_path,
            params,
            enqueued_at,
            deadline: enqueued_at.checked_add(max_wait),
            max_queue_depth,
            state: JobState::Queued,
            started_at: None,
            reply: Some(reply),
            timer: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Time spent waiting for a handle (up to now if still queued)
    pub fn waited(&self) -> Duration {
        self.started_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.enqueued_at)
    }

    /// Time spent in recognition, if the job was dispatched
    pub fn run_time(&self) -> Option<Duration> {
        self.started_at.map(|started| started.elapsed())
    }

    pub fn arm_timer(&mut self, timer: AbortHandle) {
        self.timer = Some(timer);
    }

    pub fn transition(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if next == JobState::Started {
            self.started_at = Some(Instant::now());
        }
        if next != JobState::TimedOut {
            if let Some(timer) = self.timer.take() {
                timer.abort();
            }
        } else {
            self.timer = None;
        }
        self.state = next;
        Ok(())
    }

    /// Move to a terminal state and deliver `outcome` to the caller
    ///
    /// Returns `false` if the caller already dropped its ticket.
    pub fn resolve(&mut self, next: JobState, outcome: JobOutcome) -> Result<bool, InvalidTransition> {
        debug_assert!(next.is_terminal());
        self.transition(next)?;
        Ok(match self.reply.take() {
            Some(reply) => reply.send(outcome).is_ok(),
            None => false,
        })
    }
}

impl Drop for OcrJob {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
