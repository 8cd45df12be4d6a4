//! # OCR Worker Pool Module
//!
//! Schedules OCR jobs onto a fixed set of engine handles.
//!
//! ## Dispatch model
//!
//! A single dispatcher task owns the free-handle list and the pending queue.
//! Every state change arrives as a [`PoolCommand`] on one channel, so there is
//! exactly one writer and no locking around scheduling state. A dispatch attempt
//! runs after two events only: a job was queued, or a handle came back.
//!
//! ```text
//! submit ──► [depth check] ──► pending (FIFO) ──► free handle? ──► spawn_blocking(recognize)
//!                 │                 │                                       │
//!            QueueFull         deadline timer                     restore baseline
//!                                   │                                       │
//!                               TimedOut                   resolve job, return handle, dispatch
//! ```
//!
//! Recognition runs on the blocking thread pool; a started job always runs to
//! completion. Only queued jobs can time out or be cancelled.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineFactory, EngineOutput, OcrEngine};
use crate::errors::{error_logging, AppError};
use crate::job::{JobId, JobOutcome, JobState, OcrJob, OcrResult};
use crate::observability;
use crate::ocr_config::{EngineParams, PoolConfig, QueueOptions};
use crate::ocr_errors::OcrError;

const QUEUE_NAME: &str = "ocr_jobs";

/// Point-in-time view of the pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub pool_size: usize,
    pub free_handles: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub rejected: u64,
    pub cancelled: u64,
}

/// Summary returned once shutdown has finished
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Queued jobs rejected with `Cancelled`
    pub cancelled_jobs: usize,
    /// Engine handles terminated
    pub terminated_handles: usize,
    /// Errors reported by engines while terminating
    pub termination_errors: Vec<String>,
}

enum PoolCommand {
    Submit(OcrJob),
    Deadline(JobId),
    Finished {
        slot: usize,
        job_id: JobId,
        engine: Option<Box<dyn OcrEngine>>,
        outcome: Result<EngineOutput, OcrError>,
    },
    Replenished {
        slot: usize,
        engine: Result<Box<dyn OcrEngine>, OcrError>,
    },
    Terminated {
        slot: usize,
        result: Result<(), OcrError>,
    },
    Stats(oneshot::Sender<PoolStats>),
    Shutdown(Option<oneshot::Sender<ShutdownReport>>),
}

/// Future resolving to the outcome of one submitted job
#[derive(Debug)]
pub struct JobTicket {
    id: JobId,
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobTicket {
    pub fn id(&self) -> JobId {
        self.id
    }
}

impl Future for JobTicket {
    type Output = JobOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the dispatcher is gone
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(OcrError::Cancelled)))
    }
}

/// Bounded pool of OCR engine handles with a FIFO job queue
pub struct WorkerPool {
    commands: mpsc::UnboundedSender<PoolCommand>,
    defaults: QueueOptions,
    pool_size: usize,
    next_id: AtomicU64,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create `config.pool_size` engine handles and start the dispatcher
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn init(
        config: &PoolConfig,
        factory: Arc<dyn EngineFactory>,
    ) -> Result<Self, OcrError> {
        config
            .validate()
            .map_err(|e| OcrError::Initialization(e.to_string()))?;

        let mut handles: Vec<Option<Box<dyn OcrEngine>>> = Vec::with_capacity(config.pool_size);
        for slot in 0..config.pool_size {
            let creator = Arc::clone(&factory);
            let created = tokio::task::spawn_blocking(move || creator.create(slot))
                .await
                .map_err(|e| OcrError::Initialization(format!("engine creation task failed: {e}")))
                .and_then(|result| result);

            match created {
                Ok(engine) => handles.push(Some(engine)),
                Err(err) => {
                    error!(slot, error = %err, "Failed to create OCR engine handle");
                    for engine in handles.into_iter().flatten() {
                        if let Err(e) = engine.terminate() {
                            warn!(error = %e, "Failed to terminate engine during aborted init");
                        }
                    }
                    return Err(err);
                }
            }
        }

        let (commands, inbox) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(handles, factory, commands.clone());
        let task = tokio::spawn(dispatcher.run(inbox));

        info!(
            pool_size = config.pool_size,
            max_queue_depth = config.queue.max_queue_depth,
            max_wait_ms = config.queue.max_wait.as_millis() as u64,
            "OCR worker pool started"
        );

        Ok(Self {
            commands,
            defaults: config.queue,
            pool_size: config.pool_size,
            next_id: AtomicU64::new(1),
            dispatcher: Mutex::new(Some(task)),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Queue limits used by [`WorkerPool::submit_default`]
    pub fn default_options(&self) -> QueueOptions {
        self.defaults
    }

    /// Queue a job and return a ticket for its outcome
    ///
    /// Submission order is dispatch order. Invalid `opts` resolve the ticket
    /// with `InvalidOptions` without queueing.
    pub fn submit(
        &self,
        image_path: impl Into<String>,
        params: EngineParams,
        opts: QueueOptions,
    ) -> JobTicket {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (reply, rx) = oneshot::channel();
        let mut job = OcrJob::new(
            id,
            image_path.into(),
            params,
            opts.max_queue_depth,
            opts.max_wait,
            reply,
        );

        if let Err(e) = opts.validate() {
            let reason = match e {
                AppError::Config(msg) => msg,
                other => other.to_string(),
            };
            let err = OcrError::InvalidOptions(reason);
            error_logging::log_ocr_error(&err, "ocr_submit", Some(job.image_path.as_str()), None);
            finish(&mut job, JobState::Rejected, Err(err));
            return JobTicket { id, rx };
        }

        if self.commands.send(PoolCommand::Submit(job)).is_err() {
            debug!(job_id = %id, "Submission after dispatcher exit");
        }
        JobTicket { id, rx }
    }

    pub fn submit_default(&self, image_path: impl Into<String>, params: EngineParams) -> JobTicket {
        self.submit(image_path, params, self.defaults)
    }

    /// Queue a job and wait for its outcome
    pub async fn enqueue(
        &self,
        image_path: impl Into<String>,
        params: EngineParams,
        opts: QueueOptions,
    ) -> Result<OcrResult, OcrError> {
        self.submit(image_path, params, opts).await
    }

    pub async fn stats(&self) -> PoolStats {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(PoolCommand::Stats(reply)).is_err() {
            return PoolStats::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Cancel queued jobs, wait for in-flight jobs, then terminate every handle
    ///
    /// Calling it again after completion returns an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(PoolCommand::Shutdown(Some(reply))).is_err() {
            return ShutdownReport::default();
        }
        let report = rx.await.unwrap_or_default();

        let task = self.dispatcher.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "OCR dispatcher task ended abnormally");
            }
        }
        report
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Graceful shutdown without a waiter; ignored if already shut down
        let _ = self.commands.send(PoolCommand::Shutdown(None));
    }
}

#[derive(Debug, Default)]
struct Counters {
    completed: u64,
    failed: u64,
    timed_out: u64,
    rejected: u64,
    cancelled: u64,
}

struct Dispatcher {
    factory: Arc<dyn EngineFactory>,
    commands: mpsc::UnboundedSender<PoolCommand>,
    handles: Vec<Option<Box<dyn OcrEngine>>>,
    free: VecDeque<usize>,
    pending: VecDeque<OcrJob>,
    in_flight: HashMap<JobId, (usize, OcrJob)>,
    counters: Counters,
    shutting_down: bool,
    terminating: usize,
    replenishing: usize,
    report: ShutdownReport,
    shutdown_waiters: Vec<oneshot::Sender<ShutdownReport>>,
}

impl Dispatcher {
    fn new(
        handles: Vec<Option<Box<dyn OcrEngine>>>,
        factory: Arc<dyn EngineFactory>,
        commands: mpsc::UnboundedSender<PoolCommand>,
    ) -> Self {
        let free = (0..handles.len()).collect();
        Self {
            factory,
            commands,
            handles,
            free,
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
            counters: Counters::default(),
            shutting_down: false,
            terminating: 0,
            replenishing: 0,
            report: ShutdownReport::default(),
            shutdown_waiters: Vec::new(),
        }
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<PoolCommand>) {
        while let Some(command) = inbox.recv().await {
            match command {
                PoolCommand::Submit(job) => self.on_submit(job),
                PoolCommand::Deadline(job_id) => self.on_deadline(job_id),
                PoolCommand::Finished {
                    slot,
                    job_id,
                    engine,
                    outcome,
                } => self.on_finished(slot, job_id, engine, outcome),
                PoolCommand::Replenished { slot, engine } => self.on_replenished(slot, engine),
                PoolCommand::Terminated { slot, result } => self.on_terminated(slot, result),
                PoolCommand::Stats(reply) => {
                    let _ = reply.send(self.stats());
                }
                PoolCommand::Shutdown(waiter) => self.on_shutdown(waiter),
            }

            if self.shutdown_complete() {
                break;
            }
        }

        info!(
            cancelled_jobs = self.report.cancelled_jobs,
            terminated_handles = self.report.terminated_handles,
            "OCR worker pool stopped"
        );
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(self.report.clone());
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            pool_size: self.handles.len(),
            free_handles: self.free.len(),
            queued: self.pending.len(),
            in_flight: self.in_flight.len(),
            completed: self.counters.completed,
            failed: self.counters.failed,
            timed_out: self.counters.timed_out,
            rejected: self.counters.rejected,
            cancelled: self.counters.cancelled,
        }
    }

    fn on_submit(&mut self, mut job: OcrJob) {
        if self.shutting_down {
            self.counters.cancelled += 1;
            finish(&mut job, JobState::Cancelled, Err(OcrError::Cancelled));
            return;
        }

        if self.pending.len() >= job.max_queue_depth {
            let err = OcrError::QueueFull {
                depth: self.pending.len(),
                capacity: job.max_queue_depth,
            };
            warn!(
                job_id = %job.id,
                queue_depth = self.pending.len(),
                capacity = job.max_queue_depth,
                "OCR queue full, rejecting job"
            );
            self.counters.rejected += 1;
            finish(&mut job, JobState::Rejected, Err(err));
            return;
        }

        let job_id = job.id;
        if let Some(deadline) = job.deadline {
            let deadline = tokio::time::Instant::from_std(deadline);
            let commands = self.commands.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                let _ = commands.send(PoolCommand::Deadline(job_id));
            });
            job.arm_timer(timer.abort_handle());
        }

        debug!(job_id = %job_id, image_path = %job.image_path, "OCR job queued");
        self.pending.push_back(job);
        observability::record_queue_metrics(QUEUE_NAME, self.pending.len(), self.handles.len());
        self.dispatch();
    }

    fn dispatch(&mut self) {
        if self.shutting_down {
            return;
        }

        while !self.pending.is_empty() {
            let Some(slot) = self.free.pop_front() else {
                break;
            };
            let Some(engine) = self.handles[slot].take() else {
                error!(slot, "Free list referenced an empty engine slot");
                continue;
            };
            let Some(mut job) = self.pending.pop_front() else {
                self.handles[slot] = Some(engine);
                self.free.push_front(slot);
                break;
            };

            if let Err(e) = job.transition(JobState::Started) {
                error!(job_id = %job.id, error = %e, "Queued job in unexpected state");
                self.handles[slot] = Some(engine);
                self.free.push_front(slot);
                continue;
            }

            let job_id = job.id;
            let image_path = job.image_path.clone();
            let params = job.params.clone();
            debug!(
                job_id = %job_id,
                slot,
                waited_ms = job.waited().as_millis() as u64,
                "OCR job dispatched"
            );
            self.in_flight.insert(job_id, (slot, job));

            let commands = self.commands.clone();
            tokio::spawn(async move {
                let joined = tokio::task::spawn_blocking(move || {
                    let mut engine = engine;
                    let outcome = engine.recognize(&image_path, &params);
                    if let Err(e) = engine.restore_baseline() {
                        warn!(slot, error = %e, "Failed to restore engine baseline configuration");
                    }
                    (engine, outcome)
                })
                .await;

                let command = match joined {
                    Ok((engine, outcome)) => PoolCommand::Finished {
                        slot,
                        job_id,
                        engine: Some(engine),
                        outcome,
                    },
                    Err(e) => PoolCommand::Finished {
                        slot,
                        job_id,
                        engine: None,
                        outcome: Err(OcrError::EngineFailure(format!(
                            "recognition task aborted: {e}"
                        ))),
                    },
                };
                let _ = commands.send(command);
            });
        }

        observability::record_queue_metrics(QUEUE_NAME, self.pending.len(), self.handles.len());
        observability::record_handle_metrics(self.free.len(), self.handles.len());
    }

    fn on_deadline(&mut self, job_id: JobId) {
        let Some(position) = self.pending.iter().position(|job| job.id == job_id) else {
            // Already started or resolved
            return;
        };
        let Some(mut job) = self.pending.remove(position) else {
            return;
        };

        let waited = job.waited();
        let err = OcrError::TimedOut { waited };
        error_logging::log_ocr_error(&err, "ocr_queue_wait", Some(job.image_path.as_str()), Some(waited));
        self.counters.timed_out += 1;
        finish(&mut job, JobState::TimedOut, Err(err));
        observability::record_queue_metrics(QUEUE_NAME, self.pending.len(), self.handles.len());
    }

    fn on_finished(
        &mut self,
        slot: usize,
        job_id: JobId,
        engine: Option<Box<dyn OcrEngine>>,
        outcome: Result<EngineOutput, OcrError>,
    ) {
        match self.in_flight.remove(&job_id) {
            Some((_, mut job)) => match outcome {
                Ok(output) => {
                    let result = OcrResult::from(output);
                    info!(
                        job_id = %job_id,
                        slot,
                        characters = result.text.len(),
                        confidence = result.confidence,
                        "OCR job completed"
                    );
                    self.counters.completed += 1;
                    finish(&mut job, JobState::Completed, Ok(result));
                }
                Err(err) => {
                    error_logging::log_ocr_error(
                        &err,
                        "ocr_recognition",
                        Some(job.image_path.as_str()),
                        Some(job.waited()),
                    );
                    self.counters.failed += 1;
                    finish(&mut job, JobState::Failed, Err(err));
                }
            },
            None => error!(job_id = %job_id, slot, "Finished job was not in flight"),
        }

        match engine {
            Some(engine) => self.return_handle(slot, engine),
            None => self.replenish(slot),
        }
    }

    fn return_handle(&mut self, slot: usize, engine: Box<dyn OcrEngine>) {
        if self.shutting_down {
            self.terminate(slot, engine);
            return;
        }
        self.handles[slot] = Some(engine);
        self.free.push_back(slot);
        self.dispatch();
    }

    /// Replace a handle lost to a panicking recognition task
    fn replenish(&mut self, slot: usize) {
        warn!(slot, "Engine handle lost, creating a replacement");
        self.replenishing += 1;
        let factory = Arc::clone(&self.factory);
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let engine = tokio::task::spawn_blocking(move || factory.create(slot))
                .await
                .map_err(|e| OcrError::Initialization(format!("engine creation task failed: {e}")))
                .and_then(|result| result);
            let _ = commands.send(PoolCommand::Replenished { slot, engine });
        });
    }

    fn on_replenished(&mut self, slot: usize, engine: Result<Box<dyn OcrEngine>, OcrError>) {
        self.replenishing -= 1;
        match engine {
            Ok(engine) => self.return_handle(slot, engine),
            Err(err) => {
                // The slot stays empty; count it as gone for shutdown accounting
                error!(slot, error = %err, "Failed to replace engine handle");
                self.report.termination_errors.push(err.to_string());
            }
        }
    }

    fn terminate(&mut self, slot: usize, engine: Box<dyn OcrEngine>) {
        self.terminating += 1;
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || engine.terminate())
                .await
                .map_err(|e| OcrError::EngineFailure(format!("termination task failed: {e}")))
                .and_then(|result| result);
            let _ = commands.send(PoolCommand::Terminated { slot, result });
        });
    }

    fn on_terminated(&mut self, slot: usize, result: Result<(), OcrError>) {
        self.terminating -= 1;
        self.report.terminated_handles += 1;
        if let Err(err) = result {
            warn!(slot, error = %err, "Engine handle reported an error while terminating");
            self.report.termination_errors.push(err.to_string());
        }
    }

    fn on_shutdown(&mut self, waiter: Option<oneshot::Sender<ShutdownReport>>) {
        if let Some(waiter) = waiter {
            self.shutdown_waiters.push(waiter);
        }
        if self.shutting_down {
            return;
        }

        self.shutting_down = true;
        info!(
            queued = self.pending.len(),
            in_flight = self.in_flight.len(),
            "OCR worker pool shutting down"
        );

        while let Some(mut job) = self.pending.pop_front() {
            self.counters.cancelled += 1;
            self.report.cancelled_jobs += 1;
            finish(&mut job, JobState::Cancelled, Err(OcrError::Cancelled));
        }
        observability::record_queue_metrics(QUEUE_NAME, 0, self.handles.len());

        while let Some(slot) = self.free.pop_front() {
            if let Some(engine) = self.handles[slot].take() {
                self.terminate(slot, engine);
            }
        }
    }

    fn shutdown_complete(&self) -> bool {
        self.shutting_down
            && self.in_flight.is_empty()
            && self.terminating == 0
            && self.replenishing == 0
    }
}

/// Resolve a job and record its outcome
fn finish(job: &mut OcrJob, state: JobState, outcome: JobOutcome) {
    let waited = job.waited();
    let run_time = job.run_time();
    match job.resolve(state, outcome) {
        Ok(delivered) => {
            if !delivered {
                debug!(job_id = %job.id, state = state.as_str(), "Caller dropped its ticket");
            }
            observability::record_job_metrics(state.as_str(), waited, run_time);
        }
        Err(e) => error!(job_id = %job.id, error = %e, "Job resolution refused"),
    }
}
