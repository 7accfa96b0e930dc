//! Run Controller
//!
//! Drives a research run through its stages,
//! Scoping → Planning → Researching → Aggregating → Synthesizing →
//! {Done | Failed | Cancelled}, and is the only component the embedding
//! API layer talks to.
//!
//! The controller is the sole writer of [`RunState`]. Every other component
//! reports outcomes upward; stage transitions and per-task status changes
//! are mirrored onto an optional progress channel that is finite and ends
//! with exactly one terminal event.
//!
//! # Example
//!
//! ```rust,ignore
//! use argos::{EngineConfig, Mode, ResearchRequest, RunController};
//! use std::sync::Arc;
//!
//! let controller = RunController::new(search, generator, EngineConfig::default());
//!
//! // one-shot
//! let report = controller.run(ResearchRequest::new("Compare solar vs nuclear in India", Mode::Deep)).await?;
//!
//! // streaming, with cancellation
//! let mut handle = controller.spawn(request);
//! while let Some(event) = handle.next_event().await {
//!     println!("{:?}", event.stage);
//! }
//! let report = handle.join().await?;
//! ```

mod context;

pub use context::{CancelToken, RunContext};

use crate::aggregate::aggregate;
use crate::config::EngineConfig;
use crate::plan::plan;
use crate::providers::{GenerationProvider, SearchProvider, SearchThrottle};
use crate::scope::scope;
use crate::supervisor::{Supervisor, TaskOutcome};
use crate::synthesize::synthesize;
use crate::types::{
    EngineError, Report, ResearchRequest, ResearchTask, Result, RunStage, RunState, TaskId,
    TaskStatus,
};
use crate::worker::ResearchWorker;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Capacity of the progress channel. Intermediate events are dropped when
/// the consumer lags this far behind; the terminal event is always
/// delivered.
const PROGRESS_BUFFER: usize = 64;

/// Progress event emitted as a run advances.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProgressEvent {
    /// The stage the run is in.
    pub stage: RunStage,
    /// Set on per-task updates during [`RunStage::Researching`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Set on per-task updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl ProgressEvent {
    pub(crate) fn stage(stage: RunStage) -> Self {
        Self {
            stage,
            task_id: None,
            status: None,
        }
    }

    pub(crate) fn task(stage: RunStage, task_id: TaskId, status: TaskStatus) -> Self {
        Self {
            stage,
            task_id: Some(task_id),
            status: Some(status),
        }
    }

    /// Whether this is the run's terminal event.
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal() && self.task_id.is_none()
    }
}

/// Sink the controller and supervisor write progress into.
#[derive(Clone)]
pub struct ProgressSink {
    sender: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    /// A sink that discards everything (non-streaming runs).
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    fn new(sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Best-effort emission; lags drop the event rather than block a stage.
    pub(crate) fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.try_send(event);
        }
    }

    /// Guaranteed delivery for the single terminal event.
    async fn emit_terminal(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event).await;
        }
    }
}

/// Handle to a spawned run: progress events, cancellation, state snapshots.
pub struct RunHandle {
    run_id: Uuid,
    cancel: CancelToken,
    events: mpsc::Receiver<ProgressEvent>,
    state: Arc<RwLock<RunState>>,
    task: tokio::task::JoinHandle<Result<Report>>,
}

impl RunHandle {
    /// Unique id of the run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Signal cancellation. The run winds down cooperatively and ends
    /// `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Receive the next progress event; `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Snapshot of the current run state.
    pub fn state(&self) -> RunState {
        self.state.read().clone()
    }

    /// Wait for the run to finish and take its result.
    pub async fn join(self) -> Result<Report> {
        let RunHandle { events, task, .. } = self;
        // release the event stream so the run never blocks delivering its
        // terminal event to a reader that stopped listening
        drop(events);
        match task.await {
            Ok(result) => result,
            Err(err) => Err(EngineError::Internal(format!("run task aborted: {err}"))),
        }
    }
}

/// The engine's entry point: owns the stage state machine and the injected
/// capabilities, and supervises one run per call.
#[derive(Clone)]
pub struct RunController {
    generator: Arc<dyn GenerationProvider>,
    config: EngineConfig,
    supervisor: Supervisor,
}

impl RunController {
    /// Build a controller over the injected capabilities. The search
    /// throttle is created here and shared by every worker of every run.
    pub fn new(
        search: Arc<dyn SearchProvider>,
        generator: Arc<dyn GenerationProvider>,
        config: EngineConfig,
    ) -> Self {
        let throttle = Arc::new(SearchThrottle::new(config.throttle_permits));
        let worker = ResearchWorker::new(search, throttle, config.max_notes_per_task);
        Self {
            generator,
            config,
            supervisor: Supervisor::new(worker),
        }
    }

    /// Execute a run to completion without progress streaming.
    pub async fn run(&self, request: ResearchRequest) -> Result<Report> {
        let ctx = RunContext::new(self.config.clone());
        let state = Arc::new(RwLock::new(RunState {
            run_id: ctx.run_id,
            stage: RunStage::Scoping,
            task_statuses: BTreeMap::new(),
        }));
        self.drive(request, ctx, ProgressSink::disabled(), state)
            .await
    }

    /// Start a run with live progress events and external cancellation.
    /// Requires a tokio runtime.
    pub fn spawn(&self, request: ResearchRequest) -> RunHandle {
        let ctx = RunContext::new(self.config.clone());
        let (sender, events) = mpsc::channel(PROGRESS_BUFFER);
        let state = Arc::new(RwLock::new(RunState {
            run_id: ctx.run_id,
            stage: RunStage::Scoping,
            task_statuses: BTreeMap::new(),
        }));

        let run_id = ctx.run_id;
        let cancel = ctx.cancel.clone();
        let controller = self.clone();
        let shared_state = state.clone();
        let task = tokio::spawn(async move {
            controller
                .drive(request, ctx, ProgressSink::new(sender), shared_state)
                .await
        });

        RunHandle {
            run_id,
            cancel,
            events,
            state,
            task,
        }
    }

    /// The stage state machine. Terminal stages are reached exactly once,
    /// on success, failure, or observed cancellation.
    async fn drive(
        &self,
        request: ResearchRequest,
        ctx: RunContext,
        progress: ProgressSink,
        state: Arc<RwLock<RunState>>,
    ) -> Result<Report> {
        let started = Instant::now();
        tracing::info!(run = %ctx.run_id, mode = ?request.mode, "run started");

        // Scoping
        enter_stage(&state, &progress, RunStage::Scoping);
        let brief = match scope(&request) {
            Ok(brief) => brief,
            Err(err) => return finish_failed(&state, &progress, err).await,
        };
        if ctx.cancel.is_cancelled() {
            return finish_cancelled(&state, &progress, &ctx).await;
        }

        // Planning
        enter_stage(&state, &progress, RunStage::Planning);
        let mut tasks = match plan(&brief, request.mode) {
            Ok(tasks) => tasks,
            Err(err) => return finish_failed(&state, &progress, err).await,
        };
        state.write().task_statuses = tasks
            .iter()
            .map(|task| (task.id, TaskStatus::Pending))
            .collect();
        if ctx.cancel.is_cancelled() {
            return finish_cancelled(&state, &progress, &ctx).await;
        }

        // Researching
        enter_stage(&state, &progress, RunStage::Researching);
        let outcomes = self.supervisor.run(&mut tasks, &ctx, &progress).await;
        state.write().task_statuses = tasks
            .iter()
            .map(|task| (task.id, task.status))
            .collect();

        if ctx.cancel.is_cancelled() {
            // partial evidence is discarded: cancellation abandons the run
            return finish_cancelled(&state, &progress, &ctx).await;
        }

        let succeeded = outcomes
            .values()
            .filter(|outcome| outcome.status == TaskStatus::Succeeded)
            .count();
        if succeeded == 0 {
            let reasons = failure_reasons(&tasks, &outcomes);
            return finish_failed(&state, &progress, EngineError::AllTasksFailed(reasons)).await;
        }

        // Aggregating
        enter_stage(&state, &progress, RunStage::Aggregating);
        let aggregated = aggregate(&tasks, &outcomes, self.config.similarity_threshold);
        if ctx.cancel.is_cancelled() {
            return finish_cancelled(&state, &progress, &ctx).await;
        }

        // Synthesizing
        enter_stage(&state, &progress, RunStage::Synthesizing);
        let mut report = match synthesize(&brief, &aggregated, self.generator.as_ref()).await {
            Ok(report) => report,
            Err(err) => return finish_failed(&state, &progress, err).await,
        };
        if ctx.cancel.is_cancelled() {
            return finish_cancelled(&state, &progress, &ctx).await;
        }
        report.metadata.duration_ms = started.elapsed().as_millis() as u64;

        state.write().stage = RunStage::Done;
        progress
            .emit_terminal(ProgressEvent::stage(RunStage::Done))
            .await;
        tracing::info!(
            run = %ctx.run_id,
            sections = report.sections.len(),
            sources = report.metadata.source_count,
            status = ?report.status,
            "run finished"
        );
        Ok(report)
    }
}

fn enter_stage(state: &Arc<RwLock<RunState>>, progress: &ProgressSink, stage: RunStage) {
    state.write().stage = stage;
    progress.emit(ProgressEvent::stage(stage));
    tracing::debug!(stage = ?stage, "entering stage");
}

async fn finish_failed(
    state: &Arc<RwLock<RunState>>,
    progress: &ProgressSink,
    err: EngineError,
) -> Result<Report> {
    state.write().stage = RunStage::Failed;
    progress
        .emit_terminal(ProgressEvent::stage(RunStage::Failed))
        .await;
    tracing::warn!(error = %err, "run failed");
    Err(err)
}

async fn finish_cancelled(
    state: &Arc<RwLock<RunState>>,
    progress: &ProgressSink,
    ctx: &RunContext,
) -> Result<Report> {
    state.write().stage = RunStage::Cancelled;
    progress
        .emit_terminal(ProgressEvent::stage(RunStage::Cancelled))
        .await;
    tracing::info!(run = %ctx.run_id, "run cancelled");
    Err(EngineError::Cancelled)
}

/// Per-task root causes for an all-tasks-failed run.
fn failure_reasons(
    tasks: &[ResearchTask],
    outcomes: &BTreeMap<TaskId, TaskOutcome>,
) -> String {
    tasks
        .iter()
        .map(|task| {
            let reason = outcomes
                .get(&task.id)
                .and_then(|outcome| outcome.error.clone())
                .unwrap_or_else(|| "unknown".to_string());
            format!("task {} ({}): {}", task.id, task.sub_question, reason)
        })
        .collect::<Vec<_>>()
        .join("; ")
}
