//! Core types for the research orchestration engine.
//!
//! Everything the pipeline stages exchange lives here: the accepted request,
//! the scoped brief, the planned tasks, the evidence collected by workers,
//! and the final report. All of it is serde-serializable because the
//! embedding API layer ships these types over the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

// ============= Request Types =============

/// A research question as accepted from the caller. Immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    /// The natural-language question to research.
    pub question: String,
    /// Research depth.
    #[serde(default)]
    pub mode: Mode,
    /// Optional preset template shaping scope and constraints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    /// Optional reference to a caller-provided document set the run should
    /// consult in addition to the open web.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_set_ref: Option<String>,
}

impl ResearchRequest {
    /// Create a request for the given question and mode.
    pub fn new(question: impl Into<String>, mode: Mode) -> Self {
        Self {
            question: question.into(),
            mode,
            preset: None,
            document_set_ref: None,
        }
    }

    /// Attach a preset template.
    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = Some(preset);
        self
    }

    /// Attach a document set reference.
    pub fn with_document_set(mut self, reference: impl Into<String>) -> Self {
        self.document_set_ref = Some(reference.into());
        self
    }
}

/// Research depth selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Single-pass research covering the whole question at once.
    Quick,
    /// Full decomposition into parallel sub-question tasks.
    #[default]
    Deep,
}

/// Preset templates that add constraints and an extra research facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Literature-oriented research: primary sources, methodology notes.
    Academic,
    /// Market-oriented research: sizing, competitors, recent industry data.
    Market,
}

// ============= Pipeline Types =============

/// Structured decomposition of a question into a goal plus sub-questions.
/// Produced once per run by the scoper; immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchBrief {
    /// The caller's core goal, verbatim (trimmed).
    pub goal: String,
    /// Ordered sub-questions research tasks are planned from.
    pub sub_questions: Vec<String>,
    /// Constraints every downstream stage must respect.
    pub constraints: BTreeSet<String>,
}

/// Identifier of a research task, unique and stable within a run.
pub type TaskId = u32;

/// One unit of delegated retrieval work, mapped to a single sub-question.
/// Created by the planner; mutated only by the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchTask {
    /// Stable id; retries reuse it, they never mint a new one.
    pub id: TaskId,
    /// The sub-question this task answers.
    pub sub_question: String,
    /// Current status.
    pub status: TaskStatus,
    /// Number of attempts made so far.
    pub attempts: u32,
}

impl ResearchTask {
    /// Create a pending task.
    pub fn new(id: TaskId, sub_question: impl Into<String>) -> Self {
        Self {
            id,
            sub_question: sub_question.into(),
            status: TaskStatus::Pending,
            attempts: 0,
        }
    }
}

/// Status of a research task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, or waiting for a retry slot.
    Pending,
    /// An attempt is executing.
    Running,
    /// Terminal: evidence collected (possibly empty).
    Succeeded,
    /// Terminal: attempts exhausted, run deadline hit, or worker lost.
    Failed,
    /// The most recent attempt hit the per-task timeout; will retry unless
    /// attempts are exhausted.
    TimedOut,
    /// Terminal: the run was cancelled before the task finished.
    Cancelled,
}

impl TaskStatus {
    /// Whether the task will make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// A single piece of retrieved, source-attributed information.
/// Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceNote {
    /// The task that produced this note.
    pub task_id: TaskId,
    /// Where the evidence came from. Never empty.
    pub source_url: String,
    /// Condensed content.
    pub snippet: String,
    /// SHA-256 hex digest of the normalized snippet; exact-duplicate key.
    pub content_hash: String,
    /// When the evidence was retrieved.
    pub retrieved_at: DateTime<Utc>,
}

impl EvidenceNote {
    /// Build a note, rejecting source-less evidence.
    pub fn new(
        task_id: TaskId,
        source_url: impl Into<String>,
        snippet: impl Into<String>,
        retrieved_at: DateTime<Utc>,
    ) -> Result<Self> {
        let source_url = source_url.into();
        if source_url.trim().is_empty() {
            return Err(EngineError::Retrieval(
                "evidence note rejected: empty source url".to_string(),
            ));
        }
        let snippet = snippet.into();
        let content_hash = content_hash(&snippet);
        Ok(Self {
            task_id,
            source_url,
            snippet,
            content_hash,
            retrieved_at,
        })
    }
}

/// SHA-256 hex digest of the whitespace-normalized, lowercased snippet.
pub fn content_hash(snippet: &str) -> String {
    let normalized = snippet
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============= Report Types =============

/// The final synthesized report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Report title derived from the research goal.
    pub title: String,
    /// One section per sub-question (or per goal, in quick mode).
    pub sections: Vec<ReportSection>,
    /// Aggregate metrics for the run.
    pub metadata: ReportMetadata,
    /// Whether every sub-question was answered without gaps or conflicts.
    pub status: ReportStatus,
}

/// One rendered section of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    /// The sub-question this section answers.
    pub heading: String,
    /// Rendered prose.
    pub body: String,
    /// Source urls actually referenced in the body.
    pub cited_sources: Vec<String>,
}

/// Run-level report metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Total words across section bodies.
    pub word_count: usize,
    /// Distinct cited source urls.
    pub source_count: usize,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

/// Completion status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Every sub-question has evidence and no conflict is unresolved.
    Complete,
    /// At least one evidence gap or unresolved conflict remains.
    Partial,
}

// ============= Run State =============

/// Stage of a run's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStage {
    /// Turning the raw question into a brief.
    Scoping,
    /// Decomposing the brief into tasks.
    Planning,
    /// Supervised parallel retrieval.
    Researching,
    /// Deduplicating and conflict-checking evidence.
    Aggregating,
    /// Rendering the report.
    Synthesizing,
    /// Terminal: report produced.
    Done,
    /// Terminal: the run failed outright.
    Failed,
    /// Terminal: the caller abandoned the run.
    Cancelled,
}

impl RunStage {
    /// Whether the run has reached a terminal stage.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStage::Done | RunStage::Failed | RunStage::Cancelled
        )
    }
}

/// Observable state of a run. The run controller is the sole writer.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Current stage.
    pub stage: RunStage,
    /// Last known status per task.
    pub task_statuses: BTreeMap<TaskId, TaskStatus>,
}

// ============= Error Types =============

/// Error taxonomy for the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The question or mode/preset combination is unusable.
    #[error("Scoping error: {0}")]
    Scoping(String),

    /// The brief could not be decomposed into tasks.
    #[error("Planning error: {0}")]
    Planning(String),

    /// A retrieval step failed for one task.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// An external provider failed (transport, quota).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Synthesis could not produce any section.
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The run was cancelled by the caller.
    #[error("Run cancelled")]
    Cancelled,

    /// Every research task failed; the payload enumerates root causes.
    #[error("All research tasks failed: {0}")]
    AllTasksFailed(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EngineError>;
