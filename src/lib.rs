//! # A.R.G.O.S - Agentic Research & Guided Orchestration System
//!
//! A research orchestration engine: it turns a natural-language question
//! into a structured, cited report by scoping the question into a brief,
//! planning parallel research tasks, supervising a bounded pool of workers
//! against an external search capability, aggregating and deduplicating the
//! collected evidence, and synthesizing the final report.
//!
//! ## Overview
//!
//! A.R.G.O.S is the orchestration layer only. It is not a search engine and
//! not a language model: both capabilities are injected behind narrow
//! traits ([`SearchProvider`], [`GenerationProvider`]) and can be replaced
//! by stubs in tests. There is no HTTP surface here either: an embedding
//! API layer calls [`RunController`] and serializes what comes back.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use argos::{EngineConfig, Mode, ResearchRequest, RunController};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = RunController::new(
//!         Arc::new(my_search_backend),
//!         Arc::new(my_llm_backend),
//!         EngineConfig::default(),
//!     );
//!
//!     let request = ResearchRequest::new("Compare solar vs nuclear in India", Mode::Deep);
//!     let report = controller.run(request).await?;
//!
//!     for section in &report.sections {
//!         println!("## {}\n{}\n", section.heading, section.body);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Live progress and cancellation
//!
//! ```rust,ignore
//! let mut handle = controller.spawn(request);
//! while let Some(event) = handle.next_event().await {
//!     println!("{:?} {:?} {:?}", event.stage, event.task_id, event.status);
//! }
//! let report = handle.join().await?;
//! ```
//!
//! ## Modules
//!
//! - [`scope`] - question → research brief (deterministic)
//! - [`plan`] - brief → research tasks (pure)
//! - [`worker`] - one task → evidence notes
//! - [`supervisor`] - bounded fan-out, timeouts, retries, cancellation
//! - [`aggregate`] - dedup, near-duplicate merging, conflict detection
//! - [`synthesize`] - aggregated evidence → cited report
//! - [`run`] - the stage state machine and the engine's entry point
//!
//! ## Pipeline
//!
//! `RunController` drives the stages sequentially (each stage's input is
//! the prior stage's completed output), while the research stage itself
//! fans out to parallel workers:
//!
//! ```text
//! Scoping → Planning → Researching → Aggregating → Synthesizing → Done
//!                          │
//!                          └─ worker pool (bounded, throttled, retried)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Evidence deduplication, merging, and conflict detection.
pub mod aggregate;
/// Engine configuration (consumed, not owned).
pub mod config;
/// Task planning from a research brief.
pub mod plan;
/// Capability seams for external search and generation providers.
pub mod providers;
/// The run controller state machine and per-run context.
pub mod run;
/// Question scoping and preset templates.
pub mod scope;
/// Bounded-pool supervision of research workers.
pub mod supervisor;
/// Report synthesis from aggregated evidence.
pub mod synthesize;
/// Core types (requests, briefs, tasks, evidence, reports, errors).
pub mod types;
/// Single-task research workers.
pub mod worker;

// Re-export commonly used types
pub use aggregate::{aggregate, AggregatedEvidence, Conflict, EvidenceGroup, RetainedNote};
pub use config::EngineConfig;
pub use plan::plan;
pub use providers::{GenerationProvider, SearchHit, SearchProvider, SearchThrottle};
pub use run::{CancelToken, ProgressEvent, ProgressSink, RunController, RunContext, RunHandle};
pub use scope::scope;
pub use supervisor::{Supervisor, TaskOutcome};
pub use synthesize::synthesize;
pub use types::{
    EngineError, EvidenceNote, Mode, Preset, Report, ReportMetadata, ReportSection, ReportStatus,
    ResearchBrief, ResearchRequest, ResearchTask, Result, RunStage, RunState, TaskId, TaskStatus,
};
pub use worker::ResearchWorker;
