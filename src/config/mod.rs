//! Engine configuration.
//!
//! The engine consumes this configuration; it does not own loading policy.
//! Embedders either build an [`EngineConfig`] in code (builder methods) or
//! deserialize one from TOML with [`EngineConfig::from_toml_str`]. Every
//! field has a default, so partial TOML is fine.

use crate::types::{EngineError, Result};
use serde::Deserialize;
use std::time::Duration;

/// Tuning knobs for one run of the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of research tasks running simultaneously (default: 4).
    pub concurrency: usize,

    /// Per-task attempt timeout in milliseconds (default: 30s).
    pub task_timeout_ms: u64,

    /// Run-level deadline in milliseconds (default: 5 minutes).
    pub run_deadline_ms: u64,

    /// Maximum attempts per task, including the first (default: 3).
    pub max_attempts: u32,

    /// Base retry backoff in milliseconds; doubles per attempt (default: 250).
    pub retry_base_backoff_ms: u64,

    /// Grace period granted to in-flight tasks after cancellation before
    /// they are force-marked cancelled (default: 500ms).
    pub cancel_grace_ms: u64,

    /// Jaccard similarity at or above which two snippets for the same
    /// sub-question merge as near-duplicates (default: 0.8).
    pub similarity_threshold: f64,

    /// Maximum evidence notes a worker emits per task (default: 5).
    pub max_notes_per_task: usize,

    /// Concurrent-call tickets for the shared search provider, sized
    /// independently of `concurrency` (default: 2).
    pub throttle_permits: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            task_timeout_ms: 30_000,
            run_deadline_ms: 300_000,
            max_attempts: 3,
            retry_base_backoff_ms: 250,
            cancel_grace_ms: 500,
            similarity_threshold: 0.8,
            max_notes_per_task: 5,
            throttle_permits: 2,
        }
    }
}

impl EngineConfig {
    /// Deserialize a config from a TOML document. Missing keys fall back to
    /// defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| EngineError::Configuration(e.to_string()))
    }

    /// Set the worker concurrency ceiling.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the per-task attempt timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the run-level deadline.
    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline_ms = deadline.as_millis() as u64;
        self
    }

    /// Set the maximum attempts per task.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base retry backoff.
    pub fn with_retry_base_backoff(mut self, backoff: Duration) -> Self {
        self.retry_base_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Set the post-cancellation grace period.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Set the near-duplicate similarity threshold.
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the evidence cap per task.
    pub fn with_max_notes_per_task(mut self, max_notes: usize) -> Self {
        self.max_notes_per_task = max_notes;
        self
    }

    /// Set the search throttle size.
    pub fn with_throttle_permits(mut self, permits: usize) -> Self {
        self.throttle_permits = permits;
        self
    }

    /// Per-task attempt timeout as a [`Duration`].
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Run-level deadline as a [`Duration`].
    pub fn run_deadline(&self) -> Duration {
        Duration::from_millis(self.run_deadline_ms)
    }

    /// Base retry backoff as a [`Duration`].
    pub fn retry_base_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_base_backoff_ms)
    }

    /// Post-cancellation grace period as a [`Duration`].
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}
