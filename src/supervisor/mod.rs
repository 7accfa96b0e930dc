//! Agent Supervisor
//!
//! Fans research tasks out to a bounded pool of workers and owns every
//! scheduling policy of the research stage: the concurrency ceiling, the
//! per-task timeout, the retry/backoff loop, the run-level deadline, and
//! cooperative cancellation with a grace period.
//!
//! # Architecture
//!
//! - A fair semaphore caps concurrent workers at the configured ceiling;
//!   queued tasks start in submission order.
//! - Each task runs an explicit attempt loop: one timeout per attempt and a
//!   deterministic exponential backoff computed from the attempt count
//!   alone.
//! - The supervisor event loop is the single writer of the task-status
//!   table. Workers report transitions over a channel; the loop applies
//!   them and forwards each one to the progress sink.
//! - One task's failure never aborts its siblings. The supervisor itself
//!   never fails the run; the controller decides what surviving outcomes
//!   mean.

use crate::run::{CancelToken, ProgressEvent, ProgressSink, RunContext};
use crate::types::{EngineError, EvidenceNote, ResearchTask, RunStage, TaskId, TaskStatus};
use crate::worker::ResearchWorker;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Final outcome of one task after supervision.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    /// Terminal status of the task.
    pub status: TaskStatus,
    /// Attempts consumed.
    pub attempts: u32,
    /// Evidence collected on the successful attempt, in emission order.
    pub notes: Vec<EvidenceNote>,
    /// Failure reason, when the task did not succeed.
    pub error: Option<String>,
}

/// Status transition reported by a running task to the supervisor loop.
struct Transition {
    task_id: TaskId,
    status: TaskStatus,
    attempts: u32,
}

/// Result returned by a task's attempt loop.
struct TaskDone {
    task_id: TaskId,
    outcome: TaskOutcome,
}

/// How the supervision loop ended.
#[derive(Clone, Copy)]
enum Ending {
    Completed,
    Deadline,
    Cancelled,
}

/// Deterministic backoff before retrying after `attempt` failed attempts:
/// base * 2^(attempt - 1). Monotonically increasing.
pub fn backoff_for_attempt(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent)
}

/// Supervises a bounded pool of research workers.
#[derive(Clone)]
pub struct Supervisor {
    worker: ResearchWorker,
}

impl Supervisor {
    /// Create a supervisor dispatching work to clones of `worker`.
    pub fn new(worker: ResearchWorker) -> Self {
        Self { worker }
    }

    /// Run every task to a terminal status, or until the run deadline or a
    /// cancellation ends supervision early.
    ///
    /// Returns one [`TaskOutcome`] per task. Results collected before a
    /// deadline or cancellation are never discarded. Final statuses and
    /// attempt counts are written back into `tasks`.
    pub async fn run(
        &self,
        tasks: &mut [ResearchTask],
        ctx: &RunContext,
        progress: &ProgressSink,
    ) -> BTreeMap<TaskId, TaskOutcome> {
        let mut outcomes: BTreeMap<TaskId, TaskOutcome> = BTreeMap::new();
        let mut table: BTreeMap<TaskId, (TaskStatus, u32)> = tasks
            .iter()
            .map(|task| (task.id, (TaskStatus::Pending, 0)))
            .collect();

        if tasks.is_empty() {
            return outcomes;
        }

        let semaphore = Arc::new(Semaphore::new(ctx.config.concurrency.max(1)));
        let (transitions_tx, mut transitions_rx) = mpsc::unbounded_channel::<Transition>();
        let mut join = JoinSet::new();

        for task in tasks.iter() {
            let semaphore = semaphore.clone();
            let worker = self.worker.clone();
            let cancel = ctx.cancel.clone();
            let transitions = transitions_tx.clone();
            let task = task.clone();
            let max_attempts = ctx.config.max_attempts.max(1);
            let task_timeout = ctx.config.task_timeout();
            let base_backoff = ctx.config.retry_base_backoff();

            join.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("supervisor semaphore never closes");
                run_attempts(worker, task, cancel, transitions, max_attempts, task_timeout, base_backoff)
                    .await
            });
        }
        drop(transitions_tx);

        let deadline = tokio::time::Instant::now() + ctx.config.run_deadline();

        let ending = loop {
            tokio::select! {
                biased;
                Some(transition) = transitions_rx.recv() => {
                    apply_transition(&mut table, progress, transition);
                }
                _ = ctx.cancel.cancelled() => break Ending::Cancelled,
                _ = tokio::time::sleep_until(deadline) => break Ending::Deadline,
                joined = join.join_next() => match joined {
                    Some(Ok(done)) => {
                        outcomes.insert(done.task_id, done.outcome);
                    }
                    Some(Err(err)) => {
                        tracing::error!(error = %err, "research worker task panicked");
                    }
                    None => break Ending::Completed,
                },
            }
        };

        match ending {
            Ending::Completed => {}
            Ending::Cancelled => {
                tracing::info!(
                    run = %ctx.run_id,
                    grace_ms = ctx.config.cancel_grace_ms,
                    "cancellation observed; draining in-flight tasks"
                );
                let grace_deadline = tokio::time::Instant::now() + ctx.config.cancel_grace();
                loop {
                    tokio::select! {
                        biased;
                        Some(transition) = transitions_rx.recv() => {
                            apply_transition(&mut table, progress, transition);
                        }
                        _ = tokio::time::sleep_until(grace_deadline) => break,
                        joined = join.join_next() => match joined {
                            Some(Ok(done)) => {
                                outcomes.insert(done.task_id, done.outcome);
                            }
                            Some(Err(_)) => {}
                            None => break,
                        },
                    }
                }
            }
            Ending::Deadline => {
                tracing::warn!(run = %ctx.run_id, "run deadline expired with tasks unresolved");
            }
        }

        // stop whatever is still in flight; results that completed before
        // the abort are still drained and kept
        join.abort_all();
        while let Some(joined) = join.join_next().await {
            if let Ok(done) = joined {
                outcomes.insert(done.task_id, done.outcome);
            }
        }
        while let Ok(transition) = transitions_rx.try_recv() {
            apply_transition(&mut table, progress, transition);
        }

        // tasks the abort caught mid-flight never reported an outcome
        for task in tasks.iter() {
            if outcomes.contains_key(&task.id) {
                continue;
            }
            let (status, reason) = match ending {
                Ending::Cancelled => (TaskStatus::Cancelled, "cancelled before completion"),
                Ending::Deadline => (TaskStatus::Failed, "run deadline exceeded"),
                Ending::Completed => (TaskStatus::Failed, "worker ended without an outcome"),
            };
            let attempts = table.get(&task.id).map(|(_, attempts)| *attempts).unwrap_or(0);
            outcomes.insert(
                task.id,
                TaskOutcome {
                    status,
                    attempts,
                    notes: Vec::new(),
                    error: Some(reason.to_string()),
                },
            );
            progress.emit(ProgressEvent::task(RunStage::Researching, task.id, status));
        }

        for task in tasks.iter_mut() {
            if let Some(outcome) = outcomes.get(&task.id) {
                task.status = outcome.status;
                task.attempts = outcome.attempts;
            }
        }

        outcomes
    }
}

/// Apply one transition to the status table and forward it downstream.
/// Called only from the supervisor loop, keeping the table single-writer.
fn apply_transition(
    table: &mut BTreeMap<TaskId, (TaskStatus, u32)>,
    progress: &ProgressSink,
    transition: Transition,
) {
    table.insert(transition.task_id, (transition.status, transition.attempts));
    progress.emit(ProgressEvent::task(
        RunStage::Researching,
        transition.task_id,
        transition.status,
    ));
}

/// Explicit attempt loop for one task. The task id stays stable across
/// attempts; only the attempt counter advances.
async fn run_attempts(
    worker: ResearchWorker,
    task: ResearchTask,
    cancel: CancelToken,
    transitions: mpsc::UnboundedSender<Transition>,
    max_attempts: u32,
    task_timeout: Duration,
    base_backoff: Duration,
) -> TaskDone {
    let mut attempts = 0;
    let mut last_error = String::new();

    while attempts < max_attempts {
        if cancel.is_cancelled() {
            let _ = transitions.send(Transition {
                task_id: task.id,
                status: TaskStatus::Cancelled,
                attempts,
            });
            return TaskDone {
                task_id: task.id,
                outcome: TaskOutcome {
                    status: TaskStatus::Cancelled,
                    attempts,
                    notes: Vec::new(),
                    error: Some("cancelled before dispatch".to_string()),
                },
            };
        }

        attempts += 1;
        let _ = transitions.send(Transition {
            task_id: task.id,
            status: TaskStatus::Running,
            attempts,
        });

        match tokio::time::timeout(task_timeout, worker.execute(&task, &cancel)).await {
            Ok(Ok(notes)) => {
                let _ = transitions.send(Transition {
                    task_id: task.id,
                    status: TaskStatus::Succeeded,
                    attempts,
                });
                return TaskDone {
                    task_id: task.id,
                    outcome: TaskOutcome {
                        status: TaskStatus::Succeeded,
                        attempts,
                        notes,
                        error: None,
                    },
                };
            }
            Ok(Err(EngineError::Cancelled)) => {
                let _ = transitions.send(Transition {
                    task_id: task.id,
                    status: TaskStatus::Cancelled,
                    attempts,
                });
                return TaskDone {
                    task_id: task.id,
                    outcome: TaskOutcome {
                        status: TaskStatus::Cancelled,
                        attempts,
                        notes: Vec::new(),
                        error: Some("cancelled mid-attempt".to_string()),
                    },
                };
            }
            Ok(Err(err)) => {
                last_error = err.to_string();
                tracing::warn!(
                    task = task.id,
                    attempt = attempts,
                    error = %last_error,
                    "task attempt failed"
                );
                if attempts < max_attempts {
                    let _ = transitions.send(Transition {
                        task_id: task.id,
                        status: TaskStatus::Pending,
                        attempts,
                    });
                }
            }
            Err(_elapsed) => {
                last_error = format!("attempt {attempts} timed out after {task_timeout:?}");
                tracing::warn!(task = task.id, attempt = attempts, "task attempt timed out");
                let _ = transitions.send(Transition {
                    task_id: task.id,
                    status: TaskStatus::TimedOut,
                    attempts,
                });
            }
        }

        if attempts < max_attempts {
            let backoff = backoff_for_attempt(base_backoff, attempts);
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = cancel.cancelled() => {
                    let _ = transitions.send(Transition {
                        task_id: task.id,
                        status: TaskStatus::Cancelled,
                        attempts,
                    });
                    return TaskDone {
                        task_id: task.id,
                        outcome: TaskOutcome {
                            status: TaskStatus::Cancelled,
                            attempts,
                            notes: Vec::new(),
                            error: Some("cancelled during retry backoff".to_string()),
                        },
                    };
                }
            }
        }
    }

    let _ = transitions.send(Transition {
        task_id: task.id,
        status: TaskStatus::Failed,
        attempts,
    });
    TaskDone {
        task_id: task.id,
        outcome: TaskOutcome {
            status: TaskStatus::Failed,
            attempts,
            notes: Vec::new(),
            error: Some(last_error),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_monotonic() {
        let base = Duration::from_millis(100);
        let mut previous = Duration::ZERO;
        for attempt in 1..=8 {
            let backoff = backoff_for_attempt(base, attempt);
            assert!(backoff > previous, "backoff must grow with attempts");
            previous = backoff;
        }
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff_for_attempt(base, 1), Duration::from_millis(250));
        assert_eq!(backoff_for_attempt(base, 2), Duration::from_millis(500));
        assert_eq!(backoff_for_attempt(base, 3), Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_exponent_is_capped() {
        let base = Duration::from_millis(1);
        // far past the cap; must not overflow
        let huge = backoff_for_attempt(base, 64);
        assert_eq!(huge, backoff_for_attempt(base, 17));
    }
}
