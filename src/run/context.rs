//! Per-run context threaded through every stage call.
//!
//! There is no process-wide run registry: everything a stage needs to know
//! about the run it belongs to (id, configuration, cancellation) travels
//! in a [`RunContext`].

use crate::config::EngineConfig;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Cooperative cancellation signal shared by a run's components.
///
/// Cancellation is observed, never forced: workers check the token between
/// retrievable units of work, the supervisor awaits it in its event loop.
#[derive(Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create an uncancelled token.
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once cancellation is signalled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // the sender lives as long as any token clone, so this only ends
        // on an actual cancellation
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a stage needs to know about the run it serves.
#[derive(Clone)]
pub struct RunContext {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Configuration snapshot for the run.
    pub config: EngineConfig,
    /// Cancellation signal for the run.
    pub cancel: CancelToken,
}

impl RunContext {
    /// Create a context for a fresh run.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            cancel: CancelToken::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_token_observes_signal() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());
        // awaiting after the fact resolves immediately
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancel_token_clones_share_signal() {
        let token = CancelToken::new();
        let clone = token.clone();

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_contexts_get_distinct_run_ids() {
        let a = RunContext::new(EngineConfig::default());
        let b = RunContext::new(EngineConfig::default());
        assert_ne!(a.run_id, b.run_id);
    }
}
