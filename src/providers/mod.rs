//! Capability interfaces for the external providers the engine supervises.
//!
//! The engine never performs retrieval or text generation itself; both
//! capabilities are injected behind the traits below, so any backend (or a
//! stub in tests) can stand in without touching core logic.

use crate::types::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A single result returned by the external search capability, in relevance
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Source url of the result.
    pub url: String,
    /// Short extract of the matching content.
    pub snippet: String,
    /// Full page content, when the provider supplies it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
}

impl SearchHit {
    /// Convenience constructor for a url + snippet hit.
    pub fn new(url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            snippet: snippet.into(),
            raw_content: None,
        }
    }
}

/// External search capability.
///
/// Implementations fail with [`EngineError::Provider`] on transport or
/// quota errors.
///
/// [`EngineError::Provider`]: crate::types::EngineError::Provider
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one search query, returning hits in relevance order.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// External summarization/generation capability.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Produce a completion for `prompt` under the given constraints.
    async fn complete(&self, prompt: &str, constraints: &[String]) -> Result<String>;
}

/// Shared throttle bounding concurrent calls to the external search
/// provider.
///
/// Sized independently of the worker concurrency ceiling: provider rate
/// limits are typically lower than the parallelism we want from workers.
/// The semaphore is fair, so waiting workers are served in arrival order.
pub struct SearchThrottle {
    semaphore: Arc<Semaphore>,
}

impl SearchThrottle {
    /// Create a throttle with the given number of tickets (minimum 1).
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    /// Acquire a ticket before calling the provider. The ticket is released
    /// when the guard drops.
    pub async fn acquire(&self) -> ThrottleTicket {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("throttle semaphore never closes");
        ThrottleTicket { _permit: permit }
    }

    /// Tickets currently available.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Guard holding one throttle ticket.
pub struct ThrottleTicket {
    _permit: OwnedSemaphorePermit,
}
