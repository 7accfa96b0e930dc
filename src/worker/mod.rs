//! Research Worker
//!
//! Executes a single research task: formulates search queries from the
//! task's sub-question, invokes the shared search capability through the
//! global throttle, and condenses results into evidence notes.
//!
//! A worker holds no state beyond the capabilities it borrows and the task
//! it is given, and never talks to other workers. That statelessness is
//! what makes parallel execution and retries safe.

use crate::providers::{SearchHit, SearchProvider, SearchThrottle};
use crate::run::CancelToken;
use crate::types::{EngineError, EvidenceNote, ResearchTask, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

/// Upper bound on condensed snippet length, in characters.
const MAX_SNIPPET_CHARS: usize = 480;

/// Stateless executor for one research task at a time.
#[derive(Clone)]
pub struct ResearchWorker {
    search: Arc<dyn SearchProvider>,
    throttle: Arc<SearchThrottle>,
    max_notes: usize,
}

impl ResearchWorker {
    /// Create a worker over the shared search capability and throttle.
    pub fn new(
        search: Arc<dyn SearchProvider>,
        throttle: Arc<SearchThrottle>,
        max_notes: usize,
    ) -> Self {
        Self {
            search,
            throttle,
            max_notes: max_notes.max(1),
        }
    }

    /// Queries are derived from the task alone: the sub-question verbatim,
    /// then an evidence-focused variant.
    fn queries(task: &ResearchTask) -> Vec<String> {
        vec![
            task.sub_question.clone(),
            format!("{} key figures and evidence", task.sub_question.trim_end_matches('?')),
        ]
    }

    /// Execute the task, producing at most the configured number of notes
    /// in provider relevance order.
    ///
    /// The cancellation signal is checked between search calls; an observed
    /// cancellation aborts with [`EngineError::Cancelled`]. An empty result
    /// set is success; the aggregator records it as a gap.
    pub async fn execute(
        &self,
        task: &ResearchTask,
        cancel: &CancelToken,
    ) -> Result<Vec<EvidenceNote>> {
        let mut notes = Vec::new();
        let mut seen_urls = HashSet::new();

        for query in Self::queries(task) {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if notes.len() >= self.max_notes {
                break;
            }

            let hits = {
                let _ticket = self.throttle.acquire().await;
                self.search.search(&query).await?
            };
            tracing::debug!(task = task.id, %query, hits = hits.len(), "search returned");

            for hit in hits {
                if notes.len() >= self.max_notes {
                    break;
                }
                if !seen_urls.insert(hit.url.clone()) {
                    continue;
                }
                match EvidenceNote::new(task.id, hit.url.clone(), condense(&hit), Utc::now()) {
                    Ok(note) => notes.push(note),
                    Err(_) => {
                        tracing::warn!(task = task.id, "dropping search hit without source url");
                    }
                }
            }
        }

        Ok(notes)
    }
}

/// Condense a hit into a snippet: prefer the provider's extract, fall back
/// to the raw content, normalize whitespace, and cap the length.
fn condense(hit: &SearchHit) -> String {
    let text = if hit.snippet.trim().is_empty() {
        hit.raw_content.as_deref().unwrap_or("")
    } else {
        &hit.snippet
    };
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_SNIPPET_CHARS)
        .collect()
}
