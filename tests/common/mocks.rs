//! Mock providers for testing.
//!
//! Stub implementations of the engine's capability seams that can be shared
//! across test files without duplication. Behavior is scripted per query
//! substring, so multi-task runs can route each sub-question differently.

// not every test binary exercises every stub
#![allow(dead_code)]

use argos::{EngineError, GenerationProvider, Result, SearchHit, SearchProvider};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a [`StubSearch`] does for a matching query.
#[derive(Clone)]
pub enum SearchBehavior {
    /// Return these hits.
    Hits(Vec<SearchHit>),
    /// Fail with a provider error.
    Fail,
    /// Sleep long enough to trip any reasonable timeout.
    Hang,
    /// Sleep, then return these hits.
    Delay(Duration, Vec<SearchHit>),
    /// Fail the first N calls to this rule, then return these hits.
    FlakyUntil(usize, Vec<SearchHit>),
}

struct SearchRule {
    matcher: Option<String>,
    behavior: SearchBehavior,
    calls: AtomicUsize,
}

/// Scripted search provider.
///
/// Rules are checked in registration order against a query substring; the
/// first match wins. A rule with no matcher is the default.
pub struct StubSearch {
    rules: Vec<SearchRule>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for StubSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl StubSearch {
    /// A provider that always returns the same hits.
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self::new().rule_default(SearchBehavior::Hits(hits))
    }

    /// A provider that always fails.
    pub fn failing() -> Self {
        Self::new().rule_default(SearchBehavior::Fail)
    }

    /// An empty provider; add rules with the builder methods.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add a rule applied to queries containing `matcher`.
    pub fn rule(mut self, matcher: &str, behavior: SearchBehavior) -> Self {
        self.rules.push(SearchRule {
            matcher: Some(matcher.to_string()),
            behavior,
            calls: AtomicUsize::new(0),
        });
        self
    }

    /// Add the fallback rule for queries no other rule matches.
    pub fn rule_default(mut self, behavior: SearchBehavior) -> Self {
        self.rules.push(SearchRule {
            matcher: None,
            behavior,
            calls: AtomicUsize::new(0),
        });
        self
    }

    /// Total search calls observed.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Highest number of concurrently executing search calls observed.
    pub fn max_in_flight(&self) -> Arc<AtomicUsize> {
        self.max_in_flight.clone()
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight
            .fetch_max(now_in_flight, Ordering::SeqCst);

        let result = self.dispatch(query).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl StubSearch {
    async fn dispatch(&self, query: &str) -> Result<Vec<SearchHit>> {
        let rule = self.rules.iter().find(|rule| match &rule.matcher {
            Some(matcher) => query.contains(matcher),
            None => true,
        });
        let Some(rule) = rule else {
            return Ok(Vec::new());
        };

        let call = rule.calls.fetch_add(1, Ordering::SeqCst);
        match &rule.behavior {
            SearchBehavior::Hits(hits) => Ok(hits.clone()),
            SearchBehavior::Fail => Err(EngineError::Provider(
                "stub search transport failure".to_string(),
            )),
            SearchBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            SearchBehavior::Delay(delay, hits) => {
                tokio::time::sleep(*delay).await;
                Ok(hits.clone())
            }
            SearchBehavior::FlakyUntil(failures, hits) => {
                if call < *failures {
                    Err(EngineError::Provider(format!(
                        "stub search flaky failure {call}"
                    )))
                } else {
                    Ok(hits.clone())
                }
            }
        }
    }
}

/// Scripted generation provider.
pub struct StubGenerator {
    response: Option<String>,
    cite_all_markers: bool,
    calls: Arc<AtomicUsize>,
}

impl StubGenerator {
    /// Return the same body for every section.
    pub fn with_response(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            cite_all_markers: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Echo every `[n]` evidence marker found in the prompt, so each
    /// section cites all of its evidence.
    pub fn citing_all() -> Self {
        Self {
            response: None,
            cite_all_markers: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always fail.
    pub fn failing() -> Self {
        Self {
            response: None,
            cite_all_markers: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Total generation calls observed.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl GenerationProvider for StubGenerator {
    async fn complete(&self, prompt: &str, _constraints: &[String]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.cite_all_markers {
            let mut markers = Vec::new();
            let mut index = 1;
            while prompt.contains(&format!("[{index}]")) {
                markers.push(format!("[{index}]"));
                index += 1;
            }
            return Ok(format!(
                "Synthesized answer drawing on the available evidence {}.",
                markers.join(" ")
            ));
        }

        match &self.response {
            Some(text) => Ok(text.clone()),
            None => Err(EngineError::Provider("stub generator offline".to_string())),
        }
    }
}

/// A hit pointing at a unique url with the given snippet.
pub fn hit(url: &str, snippet: &str) -> SearchHit {
    SearchHit::new(url, snippet)
}
