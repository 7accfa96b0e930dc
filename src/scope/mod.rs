//! Query Scoper
//!
//! Turns a raw [`ResearchRequest`] into a structured [`ResearchBrief`]:
//! the goal verbatim, ordered sub-questions derived from fixed facet
//! templates, and the constraint set the rest of the pipeline honors.
//!
//! Scoping is pure and deterministic: the same request and preset always
//! produce the same brief, which keeps runs reproducible in tests.

mod presets;

use crate::types::{EngineError, Mode, ResearchBrief, ResearchRequest, Result};
use std::collections::BTreeSet;

/// Core facet templates expanded into sub-questions for deep runs.
/// `{topic}` is replaced with the goal.
const CORE_FACETS: &[&str] = &[
    "What background and definitions are needed to understand {topic}?",
    "What are the current facts, figures, and developments for {topic}?",
    "What comparisons, trade-offs, or open debates surround {topic}?",
];

/// Scope a request into a research brief.
///
/// # Errors
///
/// Returns [`EngineError::Scoping`] if the question is empty or
/// unintelligible, or if a preset is combined with quick mode (presets add
/// sub-question scaffolding only deep mode plans from).
pub fn scope(request: &ResearchRequest) -> Result<ResearchBrief> {
    let goal = request.question.trim();
    if goal.is_empty() {
        return Err(EngineError::Scoping("question must not be empty".to_string()));
    }
    if !goal.chars().any(|c| c.is_alphabetic()) {
        return Err(EngineError::Scoping(format!(
            "question is unintelligible: {goal:?}"
        )));
    }
    if request.preset.is_some() && request.mode == Mode::Quick {
        return Err(EngineError::Scoping(
            "presets require deep mode".to_string(),
        ));
    }

    let mut constraints = BTreeSet::new();
    let mut sub_questions = match request.mode {
        Mode::Quick => vec![goal.to_string()],
        Mode::Deep => CORE_FACETS
            .iter()
            .map(|facet| facet.replace("{topic}", goal))
            .collect(),
    };

    if let Some(preset) = request.preset {
        let template = presets::template(preset);
        for constraint in template.constraints {
            constraints.insert((*constraint).to_string());
        }
        sub_questions.push(template.facet.replace("{topic}", goal));
    }

    if let Some(ref reference) = request.document_set_ref {
        constraints.insert(format!("consult document set '{}'", reference));
    }

    tracing::debug!(
        goal,
        sub_questions = sub_questions.len(),
        constraints = constraints.len(),
        "request scoped"
    );

    Ok(ResearchBrief {
        goal: goal.to_string(),
        sub_questions,
        constraints,
    })
}
