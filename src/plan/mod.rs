//! Task Planner
//!
//! Decomposes a brief into independent research tasks. Pure: no I/O, and
//! ids are assigned by sequential index, so planning the same brief twice
//! yields identical tasks.

use crate::types::{EngineError, Mode, ResearchBrief, ResearchTask, Result};

/// Plan research tasks from a brief.
///
/// Deep mode creates one task per sub-question; quick mode creates a single
/// task covering the whole goal.
///
/// # Errors
///
/// Returns [`EngineError::Planning`] if the brief has no sub-questions.
pub fn plan(brief: &ResearchBrief, mode: Mode) -> Result<Vec<ResearchTask>> {
    if brief.sub_questions.is_empty() {
        return Err(EngineError::Planning(
            "brief contains no sub-questions".to_string(),
        ));
    }

    let tasks = match mode {
        Mode::Quick => vec![ResearchTask::new(0, brief.goal.clone())],
        Mode::Deep => brief
            .sub_questions
            .iter()
            .enumerate()
            .map(|(index, sub_question)| ResearchTask::new(index as u32, sub_question.clone()))
            .collect(),
    };

    tracing::debug!(mode = ?mode, tasks = tasks.len(), "brief planned");
    Ok(tasks)
}
