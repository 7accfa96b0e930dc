//! Report Synthesizer
//!
//! Renders aggregated evidence into the final report: one section per
//! sub-question (per goal in quick mode), bodies generated through the
//! injected [`GenerationProvider`], citations resolved from the bracketed
//! evidence markers the prompt asks the model to use.
//!
//! Sub-questions without evidence still get a section carrying an explicit
//! insufficient-evidence note; a per-section provider failure degrades to a
//! deterministic extractive body instead of failing the run.

use crate::aggregate::{AggregatedEvidence, Conflict, EvidenceGroup};
use crate::providers::GenerationProvider;
use crate::types::{
    EngineError, Report, ReportMetadata, ReportSection, ReportStatus, ResearchBrief, Result,
};

/// Body used for sub-questions that ended up without usable evidence.
const INSUFFICIENT_EVIDENCE: &str =
    "Insufficient evidence: no usable sources were retrieved for this question.";

/// Synthesize the report for a run.
///
/// # Errors
///
/// Returns [`EngineError::Synthesis`] only when no section at all can be
/// produced; per-section generation failures fall back to extractive
/// bodies.
pub async fn synthesize(
    brief: &ResearchBrief,
    aggregated: &AggregatedEvidence,
    generator: &dyn GenerationProvider,
) -> Result<Report> {
    let mut sections = Vec::new();

    for group in &aggregated.groups {
        if group.is_gap() {
            sections.push(ReportSection {
                heading: group.sub_question.clone(),
                body: INSUFFICIENT_EVIDENCE.to_string(),
                cited_sources: Vec::new(),
            });
            continue;
        }
        sections.push(render_section(brief, group, &aggregated.conflicts, generator).await);
    }

    if sections.is_empty() {
        return Err(EngineError::Synthesis(
            "no sections could be produced".to_string(),
        ));
    }

    let status = if aggregated.has_gaps() || !aggregated.conflicts.is_empty() {
        ReportStatus::Partial
    } else {
        ReportStatus::Complete
    };

    let word_count = sections
        .iter()
        .map(|section| section.body.split_whitespace().count())
        .sum();
    let mut distinct_sources: Vec<&String> = Vec::new();
    for section in &sections {
        for source in &section.cited_sources {
            if !distinct_sources.contains(&source) {
                distinct_sources.push(source);
            }
        }
    }

    let source_count = distinct_sources.len();

    Ok(Report {
        title: format!("Research Report: {}", brief.goal),
        sections,
        metadata: ReportMetadata {
            word_count,
            source_count,
            duration_ms: 0, // stamped by the run controller
        },
        status,
    })
}

/// Render one evidence-backed section.
async fn render_section(
    brief: &ResearchBrief,
    group: &EvidenceGroup,
    conflicts: &[Conflict],
    generator: &dyn GenerationProvider,
) -> ReportSection {
    let prompt = section_prompt(group);
    let constraints: Vec<String> = brief.constraints.iter().cloned().collect();

    let mut body = match generator.complete(&prompt, &constraints).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            tracing::warn!(
                sub_question = %group.sub_question,
                "generator returned empty body; using extractive fallback"
            );
            extractive_body(group)
        }
        Err(err) => {
            tracing::warn!(
                sub_question = %group.sub_question,
                error = %err,
                "generation failed; using extractive fallback"
            );
            extractive_body(group)
        }
    };

    if let Some(paragraph) = conflict_paragraph(group, conflicts) {
        body.push_str("\n\n");
        body.push_str(&paragraph);
    }

    let cited_sources = cited_sources(&body, group);
    ReportSection {
        heading: group.sub_question.clone(),
        body,
        cited_sources,
    }
}

/// Prompt asking the generator to answer from numbered evidence only,
/// citing with bracketed markers.
fn section_prompt(group: &EvidenceGroup) -> String {
    let mut prompt = String::from(
        "Write a concise, well-structured answer to the question below, \
         using only the numbered evidence. Cite evidence inline with its \
         bracketed number, e.g. [2].\n\n",
    );
    prompt.push_str(&format!("Question: {}\n\nEvidence:\n", group.sub_question));
    for (index, retained) in group.notes.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] ({}) {}\n",
            index + 1,
            retained.note.source_url,
            retained.note.snippet
        ));
    }
    prompt
}

/// Deterministic fallback body: the retained snippets as a cited list.
fn extractive_body(group: &EvidenceGroup) -> String {
    let mut body = String::from("Key evidence:\n");
    for (index, retained) in group.notes.iter().enumerate() {
        body.push_str(&format!("- {} [{}]\n", retained.note.snippet, index + 1));
    }
    body.trim_end().to_string()
}

/// One line per conflicting claim, citing the disagreeing notes so the
/// reader sees both operands.
fn conflict_paragraph(group: &EvidenceGroup, conflicts: &[Conflict]) -> Option<String> {
    let relevant: Vec<&Conflict> = conflicts
        .iter()
        .filter(|conflict| conflict.sub_question == group.sub_question)
        .collect();
    if relevant.is_empty() {
        return None;
    }

    let mut lines = vec!["Conflicting figures across sources:".to_string()];
    for conflict in relevant {
        let markers: Vec<String> = conflict
            .notes
            .iter()
            .filter_map(|note| {
                group
                    .notes
                    .iter()
                    .position(|retained| retained.note.content_hash == note.note.content_hash)
                    .map(|index| format!("[{}]", index + 1))
            })
            .collect();
        lines.push(format!(
            "- sources disagree on '{}' ({})",
            conflict.claim,
            markers.join(", ")
        ));
    }
    Some(lines.join("\n"))
}

/// Sources actually referenced in the body: every note whose marker appears
/// contributes all of its citations, in marker order.
fn cited_sources(body: &str, group: &EvidenceGroup) -> Vec<String> {
    let mut cited = Vec::new();
    for (index, retained) in group.notes.iter().enumerate() {
        let marker = format!("[{}]", index + 1);
        if body.contains(&marker) {
            for url in &retained.citations {
                if !cited.contains(url) {
                    cited.push(url.clone());
                }
            }
        }
    }
    cited
}
