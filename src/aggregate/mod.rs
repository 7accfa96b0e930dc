//! Evidence Aggregator
//!
//! Merges every evidence note collected during a run into deduplicated,
//! conflict-annotated groups, one group per planned sub-question.
//!
//! The aggregator is a pure function of the run's tasks and outcomes:
//! aggregating the same inputs twice yields identical output, independent
//! of the order tasks happened to complete in.
//!
//! Policies:
//! - exact duplicates (identical `content_hash`) collapse globally, keeping
//!   the note with the earliest `retrieved_at` and merging citations;
//! - near-duplicates within a group (Jaccard word-set similarity at or
//!   above the threshold) merge into the more detailed snippet, recording
//!   both citations;
//! - numeric claims that disagree between retained notes of a group are
//!   flagged as conflicts, never silently dropped;
//! - a sub-question with no usable evidence keeps an empty group, an
//!   explicit gap rather than an omission.

use crate::supervisor::TaskOutcome;
use crate::types::{EvidenceNote, ResearchTask, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A retained note plus every source url backing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetainedNote {
    /// The representative note (earliest retrieval among duplicates, most
    /// detailed snippet among near-duplicates).
    pub note: EvidenceNote,
    /// Source urls in first-seen order; the first entry is the primary.
    pub citations: Vec<String>,
}

/// Deduplicated evidence for one sub-question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceGroup {
    /// The sub-question this group answers.
    pub sub_question: String,
    /// Retained notes in deterministic order.
    pub notes: Vec<RetainedNote>,
}

impl EvidenceGroup {
    /// Whether no usable evidence was retained for this sub-question.
    pub fn is_gap(&self) -> bool {
        self.notes.is_empty()
    }
}

/// Two or more retained notes asserting different values for the same
/// numeric claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// The sub-question the disagreement belongs to.
    pub sub_question: String,
    /// Normalized claim key, e.g. `"gw"` for "12 GW" vs "15 GW".
    pub claim: String,
    /// The disagreeing notes, all retained.
    pub notes: Vec<RetainedNote>,
}

/// Deduplicated, conflict-annotated evidence for a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEvidence {
    /// One group per planned sub-question, in plan order.
    pub groups: Vec<EvidenceGroup>,
    /// Detected conflicts, in deterministic order.
    pub conflicts: Vec<Conflict>,
}

impl AggregatedEvidence {
    /// Whether any sub-question ended up without evidence.
    pub fn has_gaps(&self) -> bool {
        self.groups.iter().any(EvidenceGroup::is_gap)
    }
}

/// Aggregate the evidence of a finished research stage.
pub fn aggregate(
    tasks: &[ResearchTask],
    outcomes: &BTreeMap<TaskId, TaskOutcome>,
    similarity_threshold: f64,
) -> AggregatedEvidence {
    // exact dedup across the whole run, first-seen order
    let mut retained: Vec<RetainedNote> = Vec::new();
    let mut index_by_hash: HashMap<String, usize> = HashMap::new();

    for task in tasks {
        let Some(outcome) = outcomes.get(&task.id) else {
            continue;
        };
        if outcome.status != TaskStatus::Succeeded {
            continue;
        }
        for note in &outcome.notes {
            match index_by_hash.get(&note.content_hash) {
                Some(&index) => {
                    let existing = &mut retained[index];
                    if note.retrieved_at < existing.note.retrieved_at {
                        existing.note = note.clone();
                    }
                    if !existing.citations.contains(&note.source_url) {
                        existing.citations.push(note.source_url.clone());
                    }
                }
                None => {
                    index_by_hash.insert(note.content_hash.clone(), retained.len());
                    retained.push(RetainedNote {
                        note: note.clone(),
                        citations: vec![note.source_url.clone()],
                    });
                }
            }
        }
    }

    // one group per planned sub-question, gaps preserved
    let mut groups: Vec<EvidenceGroup> = tasks
        .iter()
        .map(|task| EvidenceGroup {
            sub_question: task.sub_question.clone(),
            notes: Vec::new(),
        })
        .collect();
    let group_index: HashMap<TaskId, usize> = tasks
        .iter()
        .enumerate()
        .map(|(index, task)| (task.id, index))
        .collect();
    for retained_note in retained {
        if let Some(&index) = group_index.get(&retained_note.note.task_id) {
            groups[index].notes.push(retained_note);
        }
    }

    // near-duplicate merge within each group
    let duplicates_before: usize = groups.iter().map(|g| g.notes.len()).sum();
    for group in &mut groups {
        let candidates = std::mem::take(&mut group.notes);
        let mut merged: Vec<RetainedNote> = Vec::new();
        'candidates: for candidate in candidates {
            for existing in merged.iter_mut() {
                if similarity(&existing.note.snippet, &candidate.note.snippet)
                    >= similarity_threshold
                {
                    if candidate.note.snippet.len() > existing.note.snippet.len() {
                        existing.note = candidate.note.clone();
                    }
                    for url in candidate.citations {
                        if !existing.citations.contains(&url) {
                            existing.citations.push(url);
                        }
                    }
                    continue 'candidates;
                }
            }
            merged.push(candidate);
        }
        group.notes = merged;
    }
    let retained_after: usize = groups.iter().map(|g| g.notes.len()).sum();
    tracing::debug!(
        notes_in = duplicates_before,
        notes_retained = retained_after,
        "evidence deduplicated"
    );

    // conflicting numeric claims between retained notes of a group
    let mut conflicts = Vec::new();
    for group in &groups {
        let mut claims_by_key: BTreeMap<String, Vec<(String, usize)>> = BTreeMap::new();
        for (index, retained_note) in group.notes.iter().enumerate() {
            for (key, value) in numeric_claims(&retained_note.note.snippet) {
                let entry = claims_by_key.entry(key).or_default();
                if !entry.iter().any(|(v, i)| *i == index && *v == value) {
                    entry.push((value, index));
                }
            }
        }
        for (key, observations) in claims_by_key {
            let distinct_values: BTreeSet<&String> =
                observations.iter().map(|(value, _)| value).collect();
            let mut note_indexes: Vec<usize> =
                observations.iter().map(|(_, index)| *index).collect();
            note_indexes.sort_unstable();
            note_indexes.dedup();
            if distinct_values.len() > 1 && note_indexes.len() > 1 {
                conflicts.push(Conflict {
                    sub_question: group.sub_question.clone(),
                    claim: key,
                    notes: note_indexes
                        .into_iter()
                        .map(|index| group.notes[index].clone())
                        .collect(),
                });
            }
        }
    }

    AggregatedEvidence { groups, conflicts }
}

/// Jaccard similarity between the word sets of two snippets, in [0, 1].
pub(crate) fn similarity(a: &str, b: &str) -> f64 {
    let words_a = word_set(a);
    let words_b = word_set(b);
    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let shared = words_a.intersection(&words_b).count();
    let total = words_a.union(&words_b).count();
    shared as f64 / total as f64
}

fn word_set(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(normalize_word)
        .filter(|word| !word.is_empty())
        .collect()
}

fn normalize_word(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Extract numeric claims from a snippet as `(key, value)` pairs.
///
/// A value is a standalone number token (commas, currency and percent signs
/// stripped). Its key is the following word (usually the unit), falling
/// back to the preceding word, normalized. "reached 12 GW" yields
/// `("gw", "12")`.
fn numeric_claims(snippet: &str) -> Vec<(String, String)> {
    let tokens: Vec<&str> = snippet.split_whitespace().collect();
    let mut claims = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        let Some(value) = parse_number(token) else {
            continue;
        };

        let mut key = None;
        if let Some(next) = tokens.get(index + 1) {
            let word = normalize_word(next);
            if word.chars().any(|c| c.is_alphabetic()) {
                key = Some(word);
            }
        }
        if key.is_none() && index > 0 {
            let word = normalize_word(tokens[index - 1]);
            if word.chars().any(|c| c.is_alphabetic()) {
                key = Some(word);
            }
        }

        if let Some(key) = key {
            claims.push((key, value));
        }
    }

    claims
}

/// Parse a standalone number token into a normalized value string.
/// Tokens mixing digits and letters ("B-52", "v2") are not claims.
fn parse_number(token: &str) -> Option<String> {
    if !token.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if token.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse::<f64>().ok().map(|number| format!("{number}"))
}
