//! Preset templates applied during scoping.
//!
//! A preset contributes constraints and one extra research facet. It never
//! overrides the caller's core goal.

use crate::types::Preset;

/// Template contributed by a preset.
pub(crate) struct PresetTemplate {
    /// Constraints added to the brief.
    pub constraints: &'static [&'static str],
    /// Extra sub-question facet; `{topic}` is replaced with the goal.
    pub facet: &'static str,
}

pub(crate) fn template(preset: Preset) -> PresetTemplate {
    match preset {
        Preset::Academic => PresetTemplate {
            constraints: &[
                "prefer peer-reviewed and primary sources",
                "note methodology and sample sizes where available",
            ],
            facet: "What does the academic literature say about {topic}?",
        },
        Preset::Market => PresetTemplate {
            constraints: &[
                "prefer recent industry and market data",
                "quantify market size and growth where possible",
            ],
            facet: "What is the market landscape and who are the key players for {topic}?",
        },
    }
}
