//! Tiered Fallback
//!
//! Turns a section outcome into publishable text. Sections whose best draft never
//! reached `basic` get a templated skeleton built from whatever facts were gathered,
//! tagged with [`LOW_CONFIDENCE_MARKER`]. Output is never empty.

use crate::generation::{describe, humanize};
use crate::improvement::SectionOutcome;
use crate::phase::Phase;
use crate::types::{Confidence, FactSheet, QualityTier, HIGHLIGHTS_KEY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use tracing::warn;

/// Marker embedded in every skeleton so downstream consumers can spot it.
pub const LOW_CONFIDENCE_MARKER: &str = "<!-- docpace: tier=fallback confidence=low -->";

/// Facts listed per tool in a skeleton.
const MAX_FACTS_PER_TOOL: usize = 12;

/// A section ready for the analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSection {
    pub section: String,
    pub phase: String,
    pub text: String,
    pub tier: QualityTier,
    pub confidence: Confidence,
    pub is_fallback: bool,
}

/// Build the skeleton for `phase` from gathered facts and gaps.
pub fn skeleton(phase: &Phase, facts: &FactSheet, reason: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", LOW_CONFIDENCE_MARKER);
    let _ = writeln!(out, "## {}\n", phase.title());
    let _ = writeln!(
        out,
        "> Generated from gathered facts only ({}). Review before relying on it.\n",
        reason
    );

    let tools: Vec<&String> = if phase.required_tools.is_empty() {
        facts.facts().keys().collect()
    } else {
        phase.required_tools.iter().collect()
    };

    let _ = writeln!(out, "### Gathered facts\n");
    let mut listed = 0;
    for tool in &tools {
        let Some(value) = facts.get(tool) else {
            continue;
        };
        let _ = writeln!(out, "**{}**\n", humanize(tool));
        match value {
            Value::Object(map) => {
                for (key, fact) in map
                    .iter()
                    .filter(|(k, _)| k.as_str() != HIGHLIGHTS_KEY)
                    .take(MAX_FACTS_PER_TOOL)
                {
                    if let Some(text) = describe(fact) {
                        let _ = writeln!(out, "- {}: {}", humanize(key), text);
                        listed += 1;
                    }
                }
            }
            other => {
                if let Some(text) = describe(other) {
                    let _ = writeln!(out, "- {}", text);
                    listed += 1;
                }
            }
        }
        out.push('\n');
    }
    if listed == 0 {
        let _ = writeln!(out, "No facts could be gathered for this section.\n");
    }

    let gaps: Vec<(&String, &String)> = facts
        .gaps()
        .iter()
        .filter(|(tool, _)| phase.required_tools.is_empty() || phase.required_tools.contains(tool))
        .collect();
    if !gaps.is_empty() {
        let _ = writeln!(out, "### Analysis gaps\n");
        for (tool, reason) in gaps {
            let _ = writeln!(out, "- {}: {}", humanize(tool), reason);
        }
        out.push('\n');
    }

    for subsection in &phase.expected_subsections {
        let _ = writeln!(out, "### {}\n\n_Not yet documented._\n", subsection);
    }

    out.trim_end().to_string()
}

/// Chooses between a section's draft and its skeleton.
#[derive(Debug, Clone, Default)]
pub struct TieredFallback;

impl TieredFallback {
    pub fn new() -> Self {
        Self
    }

    pub fn finalize(&self, outcome: &SectionOutcome, phase: &Phase, facts: &FactSheet) -> FinalSection {
        match &outcome.draft {
            Some(draft) if outcome.tier >= QualityTier::Basic && !draft.text.trim().is_empty() => {
                FinalSection {
                    section: outcome.section.clone(),
                    phase: outcome.phase.clone(),
                    text: draft.text.clone(),
                    tier: outcome.tier,
                    confidence: outcome
                        .score
                        .as_ref()
                        .map(|s| s.confidence)
                        .unwrap_or(Confidence::Low),
                    is_fallback: false,
                }
            }
            _ => {
                let reason = match &outcome.score {
                    Some(score) => format!("best draft scored {:.1}", score.value),
                    None => "no draft was produced".to_string(),
                };
                warn!(section = %outcome.section, %reason, "Substituting fallback skeleton");
                self.substitute(phase, facts, &reason)
            }
        }
    }

    /// Skeleton for a phase that produced no outcome at all (e.g. below the floor).
    pub fn substitute(&self, phase: &Phase, facts: &FactSheet, reason: &str) -> FinalSection {
        FinalSection {
            section: phase.section().to_string(),
            phase: phase.name.clone(),
            text: skeleton(phase, facts, reason),
            tier: QualityTier::Fallback,
            confidence: Confidence::Low,
            is_fallback: true,
        }
    }
}
