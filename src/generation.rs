//! Content generation
//!
//! [`ContentGenerator`] turns gathered facts into section text. The improvement loop
//! passes [`Feedback`] on regeneration so the generator can concentrate on the criteria
//! that failed.

use crate::error::GenerationError;
use crate::phase::Phase;
use crate::types::FactSheet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// One criterion that scored below the pass threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionGap {
    pub criterion: String,
    pub score: f64,
    pub target: f64,
}

/// Targeted guidance for a regeneration attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Generation attempt this feedback is for (2 = first retry)
    pub attempt: u32,
    /// Failing criteria, worst first
    pub failing_criteria: Vec<CriterionGap>,
    pub previous_score: f64,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_draft: Option<String>,
}

impl Feedback {
    pub fn criteria(&self) -> Vec<&str> {
        self.failing_criteria
            .iter()
            .map(|g| g.criterion.as_str())
            .collect()
    }

    pub fn mentions(&self, criterion: &str) -> bool {
        self.failing_criteria.iter().any(|g| g.criterion == criterion)
    }

    /// Plain-language instructions for model-backed generators.
    pub fn instructions(&self) -> String {
        let mut out = format!(
            "The previous draft scored {:.0}/100; {:.0} is required. Improve these criteria:\n",
            self.previous_score, self.threshold
        );
        for gap in &self.failing_criteria {
            let hint = match gap.criterion.as_str() {
                "completeness" => "cover every expected subsection in more depth",
                "structure" => "use the expected markdown headings and short paragraphs",
                "relevance" => "reference the project's actual names, languages and dependencies",
                "grammar" => "write complete sentences with consistent punctuation",
                _ => "address this criterion directly",
            };
            let _ = writeln!(
                out,
                "- {} scored {:.0} (target {:.0}): {}",
                gap.criterion, gap.score, gap.target, hint
            );
        }
        out
    }
}

/// Produces draft text for one phase's section.
pub trait ContentGenerator {
    fn generate_content(
        &self,
        phase: &Phase,
        facts: &FactSheet,
        feedback: Option<&Feedback>,
    ) -> Result<String, GenerationError>;
}

/// Deterministic, offline generator that renders markdown straight from facts.
///
/// The first draft is a compact digest. Feedback widens it: `completeness` adds prose
/// per subsection, `structure` adds a summary list, `relevance` weaves in the published
/// highlights, `grammar` normalizes sentence punctuation.
#[derive(Debug, Clone, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }

    fn project_name(facts: &FactSheet) -> String {
        ["manifest_scan.project_name", "docs_probe.readme_title"]
            .iter()
            .find_map(|path| facts.lookup(path).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| "This project".to_string())
    }

    fn intro(phase: &Phase, facts: &FactSheet) -> String {
        let name = Self::project_name(facts);
        let mut intro = format!("{} {} section.", name, phase.title().to_lowercase());
        if let Some(summary) = facts
            .lookup("docs_probe.readme_summary")
            .or_else(|| facts.lookup("manifest_scan.description"))
            .and_then(Value::as_str)
        {
            intro = format!("{} {}", intro, sentence(summary));
        }
        intro
    }

    fn digest(phase: &Phase, facts: &FactSheet, limit: usize) -> Vec<String> {
        let mut lines = Vec::new();
        for tool in &phase.required_tools {
            match facts.get(tool) {
                Some(Value::Object(map)) => {
                    for (key, value) in map {
                        if key == crate::types::HIGHLIGHTS_KEY {
                            continue;
                        }
                        if let Some(text) = describe(value) {
                            lines.push(format!("- **{}**: {}", humanize(key), text));
                        }
                        if lines.len() >= limit {
                            return lines;
                        }
                    }
                }
                Some(other) => {
                    if let Some(text) = describe(other) {
                        lines.push(format!("- **{}**: {}", humanize(tool), text));
                    }
                }
                None => {
                    if let Some(reason) = facts.gaps().get(tool) {
                        lines.push(format!("- **{}**: unavailable ({})", humanize(tool), reason));
                    }
                }
            }
        }
        lines
    }

    fn subsection_prose(subsection: &str, phase: &Phase, facts: &FactSheet) -> String {
        let name = Self::project_name(facts);
        let highlights = facts.highlights();
        let terms = if highlights.is_empty() {
            "its main components".to_string()
        } else {
            highlights
                .iter()
                .take(6)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "The {} part of the {} documentation describes how {} is organized. \
             It draws on the {} analysis and refers to {}. \
             Readers should use this part to orient themselves before reading the code.",
            subsection.to_lowercase(),
            phase.title().to_lowercase(),
            name,
            phase.required_tools.join(" and ").replace('_', " "),
            terms
        )
    }
}

impl ContentGenerator for TemplateGenerator {
    fn generate_content(
        &self,
        phase: &Phase,
        facts: &FactSheet,
        feedback: Option<&Feedback>,
    ) -> Result<String, GenerationError> {
        let expand = |criterion: &str| feedback.map(|f| f.mentions(criterion)).unwrap_or(false);
        let detail = if expand("completeness") { 24 } else { 8 };

        let mut out = String::new();
        let _ = writeln!(out, "## {}\n", phase.title());
        let _ = writeln!(out, "{}\n", Self::intro(phase, facts));

        let digest = Self::digest(phase, facts, detail);
        let subsections: Vec<String> = if phase.expected_subsections.is_empty() {
            vec!["Details".to_string()]
        } else {
            phase.expected_subsections.clone()
        };
        let per_section = digest.len().div_ceil(subsections.len()).max(1);

        for (index, subsection) in subsections.iter().enumerate() {
            let _ = writeln!(out, "### {}\n", subsection);
            if expand("completeness") {
                let _ = writeln!(out, "{}\n", Self::subsection_prose(subsection, phase, facts));
            }
            let chunk: Vec<&String> = digest
                .iter()
                .skip(index * per_section)
                .take(per_section)
                .collect();
            if chunk.is_empty() {
                let _ = writeln!(out, "No additional facts were gathered for this part.\n");
            } else {
                for line in chunk {
                    let _ = writeln!(out, "{}", line);
                }
                out.push('\n');
            }
        }

        if expand("relevance") {
            let highlights = facts.highlights();
            if !highlights.is_empty() {
                let _ = writeln!(
                    out,
                    "Key terms in this repository include {}.\n",
                    highlights.join(", ")
                );
            }
        }

        if expand("structure") {
            let _ = writeln!(out, "### Summary\n");
            for subsection in &subsections {
                let _ = writeln!(out, "- {} is covered above.", subsection);
            }
            out.push('\n');
        }

        let text = if expand("grammar") {
            normalize_sentences(&out)
        } else {
            out
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::EmptyDraft(phase.section().to_string()));
        }
        Ok(text)
    }
}

/// Render a fact value as a short phrase; `None` for empty or nested values.
pub(crate) fn describe(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "yes" } else { "no" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .take(8)
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Object(map) => map
                        .get("path")
                        .or_else(|| map.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                None
            } else if items.len() > parts.len() {
                Some(format!("{} (and {} more)", parts.join(", "), items.len() - parts.len()))
            } else {
                Some(parts.join(", "))
            }
        }
        Value::Object(map) if map.is_empty() => None,
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .take(8)
                .filter_map(|(k, v)| match v {
                    Value::Number(n) => Some(format!("{} {}", k, n)),
                    Value::String(s) => Some(format!("{} {}", k, s)),
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
    }
}

pub(crate) fn humanize(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}

fn sentence(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let mut out = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => return String::new(),
    };
    if !out.ends_with(['.', '!', '?']) {
        out.push('.');
    }
    out
}

/// Capitalize and terminate prose lines; headings and list items are left alone.
fn normalize_sentences(text: &str) -> String {
    text.lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('-') {
                line.to_string()
            } else {
                sentence(trimmed)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
