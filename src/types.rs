//! Shared value types passed between the scheduler components.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Handle to an already-acquired repository checkout.
///
/// Acquisition (cloning, fetching) belongs to the host; the scheduler only passes the
/// handle through to analysis tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    pub name: String,
    pub root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl RepositoryHandle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "repository".to_string());
        Self {
            name,
            root,
            revision: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Facts gathered by analysis tools during one invocation.
///
/// Each tool contributes one JSON value under its own name. Failed tools are recorded
/// as gaps so later stages can tell "no data" from "tool broke".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactSheet {
    facts: BTreeMap<String, Value>,
    gaps: BTreeMap<String, String>,
}

/// Key under which tools publish salient terms used for relevance scoring.
pub const HIGHLIGHTS_KEY: &str = "highlights";

impl FactSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tool: impl Into<String>, facts: Value) {
        let tool = tool.into();
        self.gaps.remove(&tool);
        self.facts.insert(tool, facts);
    }

    pub fn record_gap(&mut self, tool: impl Into<String>, reason: impl Into<String>) {
        self.gaps.insert(tool.into(), reason.into());
    }

    /// True once the tool has been attempted, successfully or not.
    pub fn has_attempted(&self, tool: &str) -> bool {
        self.facts.contains_key(tool) || self.gaps.contains_key(tool)
    }

    pub fn get(&self, tool: &str) -> Option<&Value> {
        self.facts.get(tool)
    }

    /// Resolve a dotted path such as `file_inventory.source_files`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let tool = parts.next()?;
        let mut current = self.facts.get(tool)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// True when the path resolves to something other than null, zero, or an empty
    /// string/array/object.
    pub fn is_present(&self, path: &str) -> bool {
        match self.lookup(path) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    pub fn facts(&self) -> &BTreeMap<String, Value> {
        &self.facts
    }

    pub fn gaps(&self) -> &BTreeMap<String, String> {
        &self.gaps
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Salient terms published by tools under `highlights`, deduplicated and sorted.
    pub fn highlights(&self) -> Vec<String> {
        let mut terms = BTreeSet::new();
        for value in self.facts.values() {
            if let Some(Value::Array(items)) = value.get(HIGHLIGHTS_KEY) {
                for item in items {
                    if let Some(term) = item.as_str() {
                        let term = term.trim();
                        if !term.is_empty() {
                            terms.insert(term.to_string());
                        }
                    }
                }
            }
        }
        terms.into_iter().collect()
    }

    /// Facts restricted to the given tools, for handing to a generator.
    pub fn subset(&self, tools: &[String]) -> FactSheet {
        let mut subset = FactSheet::new();
        for tool in tools {
            if let Some(value) = self.facts.get(tool) {
                subset.facts.insert(tool.clone(), value.clone());
            }
            if let Some(reason) = self.gaps.get(tool) {
                subset.gaps.insert(tool.clone(), reason.clone());
            }
        }
        subset
    }
}

/// Generated, not-yet-validated text for one documentation section.
///
/// Regeneration produces a new value via [`DraftContent::supersede`]; earlier attempts
/// stay in the improvement loop's history untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftContent {
    pub section: String,
    pub text: String,
    pub source_phase: String,
    pub generation_attempt: u32,
}

impl DraftContent {
    pub fn new(section: impl Into<String>, source_phase: impl Into<String>, text: String) -> Self {
        Self {
            section: section.into(),
            text,
            source_phase: source_phase.into(),
            generation_attempt: 1,
        }
    }

    pub fn supersede(&self, text: String) -> DraftContent {
        DraftContent {
            section: self.section.clone(),
            text,
            source_phase: self.source_phase.clone(),
            generation_attempt: self.generation_attempt + 1,
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Minimum acceptable content quality achieved. Ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Fallback,
    Basic,
    Medium,
    High,
}

impl QualityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::Fallback => "fallback",
            QualityTier::Basic => "basic",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Some(QualityTier::Fallback),
            "basic" => Some(QualityTier::Basic),
            "medium" => Some(QualityTier::Medium),
            "high" => Some(QualityTier::High),
            _ => None,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trust placed in an aligned score, derived from how far the raw inputs diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
