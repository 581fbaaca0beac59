//! Analysis phases and the ordered phase catalog.
//!
//! A phase is a discrete analysis stage with one documentation section as its goal.
//! Phases are defined at configuration time and never change during an invocation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// One analysis stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,

    /// Lower runs first; rank 1 is the baseline phase.
    pub priority_rank: u32,

    /// Section key this phase documents (defaults to the phase name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    /// Human-readable heading for the section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Analysis tools invoked to gather facts
    #[serde(default)]
    pub required_tools: Vec<String>,

    /// Minimum wall-clock seconds the phase is expected to need
    #[serde(default = "default_min_time_secs")]
    pub min_time_secs: u64,

    /// Subsection headings a complete section is expected to contain
    #[serde(default)]
    pub expected_subsections: Vec<String>,

    /// Minimum word count of a complete section
    #[serde(default)]
    pub min_words: usize,

    /// Dotted fact paths that must be present for the phase to be worth running
    #[serde(default)]
    pub requires_facts: Vec<String>,
}

fn default_min_time_secs() -> u64 {
    60
}

/// Scheduling class derived from the priority rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTier {
    /// Rank 1: always scheduled above the absolute floor
    Baseline,
    /// Rank 2: scheduled while time is GOOD or CAUTION
    Secondary,
    /// Rank 3+: scheduled only while time is GOOD
    Extended,
}

impl Phase {
    pub fn new(name: impl Into<String>, priority_rank: u32) -> Self {
        Self {
            name: name.into(),
            priority_rank,
            section: None,
            title: None,
            required_tools: Vec::new(),
            min_time_secs: default_min_time_secs(),
            expected_subsections: Vec::new(),
            min_words: 0,
            requires_facts: Vec::new(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_subsections<I, S>(mut self, subsections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_subsections = subsections.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_time_secs(mut self, secs: u64) -> Self {
        self.min_time_secs = secs;
        self
    }

    pub fn with_min_words(mut self, words: usize) -> Self {
        self.min_words = words;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn requiring_facts<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires_facts = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn section(&self) -> &str {
        self.section.as_deref().unwrap_or(&self.name)
    }

    pub fn title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        self.name
            .split(['_', '-'])
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn min_time_estimate(&self) -> Duration {
        Duration::from_secs(self.min_time_secs)
    }

    pub fn tier(&self) -> PhaseTier {
        match self.priority_rank {
            0 | 1 => PhaseTier::Baseline,
            2 => PhaseTier::Secondary,
            _ => PhaseTier::Extended,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.tier() == PhaseTier::Baseline
    }
}

/// Default catalog: overview (baseline), architecture, reference.
pub fn default_phases() -> Vec<Phase> {
    vec![
        Phase::new("overview", 1)
            .with_title("Project Overview")
            .with_tools(["file_inventory", "manifest_scan", "docs_probe"])
            .with_subsections(["Purpose", "Getting Started", "Project Layout"])
            .with_min_words(120)
            .with_min_time_secs(60),
        Phase::new("architecture", 2)
            .with_title("Architecture")
            .with_tools(["source_outline", "manifest_scan"])
            .with_subsections(["Components", "Dependencies", "Data Flow"])
            .with_min_words(180)
            .with_min_time_secs(120)
            .requiring_facts(["source_outline.source_files"]),
        Phase::new("reference", 3)
            .with_title("Reference")
            .with_tools(["source_outline", "test_inventory"])
            .with_subsections(["Modules", "Entry Points", "Testing"])
            .with_min_words(200)
            .with_min_time_secs(150)
            .requiring_facts(["source_outline.modules"]),
    ]
}

/// Phases in execution order: ascending rank, ties in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseCatalog {
    phases: Vec<Phase>,
}

impl PhaseCatalog {
    pub fn new(phases: Vec<Phase>) -> Result<Self, String> {
        Self::validate(&phases)?;
        let mut phases = phases;
        // stable: declaration order breaks ties
        phases.sort_by_key(|p| p.priority_rank);
        Ok(Self { phases })
    }

    pub fn validate(phases: &[Phase]) -> Result<(), String> {
        if phases.is_empty() {
            return Err("At least one phase must be configured".to_string());
        }
        let mut names = HashSet::new();
        let mut sections = HashSet::new();
        for phase in phases {
            if phase.name.trim().is_empty() {
                return Err("Phase name cannot be empty".to_string());
            }
            if phase.priority_rank == 0 {
                return Err(format!(
                    "Phase '{}': priority_rank must be at least 1",
                    phase.name
                ));
            }
            if !names.insert(phase.name.as_str()) {
                return Err(format!("Duplicate phase name '{}'", phase.name));
            }
            if !sections.insert(phase.section()) {
                return Err(format!(
                    "Phase '{}': section '{}' is documented by another phase",
                    phase.name,
                    phase.section()
                ));
            }
            if phase.required_tools.iter().any(|t| t.trim().is_empty()) {
                return Err(format!("Phase '{}': empty tool name", phase.name));
            }
        }
        let baselines = phases.iter().filter(|p| p.priority_rank == 1).count();
        if baselines != 1 {
            return Err(format!(
                "Exactly one baseline phase (priority_rank = 1) is required, found {}",
                baselines
            ));
        }
        Ok(())
    }

    pub fn baseline(&self) -> &Phase {
        // validated: exactly one rank-1 phase, sorted first
        &self.phases[0]
    }

    pub fn get(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Phase> {
        self.phases.iter()
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

impl Default for PhaseCatalog {
    fn default() -> Self {
        Self {
            phases: default_phases(),
        }
    }
}
