//! Phase Planner
//!
//! Decides which phases run given the current budget status. The policy is a pure
//! function of (phase, status, remaining time, selector, facts so far); the pipeline
//! re-asks it before every phase so late phases see the budget as it is then, not as it
//! was when the invocation began.

use crate::budget::TimeStatus;
use crate::error::ApiError;
use crate::phase::{Phase, PhaseCatalog, PhaseTier};
use crate::types::FactSheet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Which phases the caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSelector {
    /// Every phase while status is GOOD or CAUTION, whatever its priority tier
    Complete,
    /// Priority-tier policy
    #[default]
    Progressive,
    /// Baseline plus one named phase
    Single(String),
}

impl FromStr for AnalysisSelector {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "progressive" => Ok(AnalysisSelector::Progressive),
            "complete" => Ok(AnalysisSelector::Complete),
            _ if trimmed.chars().any(char::is_whitespace) => Err(ApiError::InvalidSelector(
                format!("'{}' is not a phase name", trimmed),
            )),
            _ => Ok(AnalysisSelector::Single(trimmed.to_string())),
        }
    }
}

impl fmt::Display for AnalysisSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisSelector::Complete => f.write_str("complete"),
            AnalysisSelector::Progressive => f.write_str("progressive"),
            AnalysisSelector::Single(name) => f.write_str(name),
        }
    }
}

impl AnalysisSelector {
    /// Resolve a raw selector against the catalog. Unknown phase names are an error.
    pub fn resolve(raw: Option<&str>, catalog: &PhaseCatalog) -> Result<Self, ApiError> {
        let selector = match raw {
            Some(raw) => raw.parse::<AnalysisSelector>()?,
            None => AnalysisSelector::Progressive,
        };
        if let AnalysisSelector::Single(name) = &selector {
            if catalog.get(name).is_none() {
                return Err(ApiError::InvalidSelector(format!(
                    "unknown phase '{}' (known: {})",
                    name,
                    catalog.names().join(", ")
                )));
            }
        }
        Ok(selector)
    }

    fn includes(&self, phase: &Phase) -> bool {
        match self {
            AnalysisSelector::Complete | AnalysisSelector::Progressive => true,
            AnalysisSelector::Single(name) => phase.is_baseline() || phase.name == *name,
        }
    }

    fn explicitly_requests(&self, phase: &Phase) -> bool {
        matches!(self, AnalysisSelector::Single(name) if phase.name == *name)
    }
}

/// Planner policy knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Below this much remaining time not even the baseline phase starts
    #[serde(default = "default_absolute_floor_secs")]
    pub absolute_floor_secs: u64,

    /// Refuse non-baseline phases whose `min_time_secs` exceeds remaining time
    #[serde(default = "default_true")]
    pub enforce_min_time: bool,

    /// Skip phases whose `requires_facts` are missing from facts gathered so far
    #[serde(default = "default_true")]
    pub adaptive_skipping: bool,
}

fn default_absolute_floor_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            absolute_floor_secs: default_absolute_floor_secs(),
            enforce_min_time: true,
            adaptive_skipping: true,
        }
    }
}

impl PlannerConfig {
    pub fn absolute_floor(&self) -> Duration {
        Duration::from_secs(self.absolute_floor_secs)
    }
}

/// Why a phase did not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Status too low for the phase's priority tier
    BudgetStatus { status: TimeStatus },
    /// Scheduling stopped after an earlier phase was refused for status
    Halted { status: TimeStatus },
    /// Remaining time below the phase's minimum estimate
    InsufficientTime { remaining_secs: u64, needed_secs: u64 },
    /// Remaining time below the absolute floor
    BelowFloor { remaining_secs: u64, floor_secs: u64 },
    /// Required facts absent from what earlier phases gathered
    FactsMissing { paths: Vec<String> },
    /// Not part of the requested selector
    NotSelected,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BudgetStatus { status } => write!(f, "budget status {}", status),
            SkipReason::Halted { status } => {
                write!(f, "scheduling stopped at budget status {}", status)
            }
            SkipReason::InsufficientTime {
                remaining_secs,
                needed_secs,
            } => write!(
                f,
                "insufficient time ({}s remaining, {}s needed)",
                remaining_secs, needed_secs
            ),
            SkipReason::BelowFloor {
                remaining_secs,
                floor_secs,
            } => write!(
                f,
                "below absolute floor ({}s remaining, floor {}s)",
                remaining_secs, floor_secs
            ),
            SkipReason::FactsMissing { paths } => {
                write!(f, "required facts missing: {}", paths.join(", "))
            }
            SkipReason::NotSelected => f.write_str("not selected"),
        }
    }
}

/// A phase the planner refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPhase {
    pub phase: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

impl SkippedPhase {
    pub fn warning(&self) -> String {
        format!("Phase '{}' skipped: {}", self.phase, self.reason)
    }
}

/// Planner answer for one phase at one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Run,
    Skip(SkipReason),
}

/// Budget snapshot the planner decides against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub status: TimeStatus,
    pub remaining: Duration,
}

/// Scheduling state carried across checkpoints of one invocation.
#[derive(Debug, Clone, Default)]
pub struct PlanProgress {
    halted: Option<TimeStatus>,
}

impl PlanProgress {
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }
}

/// Preview of which phases a given budget would run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePlan {
    pub scheduled: Vec<String>,
    pub skipped: Vec<SkippedPhase>,
}

#[derive(Debug, Clone, Default)]
pub struct PhasePlanner {
    config: PlannerConfig,
}

impl PhasePlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Decide whether `phase` may start now.
    pub fn admit(
        &self,
        progress: &mut PlanProgress,
        phase: &Phase,
        checkpoint: Checkpoint,
        selector: &AnalysisSelector,
        facts: &FactSheet,
    ) -> Admission {
        let admission = self.decide(progress, phase, checkpoint, selector, facts);
        match &admission {
            Admission::Run => info!(
                phase = %phase.name,
                status = %checkpoint.status,
                remaining_secs = checkpoint.remaining.as_secs(),
                "Phase admitted"
            ),
            Admission::Skip(SkipReason::NotSelected) => {
                debug!(phase = %phase.name, selector = %selector, "Phase not selected")
            }
            Admission::Skip(reason) => info!(
                phase = %phase.name,
                status = %checkpoint.status,
                remaining_secs = checkpoint.remaining.as_secs(),
                reason = %reason,
                "Phase skipped"
            ),
        }
        admission
    }

    fn decide(
        &self,
        progress: &mut PlanProgress,
        phase: &Phase,
        checkpoint: Checkpoint,
        selector: &AnalysisSelector,
        facts: &FactSheet,
    ) -> Admission {
        if !selector.includes(phase) {
            return Admission::Skip(SkipReason::NotSelected);
        }

        let floor = self.config.absolute_floor();
        if checkpoint.remaining < floor {
            return Admission::Skip(SkipReason::BelowFloor {
                remaining_secs: checkpoint.remaining.as_secs(),
                floor_secs: floor.as_secs(),
            });
        }

        if phase.is_baseline() {
            return Admission::Run;
        }

        if let Some(status) = progress.halted {
            return Admission::Skip(SkipReason::Halted { status });
        }

        let status = checkpoint.status;
        let tier_allows = if status == TimeStatus::Critical {
            false
        } else if selector.explicitly_requests(phase) {
            true
        } else if matches!(selector, AnalysisSelector::Complete) {
            matches!(status, TimeStatus::Good | TimeStatus::Caution)
        } else {
            match phase.tier() {
                PhaseTier::Baseline => true,
                PhaseTier::Secondary => {
                    matches!(status, TimeStatus::Good | TimeStatus::Caution)
                }
                PhaseTier::Extended => status == TimeStatus::Good,
            }
        };
        if !tier_allows {
            progress.halted = Some(status);
            return Admission::Skip(SkipReason::BudgetStatus { status });
        }

        if self.config.enforce_min_time && !selector.explicitly_requests(phase) {
            let needed = phase.min_time_estimate();
            if checkpoint.remaining < needed {
                return Admission::Skip(SkipReason::InsufficientTime {
                    remaining_secs: checkpoint.remaining.as_secs(),
                    needed_secs: needed.as_secs(),
                });
            }
        }

        if self.config.adaptive_skipping {
            let missing: Vec<String> = phase
                .requires_facts
                .iter()
                .filter(|path| !Self::fact_available(facts, path))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Admission::Skip(SkipReason::FactsMissing { paths: missing });
            }
        }

        Admission::Run
    }

    /// A required fact counts as missing only when its tool ran and produced nothing.
    /// Facts from tools that have not run yet are the phase's own job to gather.
    fn fact_available(facts: &FactSheet, path: &str) -> bool {
        let tool = path.split('.').next().unwrap_or(path);
        !facts.has_attempted(tool) || facts.is_present(path)
    }

    /// Preview the schedule for a fixed budget snapshot, with no facts gathered yet.
    pub fn plan(
        &self,
        catalog: &PhaseCatalog,
        checkpoint: Checkpoint,
        selector: &AnalysisSelector,
    ) -> PhasePlan {
        let facts = FactSheet::new();
        let mut progress = PlanProgress::default();
        let mut plan = PhasePlan::default();
        for phase in catalog.iter() {
            match self.decide(&mut progress, phase, checkpoint, selector, &facts) {
                Admission::Run => plan.scheduled.push(phase.name.clone()),
                Admission::Skip(SkipReason::NotSelected) => {}
                Admission::Skip(reason) => plan.skipped.push(SkippedPhase {
                    phase: phase.name.clone(),
                    reason,
                }),
            }
        }
        plan
    }
}
