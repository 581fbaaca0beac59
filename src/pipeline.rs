//! Analysis Pipeline
//!
//! Single entry point wiring the scheduler together. One call is one invocation: the
//! tracker's context is opened on entry and reset on every exit path. Nothing below
//! this point raises; the caller always receives an [`AnalysisResult`].

use crate::alignment::{AlignmentConfig, QualityAligner};
use crate::budget::{TimeBudgetTracker, TimeStatus};
use crate::error::ApiError;
use crate::executor::{PhaseExecutor, PhaseTrace};
use crate::fallback::{FinalSection, TieredFallback};
use crate::generation::ContentGenerator;
use crate::improvement::{ImprovementConfig, ImprovementLoop};
use crate::phase::PhaseCatalog;
use crate::planner::{
    Admission, AnalysisSelector, Checkpoint, PhasePlanner, PlanProgress, PlannerConfig,
    SkipReason, SkippedPhase,
};
use crate::quality::{ContentScorer, QualityAssessor, QualityConfig};
use crate::tools::ToolRunner;
use crate::types::{FactSheet, QualityTier, RepositoryHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, warn};

/// Budget status observed at one scheduling checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSample {
    pub checkpoint: String,
    pub elapsed_secs: f64,
    pub remaining_secs: u64,
    pub status: TimeStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseRunStatus {
    Ran,
    Skipped,
}

/// One catalog phase as the host sees it: run, or skipped with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRun {
    pub phase: String,
    pub status: PhaseRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PhaseRun {
    pub fn ran(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            status: PhaseRunStatus::Ran,
            reason: None,
        }
    }

    pub fn skipped(skipped: &SkippedPhase) -> Self {
        Self {
            phase: skipped.phase.clone(),
            status: PhaseRunStatus::Skipped,
            reason: Some(skipped.reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    /// Every considered phase in catalog order; phases outside a single-phase selector
    /// are omitted
    pub phases_run: Vec<PhaseRun>,
    pub time_status_trace: Vec<StatusSample>,
    pub retries_used: u32,
    pub warnings: Vec<String>,
}

impl ExecutionInfo {
    /// Names of the phases that ran.
    pub fn ran_phases(&self) -> Vec<&str> {
        self.phases_with(PhaseRunStatus::Ran)
    }

    /// Names of the phases the planner refused.
    pub fn skipped_phases(&self) -> Vec<&str> {
        self.phases_with(PhaseRunStatus::Skipped)
    }

    fn phases_with(&self, status: PhaseRunStatus) -> Vec<&str> {
        self.phases_run
            .iter()
            .filter(|run| run.status == status)
            .map(|run| run.phase.as_str())
            .collect()
    }
}

/// What the host receives for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    pub documentation: BTreeMap<String, String>,
    pub tier: QualityTier,
    pub execution_info: ExecutionInfo,
}

/// Per-invocation detail kept out of the host-facing result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub selector: String,
    pub skipped: Vec<SkippedPhase>,
    pub phase_trace: Vec<PhaseTrace>,
    pub sections: Vec<FinalSection>,
    pub facts: FactSheet,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub diagnostics: Diagnostics,
}

/// Policy for one pipeline, usually derived from configuration.
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub catalog: PhaseCatalog,
    pub planner: PlannerConfig,
    pub quality: QualityConfig,
    pub alignment: AlignmentConfig,
    pub improvement: ImprovementConfig,
}

pub struct AnalysisPipeline<'a> {
    catalog: PhaseCatalog,
    planner: PhasePlanner,
    assessor: QualityAssessor,
    aligner: QualityAligner,
    improvement: ImprovementConfig,
    fallback: TieredFallback,
    tools: &'a dyn ToolRunner,
    generator: &'a dyn ContentGenerator,
    scorers: Vec<&'a dyn ContentScorer>,
}

/// Mutable state of a run, kept outside the unwind boundary so a panic does not lose it.
#[derive(Default)]
struct RunState {
    documentation: BTreeMap<String, String>,
    tiers: Vec<QualityTier>,
    info: ExecutionInfo,
    diagnostics: Diagnostics,
    baseline_ran: bool,
}

impl<'a> AnalysisPipeline<'a> {
    pub fn new(
        settings: PipelineSettings,
        tools: &'a dyn ToolRunner,
        generator: &'a dyn ContentGenerator,
        scorers: Vec<&'a dyn ContentScorer>,
    ) -> Self {
        Self {
            catalog: settings.catalog,
            planner: PhasePlanner::new(settings.planner),
            assessor: QualityAssessor::new(settings.quality),
            aligner: QualityAligner::new(settings.alignment),
            improvement: settings.improvement,
            fallback: TieredFallback::new(),
            tools,
            generator,
            scorers,
        }
    }

    pub fn catalog(&self) -> &PhaseCatalog {
        &self.catalog
    }

    /// Run one invocation against `repo`.
    ///
    /// `selector` is `"complete"`, `"progressive"` or a phase name; anything else is
    /// reported as a warning and treated as progressive.
    pub fn run(
        &self,
        tracker: &mut TimeBudgetTracker,
        repo: &RepositoryHandle,
        selector: Option<&str>,
    ) -> AnalysisOutcome {
        let guard = tracker.begin_invocation();
        let tracker: &TimeBudgetTracker = &guard;
        let mut state = RunState::default();

        info!(
            repository = %repo.name,
            selector = selector.unwrap_or("progressive"),
            remaining_secs = tracker.remaining_budget().as_secs(),
            "Analysis invocation started"
        );

        let run = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_phases(tracker, repo, selector, &mut state)
        }));
        let panicked = match run {
            Ok(()) => false,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "Collaborator panicked; finalizing with fallback");
                state
                    .info
                    .warnings
                    .push(format!("Invocation aborted by a collaborator panic: {}", message));
                self.ensure_baseline(&mut state, "invocation aborted");
                true
            }
        };

        self.sample(tracker, &mut state, "end");
        let tier = if panicked {
            QualityTier::Fallback
        } else {
            state.tiers.iter().copied().min().unwrap_or(QualityTier::Fallback)
        };
        let result = AnalysisResult {
            success: state.baseline_ran && !panicked,
            documentation: state.documentation,
            tier,
            execution_info: state.info,
        };
        info!(
            success = result.success,
            tier = %result.tier,
            sections = result.documentation.len(),
            retries = result.execution_info.retries_used,
            warnings = result.execution_info.warnings.len(),
            "Analysis invocation finished"
        );
        drop(guard);

        AnalysisOutcome {
            result,
            diagnostics: state.diagnostics,
        }
    }

    fn run_phases(
        &self,
        tracker: &TimeBudgetTracker,
        repo: &RepositoryHandle,
        raw_selector: Option<&str>,
        state: &mut RunState,
    ) {
        self.sample(tracker, state, "start");

        let selector = match AnalysisSelector::resolve(raw_selector, &self.catalog) {
            Ok(selector) => selector,
            Err(err) => {
                warn!(error = %err, "Falling back to progressive analysis");
                state.info.warnings.push(format!("{}; running progressive analysis", err));
                AnalysisSelector::Progressive
            }
        };
        state.diagnostics.selector = selector.to_string();

        let floor = self.planner.config().absolute_floor();
        if tracker.below_floor(floor) {
            let remaining = tracker.remaining_budget().as_secs();
            warn!(
                remaining_secs = remaining,
                floor_secs = floor.as_secs(),
                "{}",
                ApiError::BudgetExhausted {
                    remaining_secs: remaining,
                    floor_secs: floor.as_secs(),
                }
            );
            for phase in self.catalog.iter() {
                self.record_skip(
                    state,
                    SkippedPhase {
                        phase: phase.name.clone(),
                        reason: SkipReason::BelowFloor {
                            remaining_secs: remaining,
                            floor_secs: floor.as_secs(),
                        },
                    },
                );
            }
            self.ensure_baseline(state, "remaining time below the absolute floor");
            return;
        }

        let executor = PhaseExecutor::new(self.tools, self.generator);
        let improvement = ImprovementLoop {
            generator: self.generator,
            scorers: &self.scorers,
            assessor: &self.assessor,
            aligner: &self.aligner,
            config: &self.improvement,
        };
        let mut progress = PlanProgress::default();

        for phase in self.catalog.iter() {
            let checkpoint = Checkpoint {
                status: tracker.status(),
                remaining: tracker.remaining_budget(),
            };
            let admission = self.planner.admit(
                &mut progress,
                phase,
                checkpoint,
                &selector,
                &state.diagnostics.facts,
            );
            match admission {
                Admission::Skip(SkipReason::NotSelected) => continue,
                Admission::Skip(reason) => {
                    self.record_skip(
                        state,
                        SkippedPhase {
                            phase: phase.name.clone(),
                            reason,
                        },
                    );
                    continue;
                }
                Admission::Run => {}
            }
            self.sample(tracker, state, &format!("phase:{}", phase.name));

            let execution = executor.execute(
                tracker,
                repo,
                phase,
                &mut state.diagnostics.facts,
                &mut state.diagnostics.phase_trace,
            );
            state.info.warnings.extend(execution.warnings);
            state.info.phases_run.push(PhaseRun::ran(&phase.name));
            if phase.is_baseline() {
                state.baseline_ran = true;
            }

            let outcome = improvement.run(tracker, phase, &state.diagnostics.facts, execution.draft);
            state.info.retries_used += outcome.retries_used;
            state.info.warnings.extend(outcome.warnings.iter().cloned());

            let section = self
                .fallback
                .finalize(&outcome, phase, &state.diagnostics.facts);
            self.publish(state, section);
        }
    }

    fn record_skip(&self, state: &mut RunState, skipped: SkippedPhase) {
        state.info.warnings.push(skipped.warning());
        state.info.phases_run.push(PhaseRun::skipped(&skipped));
        state.diagnostics.skipped.push(skipped);
    }

    fn publish(&self, state: &mut RunState, section: FinalSection) {
        state.tiers.push(section.tier);
        state
            .documentation
            .insert(section.section.clone(), section.text.clone());
        state.diagnostics.sections.push(section);
    }

    /// Guarantee the baseline section exists, substituting a skeleton if needed.
    fn ensure_baseline(&self, state: &mut RunState, reason: &str) {
        let baseline = self.catalog.baseline();
        if state.documentation.contains_key(baseline.section()) {
            return;
        }
        let section = self
            .fallback
            .substitute(baseline, &state.diagnostics.facts, reason);
        self.publish(state, section);
    }

    fn sample(&self, tracker: &TimeBudgetTracker, state: &mut RunState, checkpoint: &str) {
        state.info.time_status_trace.push(StatusSample {
            checkpoint: checkpoint.to_string(),
            elapsed_secs: tracker.elapsed().as_secs_f64(),
            remaining_secs: tracker.remaining_budget().as_secs(),
            status: tracker.status(),
            at: Utc::now(),
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
