//! Improvement Loop
//!
//! Bounded retry state machine for one section:
//!
//! ```text
//! INITIAL -> ENHANCED -> VALIDATING -> FINALIZED
//!                ^            |
//!                |            +-> RETRYING -> ENHANCED   (retries left, time left)
//!                             +-> FALLBACK               (exhausted)
//! ```
//!
//! Every superseded draft stays in the outcome's history together with its score.

use crate::alignment::{
    AlignedScore, AlignmentContext, ContentHeuristic, QualityAligner, ScoreInput,
};
use crate::budget::{TimeBudgetTracker, TimeStatus};
use crate::error::ApiError;
use crate::executor::generate_draft_text;
use crate::generation::{ContentGenerator, CriterionGap, Feedback};
use crate::phase::Phase;
use crate::quality::{
    ContentScorer, QualityAssessor, QualityReport, SectionBrief, COMPLETENESS,
};
use crate::types::{Confidence, DraftContent, FactSheet, QualityTier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    Initial,
    Enhanced,
    Validating,
    Retrying,
    Finalized,
    Fallback,
}

impl LoopState {
    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        matches!(
            (self, next),
            (Initial, Enhanced)
                | (Enhanced, Validating)
                | (Validating, Finalized)
                | (Validating, Retrying)
                | (Validating, Fallback)
                | (Retrying, Enhanced)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Finalized | LoopState::Fallback)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Initial => "INITIAL",
            LoopState::Enhanced => "ENHANCED",
            LoopState::Validating => "VALIDATING",
            LoopState::Retrying => "RETRYING",
            LoopState::Finalized => "FINALIZED",
            LoopState::Fallback => "FALLBACK",
        };
        f.write_str(name)
    }
}

/// Loop state with its transition trail.
#[derive(Debug, Clone)]
pub struct LoopMachine {
    state: LoopState,
    trail: Vec<LoopState>,
}

impl Default for LoopMachine {
    fn default() -> Self {
        Self {
            state: LoopState::Initial,
            trail: vec![LoopState::Initial],
        }
    }
}

impl LoopMachine {
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn trail(&self) -> &[LoopState] {
        &self.trail
    }

    pub fn transition(&mut self, next: LoopState) -> Result<(), ApiError> {
        if !self.state.can_transition_to(next) {
            return Err(ApiError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = %self.state, to = %next, "Improvement loop transition");
        self.state = next;
        self.trail.push(next);
        Ok(())
    }
}

/// Retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementConfig {
    /// Regenerations allowed per section
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// No retry starts unless strictly more than this much time remains
    #[serde(default = "default_retry_floor_secs")]
    pub retry_floor_secs: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_floor_secs() -> u64 {
    90
}

impl Default for ImprovementConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_floor_secs: default_retry_floor_secs(),
        }
    }
}

impl ImprovementConfig {
    pub fn retry_floor(&self) -> Duration {
        Duration::from_secs(self.retry_floor_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries > 3 {
            return Err(format!(
                "max_retries must be between 0 and 3 (got {})",
                self.max_retries
            ));
        }
        Ok(())
    }
}

/// One draft and how it scored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftAttempt {
    /// `None` when generation failed twice for this attempt
    pub draft: Option<DraftContent>,
    pub reports: Vec<QualityReport>,
    pub aligned: AlignedScore,
    pub passed: bool,
}

/// Result of running the loop for one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionOutcome {
    pub phase: String,
    pub section: String,
    pub final_state: LoopState,
    /// Draft to publish; `None` means the section needs a fallback skeleton
    pub draft: Option<DraftContent>,
    pub score: Option<AlignedScore>,
    pub tier: QualityTier,
    pub retries_used: u32,
    pub history: Vec<DraftAttempt>,
    pub transitions: Vec<LoopState>,
    pub warnings: Vec<String>,
}

/// Runs generation, scoring and alignment until a draft passes or retries run out.
pub struct ImprovementLoop<'a> {
    pub generator: &'a dyn ContentGenerator,
    pub scorers: &'a [&'a dyn ContentScorer],
    pub assessor: &'a QualityAssessor,
    pub aligner: &'a QualityAligner,
    pub config: &'a ImprovementConfig,
}

impl<'a> ImprovementLoop<'a> {
    /// Drive one section to FINALIZED or FALLBACK starting from the executor's draft.
    pub fn run(
        &self,
        tracker: &TimeBudgetTracker,
        phase: &Phase,
        facts: &FactSheet,
        initial: Option<DraftContent>,
    ) -> SectionOutcome {
        let mut machine = LoopMachine::default();
        let mut outcome = SectionOutcome {
            phase: phase.name.clone(),
            section: phase.section().to_string(),
            final_state: LoopState::Initial,
            draft: None,
            score: None,
            tier: QualityTier::Fallback,
            retries_used: 0,
            history: Vec::new(),
            transitions: Vec::new(),
            warnings: Vec::new(),
        };

        if let Err(err) = self.drive(&mut machine, &mut outcome, tracker, phase, facts, initial) {
            warn!(phase = %phase.name, error = %err, "Improvement loop aborted");
            outcome.warnings.push(format!("Section '{}': {}", outcome.section, err));
            outcome.final_state = LoopState::Fallback;
            self.select_best(&mut outcome);
        }
        outcome.transitions = machine.trail().to_vec();
        outcome
    }

    fn drive(
        &self,
        machine: &mut LoopMachine,
        outcome: &mut SectionOutcome,
        tracker: &TimeBudgetTracker,
        phase: &Phase,
        facts: &FactSheet,
        initial: Option<DraftContent>,
    ) -> Result<(), ApiError> {
        let brief = SectionBrief::new(phase, facts);
        let threshold = self.assessor.threshold();
        let mut current = initial;
        let mut attempt_number = 1u32;

        machine.transition(LoopState::Enhanced)?;
        loop {
            machine.transition(LoopState::Validating)?;
            let attempt = self.evaluate(current.as_ref(), &brief, threshold);
            let passed = attempt.passed;
            let aligned_value = attempt.aligned.value;
            outcome.history.push(attempt);

            if passed {
                machine.transition(LoopState::Finalized)?;
                outcome.final_state = LoopState::Finalized;
                outcome.draft = current;
                outcome.tier = self.assessor.tier_for(aligned_value);
                outcome.score = outcome.history.last().map(|a| a.aligned.clone());
                info!(
                    phase = %phase.name,
                    score = aligned_value,
                    retries = outcome.retries_used,
                    "Section finalized"
                );
                return Ok(());
            }

            let retries_remaining = self.config.max_retries.saturating_sub(outcome.retries_used);
            let remaining = tracker.remaining_budget();
            let status = tracker.status();
            let time_allows = remaining > self.config.retry_floor() && status != TimeStatus::Critical;

            if retries_remaining == 0 || !time_allows {
                let reason = if retries_remaining == 0 {
                    format!("retries exhausted after {}", outcome.retries_used)
                } else {
                    format!(
                        "no time to retry ({}s remaining, status {})",
                        remaining.as_secs(),
                        status
                    )
                };
                machine.transition(LoopState::Fallback)?;
                outcome.final_state = LoopState::Fallback;
                outcome.warnings.push(format!(
                    "Section '{}' did not pass validation ({:.1} < {:.1}): {}",
                    outcome.section, aligned_value, threshold, reason
                ));
                info!(phase = %phase.name, score = aligned_value, %reason, "Section falling back");
                self.select_best(outcome);
                return Ok(());
            }

            machine.transition(LoopState::Retrying)?;
            outcome.retries_used += 1;
            attempt_number += 1;
            let feedback = self.feedback(
                outcome.history.last(),
                current.as_ref(),
                attempt_number,
                threshold,
            );
            debug!(
                phase = %phase.name,
                attempt = attempt_number,
                criteria = ?feedback.criteria(),
                "Regenerating with feedback"
            );

            machine.transition(LoopState::Enhanced)?;
            current = match generate_draft_text(self.generator, phase, facts, Some(&feedback)) {
                Ok(text) => Some(match &current {
                    Some(previous) => previous.supersede(text),
                    None => {
                        let mut draft = DraftContent::new(phase.section(), &phase.name, text);
                        draft.generation_attempt = attempt_number;
                        draft
                    }
                }),
                Err(err) => {
                    outcome.warnings.push(format!(
                        "Section '{}' regeneration failed: {}",
                        outcome.section, err
                    ));
                    None
                }
            };
        }
    }

    /// Score a draft with every scorer and align the results.
    fn evaluate(
        &self,
        draft: Option<&DraftContent>,
        brief: &SectionBrief,
        threshold: f64,
    ) -> DraftAttempt {
        let Some(draft) = draft else {
            // missing draft scores zero
            return DraftAttempt {
                draft: None,
                reports: Vec::new(),
                aligned: AlignedScore {
                    value: 0.0,
                    methodology: self.aligner.methodology(),
                    confidence: Confidence::Low,
                    divergence: 0.0,
                    raw_inputs: Vec::new(),
                },
                passed: false,
            };
        };

        let mut reports = Vec::new();
        let mut inputs = Vec::new();
        for scorer in self.scorers {
            match self.assessor.assess_with(*scorer, &draft.text, brief) {
                Ok(report) => {
                    inputs.push(ScoreInput::from_report(scorer.source(), &report));
                    reports.push(report);
                }
                Err(err) => {
                    warn!(scorer = scorer.source(), error = %err, "Scorer failed; ignoring its score")
                }
            }
        }

        let context = AlignmentContext {
            draft_text: &draft.text,
            section: brief,
        };
        if inputs.is_empty() {
            inputs.push(ScoreInput::new(
                "structural",
                ContentHeuristic::structural_score(&context),
            ));
        }
        let aligned = self.aligner.align(&inputs, &context);
        let passed = aligned.value >= threshold;
        DraftAttempt {
            draft: Some(draft.clone()),
            reports,
            aligned,
            passed,
        }
    }

    /// Failing criteria from the most pessimistic report, lowest first.
    fn feedback(
        &self,
        last: Option<&DraftAttempt>,
        previous: Option<&DraftContent>,
        attempt: u32,
        threshold: f64,
    ) -> Feedback {
        let mut pessimistic: BTreeMap<String, f64> = BTreeMap::new();
        if let Some(last) = last {
            for report in &last.reports {
                for (name, score) in &report.criteria_scores {
                    let entry = pessimistic.entry(name.clone()).or_insert(*score);
                    *entry = entry.min(*score);
                }
            }
        }

        let mut gaps: Vec<CriterionGap> = pessimistic
            .iter()
            .filter(|(_, score)| **score < threshold)
            .map(|(name, score)| CriterionGap {
                criterion: name.clone(),
                score: *score,
                target: threshold,
            })
            .collect();

        if gaps.is_empty() {
            // overall failed with no single criterion below target: push the weakest
            let weakest = pessimistic
                .iter()
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(name, score)| (name.clone(), *score))
                .unwrap_or_else(|| (COMPLETENESS.to_string(), 0.0));
            gaps.push(CriterionGap {
                criterion: weakest.0,
                score: weakest.1,
                target: threshold,
            });
        }
        gaps.sort_by(|a, b| a.score.total_cmp(&b.score).then(a.criterion.cmp(&b.criterion)));

        Feedback {
            attempt,
            failing_criteria: gaps,
            previous_score: last.map(|a| a.aligned.value).unwrap_or(0.0),
            threshold,
            previous_draft: previous.map(|d| d.text.clone()),
        }
    }

    /// On exhaustion keep the best-scoring draft if it still reaches `basic`.
    fn select_best(&self, outcome: &mut SectionOutcome) {
        // max_by keeps the later attempt on ties
        let best = outcome
            .history
            .iter()
            .filter(|a| a.draft.is_some())
            .max_by(|a, b| a.aligned.value.total_cmp(&b.aligned.value));

        match best {
            Some(best) if self.assessor.tier_for(best.aligned.value) >= QualityTier::Basic => {
                outcome.draft = best.draft.clone();
                outcome.score = Some(best.aligned.clone());
                outcome.tier = self.assessor.tier_for(best.aligned.value);
            }
            _ => {
                outcome.draft = None;
                outcome.score = best.map(|b| b.aligned.clone());
                outcome.tier = QualityTier::Fallback;
            }
        }
    }
}
