//! Integration tests for the quality improvement loop

use super::test_utils::*;
use docpace::alignment::{AlignmentConfig, QualityAligner};
use docpace::error::ScoringError;
use docpace::improvement::{ImprovementConfig, ImprovementLoop, LoopState, SectionOutcome};
use docpace::phase::default_phases;
use docpace::quality::{
    ContentScorer, QualityAssessor, RawScore, SectionBrief, COMPLETENESS, GRAMMAR, STRUCTURE,
};
use docpace::{
    ContentGenerator, DraftContent, FactSheet, ManualClock, Methodology, QualityTier,
    TimeBudgetTracker,
};

struct BrokenScorer;

impl ContentScorer for BrokenScorer {
    fn source(&self) -> &str {
        "broken"
    }

    fn score_content(&self, _: &str, _: &SectionBrief) -> Result<RawScore, ScoringError> {
        Err(ScoringError::Malformed("not json".to_string()))
    }
}

fn run(
    tracker: &TimeBudgetTracker,
    generator: &dyn ContentGenerator,
    scorers: &[&dyn ContentScorer],
    config: ImprovementConfig,
) -> SectionOutcome {
    let assessor = QualityAssessor::default();
    let aligner = QualityAligner::new(AlignmentConfig {
        methodology: Methodology::WeightedAverage,
        ..AlignmentConfig::default()
    });
    let improvement = ImprovementLoop {
        generator,
        scorers,
        assessor: &assessor,
        aligner: &aligner,
        config: &config,
    };
    let phase = default_phases().remove(0);
    let draft = DraftContent::new("overview", "overview", "## Project Overview\n\nFirst.".to_string());
    improvement.run(tracker, &phase, &FactSheet::new(), Some(draft))
}

fn started(total_secs: u64, clock: &ManualClock) -> TimeBudgetTracker {
    let mut tracker = TimeBudgetTracker::with_clock(
        Box::new(clock.clone()),
        std::time::Duration::from_secs(total_secs),
        Default::default(),
    );
    tracker.start();
    tracker
}

#[test]
fn test_feedback_uses_most_pessimistic_scorer() {
    let clock = ManualClock::new();
    let tracker = started(900, &clock);
    let generator = RecordingGenerator::new(&clock, 1);
    let lenient = ScriptedScorer::new(
        "lenient",
        vec![
            criteria(&[(COMPLETENESS, 75.0), (STRUCTURE, 80.0), (GRAMMAR, 90.0)]),
            criteria(&[(COMPLETENESS, 90.0), (STRUCTURE, 90.0), (GRAMMAR, 90.0)]),
        ],
    );
    let strict = ScriptedScorer::new(
        "strict",
        vec![
            criteria(&[(COMPLETENESS, 72.0), (STRUCTURE, 10.0), (GRAMMAR, 88.0)]),
            criteria(&[(COMPLETENESS, 88.0), (STRUCTURE, 86.0), (GRAMMAR, 88.0)]),
        ],
    );
    let scorers: Vec<&dyn ContentScorer> = vec![&lenient, &strict];

    let outcome = run(&tracker, &generator, &scorers, ImprovementConfig::default());

    assert_eq!(outcome.final_state, LoopState::Finalized);
    assert_eq!(outcome.retries_used, 1);
    let retries = generator.retries();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].failing_criteria[0].criterion, STRUCTURE);
    assert_eq!(retries[0].failing_criteria[0].score, 10.0);
    assert!(!retries[0].mentions(GRAMMAR));
    assert!(!retries[0].mentions(COMPLETENESS));
}

#[test]
fn test_transition_trail_for_one_retry() {
    let clock = ManualClock::new();
    let tracker = started(900, &clock);
    let generator = RecordingGenerator::new(&clock, 1);
    let scorer = ScriptedScorer::new("scripted", vec![overall(40.0), overall(80.0)]);
    let scorers: Vec<&dyn ContentScorer> = vec![&scorer];

    let outcome = run(&tracker, &generator, &scorers, ImprovementConfig::default());

    assert_eq!(
        outcome.transitions,
        vec![
            LoopState::Initial,
            LoopState::Enhanced,
            LoopState::Validating,
            LoopState::Retrying,
            LoopState::Enhanced,
            LoopState::Validating,
            LoopState::Finalized,
        ]
    );
    assert_eq!(outcome.history.len(), 2);
    assert_eq!(outcome.tier, QualityTier::Medium);
}

#[test]
fn test_retries_stop_when_budget_runs_low() {
    let clock = ManualClock::new();
    // 200s total; every regeneration burns 60s
    let tracker = started(200, &clock);
    let generator = RecordingGenerator::new(&clock, 60);
    let scorer = ScriptedScorer::new("scripted", vec![overall(55.0)]);
    let scorers: Vec<&dyn ContentScorer> = vec![&scorer];
    let config = ImprovementConfig {
        max_retries: 3,
        retry_floor_secs: 90,
    };

    let outcome = run(&tracker, &generator, &scorers, config);

    // 200 -> 140 -> 80; the third retry would start below the floor
    assert_eq!(outcome.retries_used, 2);
    assert_eq!(outcome.final_state, LoopState::Fallback);
    assert!(outcome.warnings.iter().any(|w| w.contains("no time to retry")));
    // best draft still reaches basic, so it is kept
    assert_eq!(outcome.tier, QualityTier::Basic);
    assert!(outcome.draft.is_some());
}

#[test]
fn test_zero_max_retries_finalizes_first_failure() {
    let clock = ManualClock::new();
    let tracker = started(900, &clock);
    let generator = RecordingGenerator::new(&clock, 1);
    let scorer = ScriptedScorer::new("scripted", vec![overall(60.0)]);
    let scorers: Vec<&dyn ContentScorer> = vec![&scorer];
    let config = ImprovementConfig {
        max_retries: 0,
        retry_floor_secs: 90,
    };

    let outcome = run(&tracker, &generator, &scorers, config);

    assert_eq!(outcome.retries_used, 0);
    assert!(generator.feedback.borrow().is_empty());
    assert_eq!(outcome.final_state, LoopState::Fallback);
    assert!(outcome.warnings.iter().any(|w| w.contains("retries exhausted")));
}

#[test]
fn test_failing_scorers_fall_back_to_structural_score() {
    let clock = ManualClock::new();
    let tracker = started(900, &clock);
    let generator = RecordingGenerator::new(&clock, 1);
    let scorers: Vec<&dyn ContentScorer> = vec![&BrokenScorer];

    let outcome = run(&tracker, &generator, &scorers, ImprovementConfig::default());

    let first = &outcome.history[0];
    assert!(first.reports.is_empty());
    assert_eq!(first.aligned.raw_inputs.len(), 1);
    assert_eq!(first.aligned.raw_inputs[0].source, "structural");
    assert!(first.aligned.value.is_finite());
}
