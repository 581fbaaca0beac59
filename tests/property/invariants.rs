//! Property-based tests for budget, alignment and retry invariants

use docpace::alignment::{AlignmentConfig, AlignmentContext, QualityAligner};
use docpace::budget::StatusThresholds;
use docpace::error::{GenerationError, ScoringError, ToolError};
use docpace::generation::{ContentGenerator, Feedback};
use docpace::improvement::{ImprovementConfig, ImprovementLoop};
use docpace::phase::{default_phases, Phase};
use docpace::pipeline::{AnalysisPipeline, PipelineSettings};
use docpace::quality::{ContentScorer, QualityAssessor, RawScore, SectionBrief};
use docpace::{
    DraftContent, FactSheet, ManualClock, Methodology, RepositoryHandle, ScoreInput,
    TimeBudgetTracker, ToolRunner,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::time::Duration;

struct QuickTools;

impl ToolRunner for QuickTools {
    fn run_tool(&self, tool_name: &str, _: &RepositoryHandle) -> Result<Value, ToolError> {
        Ok(json!({ "tool": tool_name, "source_files": 1, "modules": ["src"] }))
    }
}

struct EchoGenerator;

impl ContentGenerator for EchoGenerator {
    fn generate_content(
        &self,
        phase: &Phase,
        _: &FactSheet,
        _: Option<&Feedback>,
    ) -> Result<String, GenerationError> {
        Ok(format!("## {}\n\nGenerated.", phase.title()))
    }
}

struct Replay {
    scores: RefCell<Vec<f64>>,
}

impl ContentScorer for Replay {
    fn source(&self) -> &str {
        "replay"
    }

    fn score_content(&self, _: &str, _: &SectionBrief) -> Result<RawScore, ScoringError> {
        let mut scores = self.scores.borrow_mut();
        let next = if scores.len() > 1 {
            scores.remove(0)
        } else {
            scores.first().copied().unwrap_or(0.0)
        };
        Ok(RawScore {
            overall: Some(next),
            ..RawScore::default()
        })
    }
}

fn methodology() -> impl Strategy<Value = Methodology> {
    prop_oneof![
        Just(Methodology::WeightedAverage),
        Just(Methodology::CategoryAdjusted),
        Just(Methodology::ContentHeuristic),
    ]
}

fn manual_tracker(total_secs: u64) -> (TimeBudgetTracker, ManualClock) {
    let clock = ManualClock::new();
    let tracker = TimeBudgetTracker::with_clock(
        Box::new(clock.clone()),
        Duration::from_secs(total_secs),
        StatusThresholds::default(),
    );
    (tracker, clock)
}

proptest! {
    #[test]
    fn aligned_score_stays_within_delta_of_lowest_input(
        overalls in prop::collection::vec(0.0f64..=100.0, 1..4),
        completeness in prop::collection::vec(0.0f64..=100.0, 4),
        methodology in methodology(),
        max_delta in 0.0f64..=30.0,
    ) {
        let aligner = QualityAligner::new(AlignmentConfig {
            methodology,
            max_delta,
            ..AlignmentConfig::default()
        });
        let inputs: Vec<ScoreInput> = overalls
            .iter()
            .zip(&completeness)
            .enumerate()
            .map(|(i, (overall, c))| {
                ScoreInput::new(format!("scorer-{}", i), *overall)
                    .with_criteria([("completeness", *c), ("structure", *overall)])
            })
            .collect();
        let section = SectionBrief::new(&default_phases()[0], &FactSheet::new());
        let context = AlignmentContext {
            draft_text: "## Project Overview\n\nText.",
            section: &section,
        };

        let aligned = aligner.align(&inputs, &context);
        let lowest = overalls.iter().copied().fold(f64::INFINITY, f64::min);

        prop_assert!((0.0..=100.0).contains(&aligned.value));
        prop_assert!((aligned.value - lowest).abs() <= max_delta + 1e-9);
    }

    #[test]
    fn elapsed_never_decreases(steps in prop::collection::vec(0u64..120, 1..20)) {
        let (mut tracker, clock) = manual_tracker(900);
        tracker.start();
        let mut previous = tracker.elapsed();
        for step in steps {
            clock.advance_secs(step);
            let elapsed = tracker.elapsed();
            prop_assert!(elapsed >= previous);
            previous = elapsed;
        }
    }

    #[test]
    fn reset_is_idempotent(charge in 0u64..2_000, advance in 0u64..2_000) {
        let (mut tracker, clock) = manual_tracker(900);
        tracker.charge(Duration::from_secs(charge));
        tracker.start();
        clock.advance_secs(advance);

        tracker.reset();
        let first = (tracker.elapsed(), tracker.status(), tracker.context().is_running());
        tracker.reset();
        let second = (tracker.elapsed(), tracker.status(), tracker.context().is_running());

        prop_assert_eq!(first, second);
        prop_assert_eq!(first.0, Duration::ZERO);
    }

    #[test]
    fn status_is_monotonic_in_remaining_time(a in 0u64..1_200, b in 0u64..1_200) {
        let thresholds = StatusThresholds::default();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            thresholds.classify(Duration::from_secs(low))
                <= thresholds.classify(Duration::from_secs(high))
        );
    }

    #[test]
    fn retries_never_exceed_max(
        scores in prop::collection::vec(0.0f64..=100.0, 1..6),
        max_retries in 0u32..=3,
    ) {
        let (mut tracker, _clock) = manual_tracker(900);
        tracker.start();
        let scorer = Replay { scores: RefCell::new(scores) };
        let scorers: [&dyn ContentScorer; 1] = [&scorer];
        let assessor = QualityAssessor::default();
        let aligner = QualityAligner::default();
        let config = ImprovementConfig { max_retries, retry_floor_secs: 90 };
        let improvement = ImprovementLoop {
            generator: &EchoGenerator,
            scorers: &scorers,
            assessor: &assessor,
            aligner: &aligner,
            config: &config,
        };
        let phase = default_phases().remove(0);
        let draft = DraftContent::new("overview", "overview", "## Project Overview\n\nFirst.".to_string());

        let outcome = improvement.run(&tracker, &phase, &FactSheet::new(), Some(draft));

        prop_assert!(outcome.retries_used <= max_retries);
        prop_assert_eq!(outcome.history.len() as u32, outcome.retries_used + 1);
        prop_assert!(outcome.final_state.is_terminal());
    }

    #[test]
    fn invocation_succeeds_while_time_remains(elapsed in 0u64..=840) {
        let (mut tracker, _clock) = manual_tracker(900);
        tracker.charge(Duration::from_secs(elapsed));
        let scorer = Replay { scores: RefCell::new(vec![90.0]) };
        let scorers: Vec<&dyn ContentScorer> = vec![&scorer];
        let pipeline = AnalysisPipeline::new(
            PipelineSettings::default(),
            &QuickTools,
            &EchoGenerator,
            scorers,
        );

        let outcome = pipeline.run(&mut tracker, &RepositoryHandle::new("/repo"), None);

        prop_assert!(outcome.result.success);
        prop_assert!(outcome.result.documentation.contains_key("overview"));
        prop_assert_eq!(tracker.elapsed(), Duration::ZERO);
    }
}
