//! Integration tests for score alignment across scoring paths

use docpace::alignment::{AlignmentConfig, AlignmentContext, QualityAligner};
use docpace::phase::default_phases;
use docpace::quality::{SectionBrief, COMPLETENESS, GRAMMAR, RELEVANCE, STRUCTURE};
use docpace::types::Confidence;
use docpace::{FactSheet, Methodology, ScoreInput};
use std::collections::BTreeMap;

fn brief() -> SectionBrief {
    SectionBrief::new(&default_phases()[0], &FactSheet::new())
}

const DRAFT: &str = "## Project Overview\n\nSample schedules documentation work.\n\n\
### Purpose\n\nIt keeps analysis inside a deadline.\n\n\
### Getting Started\n\nRun the binary against a checkout.\n\n\
### Project Layout\n\nSources live under src.";

fn aligner(methodology: Methodology) -> QualityAligner {
    QualityAligner::new(AlignmentConfig {
        methodology,
        ..AlignmentConfig::default()
    })
}

fn divergent_inputs() -> Vec<ScoreInput> {
    vec![
        ScoreInput::new("heuristic", 92.0).with_criteria([
            (COMPLETENESS, 95.0),
            (STRUCTURE, 90.0),
            (RELEVANCE, 92.0),
            (GRAMMAR, 91.0),
        ]),
        ScoreInput::new("provider", 64.0).with_criteria([
            (COMPLETENESS, 40.0),
            (STRUCTURE, 85.0),
            (RELEVANCE, 70.0),
            (GRAMMAR, 75.0),
        ]),
    ]
}

#[test]
fn test_category_adjusted_reconciles_divergent_scorers() {
    let section = brief();
    let context = AlignmentContext {
        draft_text: DRAFT,
        section: &section,
    };

    let aligned = aligner(Methodology::CategoryAdjusted).align(&divergent_inputs(), &context);

    assert_eq!(aligned.methodology, Methodology::CategoryAdjusted);
    assert!(aligned.value > 64.0 && aligned.value < 92.0, "value {}", aligned.value);
    assert!(aligned.value <= 64.0 + 15.0);
    assert_eq!(aligned.divergence, 28.0);
    assert_eq!(aligned.confidence, Confidence::Low);
    assert_eq!(aligned.raw_inputs.len(), 2);
}

#[test]
fn test_every_methodology_stays_within_delta_of_lowest_input() {
    let section = brief();
    let context = AlignmentContext {
        draft_text: DRAFT,
        section: &section,
    };
    let inputs = divergent_inputs();

    for methodology in [
        Methodology::WeightedAverage,
        Methodology::CategoryAdjusted,
        Methodology::ContentHeuristic,
    ] {
        let aligned = aligner(methodology).align(&inputs, &context);
        let lowest = aligned.min_raw().unwrap();
        assert!(
            (aligned.value - lowest).abs() <= 15.0 + 1e-9,
            "{} produced {} against lowest {}",
            methodology,
            aligned.value,
            lowest
        );
        assert!((0.0..=100.0).contains(&aligned.value));
    }
}

#[test]
fn test_source_weights_shift_weighted_average() {
    let section = brief();
    let context = AlignmentContext {
        draft_text: DRAFT,
        section: &section,
    };
    let inputs = vec![
        ScoreInput::new("heuristic", 80.0),
        ScoreInput::new("provider", 70.0),
    ];

    let even = aligner(Methodology::WeightedAverage).align(&inputs, &context);
    let trusted = QualityAligner::new(AlignmentConfig {
        methodology: Methodology::WeightedAverage,
        source_weights: BTreeMap::from([("provider".to_string(), 3.0)]),
        ..AlignmentConfig::default()
    })
    .align(&inputs, &context);

    assert!((even.value - 75.0).abs() < 1e-9);
    assert!((trusted.value - 72.5).abs() < 1e-9);
    assert_eq!(trusted.confidence, Confidence::High);
}

#[test]
fn test_single_input_passes_through() {
    let section = brief();
    let context = AlignmentContext {
        draft_text: DRAFT,
        section: &section,
    };
    for methodology in [
        Methodology::WeightedAverage,
        Methodology::CategoryAdjusted,
        Methodology::ContentHeuristic,
    ] {
        let aligned = aligner(methodology).align(&[ScoreInput::new("heuristic", 81.0)], &context);
        assert!((aligned.value - 81.0).abs() < 1e-9);
        assert_eq!(aligned.divergence, 0.0);
        assert_eq!(aligned.confidence, Confidence::High);
    }
}

#[test]
fn test_methodology_parses_from_config_names() {
    let config: AlignmentConfig =
        toml::from_str("methodology = \"content_heuristic\"\nmax_delta = 10.0\n").unwrap();
    assert_eq!(config.methodology, Methodology::ContentHeuristic);
    assert_eq!(config.max_delta, 10.0);
    assert!(config.validate().is_ok());
}
