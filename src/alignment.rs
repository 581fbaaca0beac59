//! Quality Aligner
//!
//! Reconciles independently produced quality scores for the same draft into one
//! trusted score. Methodologies are strategies behind [`AlignmentStrategy`]; the
//! [`QualityAligner`] wraps whichever is configured and enforces the output bounds:
//! the value stays in `[0, 100]` and within `max_delta` of the lowest raw input.

use crate::quality::{
    CriterionWeights, HeuristicScorer, QualityReport, SectionBrief, COMPLETENESS, STRUCTURE,
};
use crate::types::Confidence;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// One scorer's view of a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreInput {
    pub source: String,
    pub overall: f64,
    #[serde(default)]
    pub criteria: BTreeMap<String, f64>,
}

impl ScoreInput {
    pub fn new(source: impl Into<String>, overall: f64) -> Self {
        Self {
            source: source.into(),
            overall,
            criteria: BTreeMap::new(),
        }
    }

    pub fn with_criteria<I, S>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        self.criteria = criteria.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self
    }

    pub fn from_report(source: impl Into<String>, report: &QualityReport) -> Self {
        Self {
            source: source.into(),
            overall: report.overall,
            criteria: report.criteria_scores.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Methodology {
    WeightedAverage,
    CategoryAdjusted,
    ContentHeuristic,
}

impl Methodology {
    pub fn as_str(self) -> &'static str {
        match self {
            Methodology::WeightedAverage => "weighted_average",
            Methodology::CategoryAdjusted => "category_adjusted",
            Methodology::ContentHeuristic => "content_heuristic",
        }
    }
}

impl fmt::Display for Methodology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciled score. Derived and read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedScore {
    pub value: f64,
    pub methodology: Methodology,
    pub confidence: Confidence,
    /// Spread between the highest and lowest raw overall
    pub divergence: f64,
    pub raw_inputs: Vec<ScoreInput>,
}

impl AlignedScore {
    pub fn min_raw(&self) -> Option<f64> {
        self.raw_inputs
            .iter()
            .map(|i| i.overall)
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// Draft context some strategies consult.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentContext<'a> {
    pub draft_text: &'a str,
    pub section: &'a SectionBrief,
}

/// What a strategy produced before the aligner's bounds are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Combined {
    pub value: f64,
    pub methodology: Methodology,
}

/// Score-combination methodology.
pub trait AlignmentStrategy: Send + Sync {
    fn methodology(&self) -> Methodology;

    /// Combine at least one sanitized input into one value.
    fn combine(&self, inputs: &[ScoreInput], context: &AlignmentContext<'_>) -> Combined;
}

fn spread(inputs: &[ScoreInput]) -> (f64, f64) {
    let min = inputs
        .iter()
        .map(|i| i.overall)
        .fold(f64::INFINITY, f64::min);
    let max = inputs
        .iter()
        .map(|i| i.overall)
        .fold(f64::NEG_INFINITY, f64::max);
    (min, max)
}

/// Fixed per-source weights; unknown sources weigh `default_weight`.
#[derive(Debug, Clone)]
pub struct WeightedAverage {
    weights: BTreeMap<String, f64>,
    default_weight: f64,
}

impl WeightedAverage {
    pub fn new(weights: BTreeMap<String, f64>) -> Self {
        Self {
            weights,
            default_weight: 1.0,
        }
    }

    fn weight(&self, source: &str) -> f64 {
        self.weights
            .get(source)
            .copied()
            .filter(|w| w.is_finite() && *w >= 0.0)
            .unwrap_or(self.default_weight)
    }

    fn mean(&self, inputs: &[ScoreInput]) -> f64 {
        let (total, weight_sum) = inputs.iter().fold((0.0, 0.0), |(t, w), input| {
            let weight = self.weight(&input.source);
            (t + input.overall * weight, w + weight)
        });
        if weight_sum > 0.0 {
            total / weight_sum
        } else {
            inputs.iter().map(|i| i.overall).sum::<f64>() / inputs.len() as f64
        }
    }
}

impl Default for WeightedAverage {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl AlignmentStrategy for WeightedAverage {
    fn methodology(&self) -> Methodology {
        Methodology::WeightedAverage
    }

    fn combine(&self, inputs: &[ScoreInput], _context: &AlignmentContext<'_>) -> Combined {
        Combined {
            value: self.mean(inputs),
            methodology: Methodology::WeightedAverage,
        }
    }
}

/// Re-weights the categories the sources disagree on most, pulling each category toward
/// the source whose own criteria are most internally consistent.
#[derive(Debug, Clone, Default)]
pub struct CategoryAdjusted;

impl CategoryAdjusted {
    /// Inverse spread of a source's criteria; sources without criteria get 1.
    fn reliability(input: &ScoreInput) -> f64 {
        let scores: Vec<f64> = input.criteria.values().copied().collect();
        if scores.len() < 2 {
            return 1.0;
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let variance =
            scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
        1.0 / (1.0 + variance.sqrt() / 10.0)
    }
}

impl AlignmentStrategy for CategoryAdjusted {
    fn methodology(&self) -> Methodology {
        Methodology::CategoryAdjusted
    }

    fn combine(&self, inputs: &[ScoreInput], _context: &AlignmentContext<'_>) -> Combined {
        let (min, max) = spread(inputs);
        let reliabilities: Vec<f64> = inputs.iter().map(Self::reliability).collect();
        let reliability_sum: f64 = reliabilities.iter().sum();

        let overall_blend = inputs
            .iter()
            .zip(&reliabilities)
            .map(|(i, r)| i.overall * r)
            .sum::<f64>()
            / reliability_sum;

        let categories: BTreeSet<&String> = inputs
            .iter()
            .flat_map(|i| i.criteria.keys())
            .filter(|name| inputs.iter().filter(|i| i.criteria.contains_key(*name)).count() >= 2)
            .collect();

        let value = if categories.is_empty() {
            overall_blend
        } else {
            let mut weighted = 0.0;
            let mut weight_sum = 0.0;
            for category in categories {
                let mut consensus = 0.0;
                let mut consensus_weight = 0.0;
                let mut low = f64::INFINITY;
                let mut high = f64::NEG_INFINITY;
                for (input, reliability) in inputs.iter().zip(&reliabilities) {
                    if let Some(score) = input.criteria.get(category) {
                        consensus += score * reliability;
                        consensus_weight += reliability;
                        low = low.min(*score);
                        high = high.max(*score);
                    }
                }
                let disagreement = high - low;
                let category_weight = 1.0 + disagreement / 100.0;
                weighted += category_weight * consensus / consensus_weight;
                weight_sum += category_weight;
            }
            let category_score = (weighted / weight_sum).clamp(min, max);
            (category_score + overall_blend) / 2.0
        };

        Combined {
            value: value.clamp(min, max),
            methodology: Methodology::CategoryAdjusted,
        }
    }
}

/// Ignores both raw inputs when they diverge past `override_threshold` and rescores the
/// draft from structure alone; otherwise defers to a weighted average.
#[derive(Debug, Clone)]
pub struct ContentHeuristic {
    override_threshold: f64,
    fallback: WeightedAverage,
}

impl ContentHeuristic {
    pub fn new(override_threshold: f64, fallback: WeightedAverage) -> Self {
        Self {
            override_threshold,
            fallback,
        }
    }

    /// Length, subsection completeness and heading structure; nothing content-specific.
    pub fn structural_score(context: &AlignmentContext<'_>) -> f64 {
        let mut criteria = BTreeMap::new();
        if let Some(score) = HeuristicScorer::completeness(context.draft_text, context.section) {
            criteria.insert(COMPLETENESS.to_string(), score);
        }
        criteria.insert(
            STRUCTURE.to_string(),
            HeuristicScorer::structure(context.draft_text, context.section),
        );
        CriterionWeights::default()
            .combine(&criteria)
            .unwrap_or(0.0)
    }
}

impl AlignmentStrategy for ContentHeuristic {
    fn methodology(&self) -> Methodology {
        Methodology::ContentHeuristic
    }

    fn combine(&self, inputs: &[ScoreInput], context: &AlignmentContext<'_>) -> Combined {
        let (min, max) = spread(inputs);
        if max - min > self.override_threshold {
            Combined {
                value: Self::structural_score(context),
                methodology: Methodology::ContentHeuristic,
            }
        } else {
            self.fallback.combine(inputs, context)
        }
    }
}

/// Aligner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default = "default_methodology")]
    pub methodology: Methodology,

    /// Largest allowed distance between the aligned value and the lowest raw input
    #[serde(default = "default_max_delta")]
    pub max_delta: f64,

    /// Per-source weights for the weighted average
    #[serde(default)]
    pub source_weights: BTreeMap<String, f64>,

    /// Divergence above which the content heuristic overrides the raw inputs
    #[serde(default = "default_override_threshold")]
    pub override_threshold: f64,

    /// Divergence up to this is high confidence
    #[serde(default = "default_high_confidence_max")]
    pub high_confidence_max: f64,

    /// Divergence up to this is medium confidence; above is low
    #[serde(default = "default_medium_confidence_max")]
    pub medium_confidence_max: f64,
}

fn default_methodology() -> Methodology {
    Methodology::CategoryAdjusted
}

fn default_max_delta() -> f64 {
    15.0
}

fn default_override_threshold() -> f64 {
    20.0
}

fn default_high_confidence_max() -> f64 {
    10.0
}

fn default_medium_confidence_max() -> f64 {
    20.0
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            methodology: default_methodology(),
            max_delta: default_max_delta(),
            source_weights: BTreeMap::new(),
            override_threshold: default_override_threshold(),
            high_confidence_max: default_high_confidence_max(),
            medium_confidence_max: default_medium_confidence_max(),
        }
    }
}

impl AlignmentConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.max_delta.is_finite() || self.max_delta < 0.0 {
            return Err("max_delta must be a non-negative number".to_string());
        }
        if self.source_weights.values().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("source weights must be finite and non-negative".to_string());
        }
        if !(0.0 <= self.high_confidence_max && self.high_confidence_max <= self.medium_confidence_max)
        {
            return Err(
                "confidence bands must satisfy 0 <= high_confidence_max <= medium_confidence_max"
                    .to_string(),
            );
        }
        if !self.override_threshold.is_finite() || self.override_threshold < 0.0 {
            return Err("override_threshold must be a non-negative number".to_string());
        }
        Ok(())
    }

    pub fn confidence_for(&self, divergence: f64) -> Confidence {
        if divergence <= self.high_confidence_max {
            Confidence::High
        } else if divergence <= self.medium_confidence_max {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Applies the configured strategy and enforces output bounds.
pub struct QualityAligner {
    config: AlignmentConfig,
    strategy: Box<dyn AlignmentStrategy>,
}

impl fmt::Debug for QualityAligner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityAligner")
            .field("config", &self.config)
            .field("methodology", &self.strategy.methodology())
            .finish()
    }
}

impl Default for QualityAligner {
    fn default() -> Self {
        Self::new(AlignmentConfig::default())
    }
}

impl QualityAligner {
    pub fn new(config: AlignmentConfig) -> Self {
        let weighted = WeightedAverage::new(config.source_weights.clone());
        let strategy: Box<dyn AlignmentStrategy> = match config.methodology {
            Methodology::WeightedAverage => Box::new(weighted),
            Methodology::CategoryAdjusted => Box::new(CategoryAdjusted),
            Methodology::ContentHeuristic => {
                Box::new(ContentHeuristic::new(config.override_threshold, weighted))
            }
        };
        Self { config, strategy }
    }

    /// Use a custom strategy with the bounds from `config`.
    pub fn with_strategy(config: AlignmentConfig, strategy: Box<dyn AlignmentStrategy>) -> Self {
        Self { config, strategy }
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    pub fn methodology(&self) -> Methodology {
        self.strategy.methodology()
    }

    pub fn align(&self, inputs: &[ScoreInput], context: &AlignmentContext<'_>) -> AlignedScore {
        let sanitized: Vec<ScoreInput> = inputs
            .iter()
            .filter(|i| i.overall.is_finite())
            .map(|i| ScoreInput {
                source: i.source.clone(),
                overall: i.overall.clamp(0.0, 100.0),
                criteria: i
                    .criteria
                    .iter()
                    .filter(|(_, v)| v.is_finite())
                    .map(|(k, v)| (k.clone(), v.clamp(0.0, 100.0)))
                    .collect(),
            })
            .collect();

        if sanitized.is_empty() {
            return AlignedScore {
                value: 0.0,
                methodology: self.strategy.methodology(),
                confidence: Confidence::Low,
                divergence: 0.0,
                raw_inputs: sanitized,
            };
        }

        let (min, max) = spread(&sanitized);
        let divergence = max - min;
        let combined = self.strategy.combine(&sanitized, context);
        let candidate = if combined.value.is_finite() {
            combined.value
        } else {
            min
        };
        let value = candidate
            .clamp(min - self.config.max_delta, min + self.config.max_delta)
            .clamp(0.0, 100.0);
        let confidence = self.config.confidence_for(divergence);

        debug!(
            methodology = %combined.methodology,
            value,
            divergence,
            confidence = %confidence,
            inputs = sanitized.len(),
            "Scores aligned"
        );

        AlignedScore {
            value,
            methodology: combined.methodology,
            confidence,
            divergence,
            raw_inputs: sanitized,
        }
    }
}
