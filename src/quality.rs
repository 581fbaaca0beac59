//! Quality Assessor
//!
//! Scores a draft per criterion and against a pass threshold. Scorers are collaborators
//! behind [`ContentScorer`]; the assessor sanitizes whatever they return so a report's
//! scores are always finite and within `[0, 100]`.

use crate::error::ScoringError;
use crate::phase::Phase;
use crate::types::{FactSheet, QualityTier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

pub const COMPLETENESS: &str = "completeness";
pub const STRUCTURE: &str = "structure";
pub const RELEVANCE: &str = "relevance";
pub const GRAMMAR: &str = "grammar";

/// What a section is expected to contain. Built once per phase and handed to scorers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionBrief {
    pub section: String,
    pub title: String,
    pub expected_subsections: Vec<String>,
    pub min_words: usize,
    /// Salient repository terms a relevant draft should mention
    pub highlights: Vec<String>,
}

impl SectionBrief {
    pub fn new(phase: &Phase, facts: &FactSheet) -> Self {
        Self {
            section: phase.section().to_string(),
            title: phase.title(),
            expected_subsections: phase.expected_subsections.clone(),
            min_words: phase.min_words,
            highlights: facts.highlights(),
        }
    }
}

/// Scores as returned by a scorer, before sanitizing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawScore {
    #[serde(default)]
    pub criteria: BTreeMap<String, f64>,
    /// Scorer's own overall; recomputed from criteria when absent or not finite
    #[serde(default)]
    pub overall: Option<f64>,
}

/// Independent scoring path for draft content.
pub trait ContentScorer {
    /// Name reported in alignment inputs (e.g. `heuristic`, `provider`)
    fn source(&self) -> &str;

    fn score_content(&self, draft_text: &str, section: &SectionBrief) -> Result<RawScore, ScoringError>;
}

/// Per-criterion weights for the overall score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionWeights {
    #[serde(default = "default_completeness_weight")]
    pub completeness: f64,
    #[serde(default = "default_structure_weight")]
    pub structure: f64,
    #[serde(default = "default_relevance_weight")]
    pub relevance: f64,
    #[serde(default = "default_grammar_weight")]
    pub grammar: f64,
}

fn default_completeness_weight() -> f64 {
    0.35
}

fn default_structure_weight() -> f64 {
    0.25
}

fn default_relevance_weight() -> f64 {
    0.25
}

fn default_grammar_weight() -> f64 {
    0.15
}

impl Default for CriterionWeights {
    fn default() -> Self {
        Self {
            completeness: default_completeness_weight(),
            structure: default_structure_weight(),
            relevance: default_relevance_weight(),
            grammar: default_grammar_weight(),
        }
    }
}

impl CriterionWeights {
    /// Weight for a criterion; unknown criteria count with weight 1/4.
    pub fn weight(&self, criterion: &str) -> f64 {
        match criterion {
            COMPLETENESS => self.completeness,
            STRUCTURE => self.structure,
            RELEVANCE => self.relevance,
            GRAMMAR => self.grammar,
            _ => 0.25,
        }
    }

    /// Weighted mean over the criteria present; `None` when nothing has weight.
    pub fn combine(&self, criteria: &BTreeMap<String, f64>) -> Option<f64> {
        let mut total = 0.0;
        let mut weight_sum = 0.0;
        for (name, score) in criteria {
            let weight = self.weight(name);
            if weight > 0.0 {
                total += score * weight;
                weight_sum += weight;
            }
        }
        if weight_sum > 0.0 {
            Some(total / weight_sum)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let all = [self.completeness, self.structure, self.relevance, self.grammar];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("Criterion weights must be finite and non-negative".to_string());
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err("At least one criterion weight must be positive".to_string());
        }
        Ok(())
    }
}

/// Score boundaries for each quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_medium")]
    pub medium: f64,
    #[serde(default = "default_basic")]
    pub basic: f64,
}

fn default_high() -> f64 {
    85.0
}

fn default_medium() -> f64 {
    70.0
}

fn default_basic() -> f64 {
    50.0
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            high: default_high(),
            medium: default_medium(),
            basic: default_basic(),
        }
    }
}

impl TierThresholds {
    pub fn tier_for(&self, score: f64) -> QualityTier {
        if score >= self.high {
            QualityTier::High
        } else if score >= self.medium {
            QualityTier::Medium
        } else if score >= self.basic {
            QualityTier::Basic
        } else {
            QualityTier::Fallback
        }
    }

    pub fn threshold_for(&self, tier: QualityTier) -> f64 {
        match tier {
            QualityTier::High => self.high,
            QualityTier::Medium => self.medium,
            QualityTier::Basic => self.basic,
            QualityTier::Fallback => 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let ordered = 0.0 <= self.basic
            && self.basic < self.medium
            && self.medium < self.high
            && self.high <= 100.0;
        if !ordered {
            return Err(format!(
                "Tier thresholds must satisfy 0 <= basic < medium < high <= 100 (got basic={}, medium={}, high={})",
                self.basic, self.medium, self.high
            ));
        }
        Ok(())
    }
}

/// Quality settings: tier boundaries, pass tier, criterion weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default)]
    pub tiers: TierThresholds,

    /// Tier a draft must reach to pass validation
    #[serde(default = "default_pass_tier")]
    pub pass_tier: QualityTier,

    #[serde(default)]
    pub weights: CriterionWeights,
}

fn default_pass_tier() -> QualityTier {
    QualityTier::Medium
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            tiers: TierThresholds::default(),
            pass_tier: default_pass_tier(),
            weights: CriterionWeights::default(),
        }
    }
}

impl QualityConfig {
    pub fn pass_threshold(&self) -> f64 {
        self.tiers.threshold_for(self.pass_tier)
    }
}

/// Immutable result of one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub criteria_scores: BTreeMap<String, f64>,
    pub overall: f64,
    pub passed: bool,
    pub threshold_used: f64,
}

impl QualityReport {
    /// Criteria below `threshold`, lowest first.
    pub fn failing_criteria(&self, threshold: f64) -> Vec<(&str, f64)> {
        let mut failing: Vec<(&str, f64)> = self
            .criteria_scores
            .iter()
            .filter(|(_, score)| **score < threshold)
            .map(|(name, score)| (name.as_str(), *score))
            .collect();
        failing.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(b.0)));
        failing
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityAssessor {
    config: QualityConfig,
}

impl QualityAssessor {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn threshold(&self) -> f64 {
        self.config.pass_threshold()
    }

    pub fn tier_for(&self, score: f64) -> QualityTier {
        self.config.tiers.tier_for(score)
    }

    /// Turn a raw score into a report. Non-finite criteria are dropped (treated as not
    /// computable); the rest are clamped into `[0, 100]`.
    pub fn assess(&self, raw: &RawScore) -> QualityReport {
        let mut criteria_scores = BTreeMap::new();
        for (name, score) in &raw.criteria {
            if score.is_finite() {
                criteria_scores.insert(name.clone(), score.clamp(0.0, 100.0));
            } else {
                warn!(criterion = %name, "Dropping non-finite criterion score");
            }
        }

        let overall = raw
            .overall
            .filter(|o| o.is_finite())
            .or_else(|| self.config.weights.combine(&criteria_scores))
            .unwrap_or(0.0)
            .clamp(0.0, 100.0);

        let threshold_used = self.threshold();
        QualityReport {
            criteria_scores,
            overall,
            passed: overall >= threshold_used,
            threshold_used,
        }
    }

    /// Score `draft_text` with `scorer` and assess the result.
    pub fn assess_with(
        &self,
        scorer: &dyn ContentScorer,
        draft_text: &str,
        section: &SectionBrief,
    ) -> Result<QualityReport, ScoringError> {
        let raw = scorer.score_content(draft_text, section)?;
        Ok(self.assess(&raw))
    }
}

/// Structural heuristics: word count, headings, highlight coverage, punctuation.
#[derive(Debug, Clone, Default)]
pub struct HeuristicScorer {
    weights: CriterionWeights,
}

impl HeuristicScorer {
    pub fn new(weights: CriterionWeights) -> Self {
        Self { weights }
    }

    fn headings(text: &str) -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|l| l.starts_with('#'))
            .map(|l| l.trim_start_matches('#').trim().to_lowercase())
            .collect()
    }

    fn prose_lines(text: &str) -> Vec<&str> {
        let mut in_code = false;
        text.lines()
            .map(str::trim)
            .filter(|l| {
                if l.starts_with("```") {
                    in_code = !in_code;
                    return false;
                }
                !in_code
                    && !l.is_empty()
                    && !l.starts_with('#')
                    && !l.starts_with('-')
                    && !l.starts_with('*')
                    && !l.starts_with('|')
                    && !l.starts_with('>')
            })
            .collect()
    }

    pub fn completeness(text: &str, section: &SectionBrief) -> Option<f64> {
        let mut ratios = Vec::new();
        if section.min_words > 0 {
            let words = text.split_whitespace().count() as f64;
            ratios.push((words / section.min_words as f64).min(1.0));
        }
        if !section.expected_subsections.is_empty() {
            let headings = Self::headings(text);
            let present = section
                .expected_subsections
                .iter()
                .filter(|s| headings.iter().any(|h| h.contains(&s.to_lowercase())))
                .count();
            ratios.push(present as f64 / section.expected_subsections.len() as f64);
        }
        if ratios.is_empty() {
            return None;
        }
        Some(100.0 * ratios.iter().sum::<f64>() / ratios.len() as f64)
    }

    pub fn structure(text: &str, section: &SectionBrief) -> f64 {
        let headings = Self::headings(text);
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let mut score = 0.0;

        if lines.iter().find(|l| !l.is_empty()).is_some_and(|l| l.starts_with('#')) {
            score += 30.0;
        }

        let subsection_headings = lines.iter().filter(|l| l.starts_with("###")).count();
        let coverage = if section.expected_subsections.is_empty() {
            if subsection_headings > 0 || headings.len() > 1 {
                1.0
            } else {
                0.0
            }
        } else {
            (subsection_headings as f64 / section.expected_subsections.len() as f64).min(1.0)
        };
        score += 40.0 * coverage;

        let paragraphs: Vec<usize> = text
            .split("\n\n")
            .map(|p| p.split_whitespace().count())
            .filter(|n| *n > 0)
            .collect();
        if !paragraphs.is_empty() {
            let longest = paragraphs.iter().copied().max().unwrap_or(0);
            if longest <= 150 {
                score += 15.0;
            }
        }

        // a heading followed directly by another heading is an empty section
        let mut empty_sections = 0;
        let mut last_was_heading = false;
        for line in lines.iter().filter(|l| !l.is_empty()) {
            let heading = line.starts_with('#');
            if heading && last_was_heading {
                empty_sections += 1;
            }
            last_was_heading = heading;
        }
        if last_was_heading {
            empty_sections += 1;
        }
        if empty_sections == 0 && !headings.is_empty() {
            score += 15.0;
        }
        score
    }

    pub fn relevance(text: &str, section: &SectionBrief) -> Option<f64> {
        if section.highlights.is_empty() {
            return None;
        }
        let lower = text.to_lowercase();
        let found = section
            .highlights
            .iter()
            .filter(|h| lower.contains(&h.to_lowercase()))
            .count();
        let wanted = section.highlights.len().min(8);
        Some(100.0 * (found as f64 / wanted as f64).min(1.0))
    }

    pub fn grammar(text: &str) -> Option<f64> {
        let prose = Self::prose_lines(text);
        if prose.is_empty() {
            return None;
        }
        let well_formed = prose
            .iter()
            .filter(|line| {
                let starts_ok = line
                    .chars()
                    .next()
                    .map(|c| !c.is_alphabetic() || c.is_uppercase())
                    .unwrap_or(false);
                let ends_ok = line.ends_with(['.', '!', '?', ':', ')', '`']);
                starts_ok && ends_ok && !line.contains("  ")
            })
            .count();
        Some(100.0 * well_formed as f64 / prose.len() as f64)
    }
}

impl ContentScorer for HeuristicScorer {
    fn source(&self) -> &str {
        "heuristic"
    }

    fn score_content(&self, draft_text: &str, section: &SectionBrief) -> Result<RawScore, ScoringError> {
        let mut criteria = BTreeMap::new();
        if draft_text.trim().is_empty() {
            criteria.insert(COMPLETENESS.to_string(), 0.0);
            criteria.insert(STRUCTURE.to_string(), 0.0);
            return Ok(RawScore {
                criteria,
                overall: Some(0.0),
            });
        }

        if let Some(score) = Self::completeness(draft_text, section) {
            criteria.insert(COMPLETENESS.to_string(), score);
        }
        criteria.insert(STRUCTURE.to_string(), Self::structure(draft_text, section));
        if let Some(score) = Self::relevance(draft_text, section) {
            criteria.insert(RELEVANCE.to_string(), score);
        }
        if let Some(score) = Self::grammar(draft_text) {
            criteria.insert(GRAMMAR.to_string(), score);
        }

        let overall = self.weights.combine(&criteria);
        Ok(RawScore { criteria, overall })
    }
}
