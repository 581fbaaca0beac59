//! docpace: Deadline-Aware Documentation Analysis
//!
//! Decides, within a hard wall-clock budget, which repository analysis phases to run,
//! how many quality-improvement retries to spend on each section, and when to fall back
//! to a fact-derived skeleton, so every invocation returns usable documentation.

pub mod alignment;
pub mod budget;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod generation;
pub mod improvement;
pub mod logging;
pub mod phase;
pub mod pipeline;
pub mod planner;
pub mod provider;
pub mod quality;
pub mod tools;
pub mod types;

pub use alignment::{AlignedScore, AlignmentConfig, Methodology, QualityAligner, ScoreInput};
pub use budget::{BudgetReport, Clock, ManualClock, SystemClock, TimeBudgetTracker, TimeStatus};
pub use config::{ConfigLoader, DocpaceConfig};
pub use error::{ApiError, GenerationError, ScoringError, ToolError};
pub use generation::{ContentGenerator, Feedback, TemplateGenerator};
pub use phase::{Phase, PhaseCatalog};
pub use pipeline::{AnalysisOutcome, AnalysisPipeline, AnalysisResult, PipelineSettings};
pub use planner::AnalysisSelector;
pub use quality::{ContentScorer, HeuristicScorer, QualityAssessor};
pub use tools::{ToolRegistry, ToolRunner};
pub use types::{DraftContent, FactSheet, QualityTier, RepositoryHandle};
