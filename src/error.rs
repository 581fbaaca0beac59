//! Error types for the docpace analysis scheduler.
//!
//! Collaborator failures (tools, generators, scorers) have their own enums so the
//! executor and improvement loop can turn them into partial results. `ApiError` is the
//! umbrella used by configuration, the CLI and internal invariant checks.

use crate::improvement::LoopState;
use thiserror::Error;

/// Analysis tool errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not registered: {0}")]
    NotFound(String),

    #[error("Tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },

    #[error("Repository not accessible: {0}")]
    RepositoryUnavailable(String),

    #[error("Tool I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Content generation errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generator returned an empty draft for section '{0}'")]
    EmptyDraft(String),

    #[error("Generation failed: {0}")]
    Failed(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

/// Scoring path errors
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Scoring failed: {0}")]
    Failed(String),

    #[error("Malformed score payload: {0}")]
    Malformed(String),
}

/// Clock read failures. The budget tracker absorbs these; they never escape it.
#[derive(Debug, Clone, Error)]
pub enum ClockError {
    #[error("Clock unavailable: {0}")]
    Unavailable(String),
}

/// API-level errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid analysis selector: {0}")]
    InvalidSelector(String),

    #[error("Tool failure: {0}")]
    ToolFailure(#[from] ToolError),

    #[error("Generation failure: {0}")]
    GenerationFailure(#[from] GenerationError),

    #[error("Scoring failure: {0}")]
    ScoringFailure(#[from] ScoringError),

    #[error("Validation failed for section '{section}': score {score:.1} below threshold {threshold:.1}")]
    ValidationFailure {
        section: String,
        score: f64,
        threshold: f64,
    },

    #[error("Budget exhausted: {remaining_secs}s remaining, floor is {floor_secs}s")]
    BudgetExhausted { remaining_secs: u64, floor_secs: u64 },

    #[error("Illegal improvement loop transition: {from:?} -> {to:?}")]
    InvalidTransition { from: LoopState, to: LoopState },

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<ApiError> for GenerationError {
    fn from(err: ApiError) -> Self {
        GenerationError::Provider(err.to_string())
    }
}

impl From<ApiError> for ScoringError {
    fn from(err: ApiError) -> Self {
        ScoringError::Failed(err.to_string())
    }
}
