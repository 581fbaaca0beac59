//! Configuration System
//!
//! Layered configuration built with the `config` crate. Later layers win:
//! merge-policy defaults, the global file, workspace files, then `DOCPACE__*`
//! environment variables. Every table is optional.

use crate::alignment::AlignmentConfig;
use crate::budget::{StatusThresholds, TimeBudgetTracker};
use crate::error::ApiError;
use crate::improvement::ImprovementConfig;
use crate::logging::LoggingConfig;
use crate::phase::{default_phases, Phase, PhaseCatalog};
use crate::pipeline::PipelineSettings;
use crate::planner::PlannerConfig;
use crate::provider::ProviderConfig;
use crate::quality::QualityConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

mod merge {
    pub mod merge_policy;
}

mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

pub use sources::global_file::global_config_path;

/// Time budget of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Hard wall-clock deadline imposed by the host, in seconds
    #[serde(default = "default_total_budget_secs")]
    pub total_budget_secs: u64,

    #[serde(default)]
    pub thresholds: StatusThresholds,
}

fn default_total_budget_secs() -> u64 {
    900
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total_budget_secs: default_total_budget_secs(),
            thresholds: StatusThresholds::default(),
        }
    }
}

impl BudgetConfig {
    pub fn total_budget(&self) -> Duration {
        Duration::from_secs(self.total_budget_secs)
    }

    /// Tracker on the system clock. Create once per execution environment.
    pub fn tracker(&self) -> TimeBudgetTracker {
        TimeBudgetTracker::new(self.total_budget(), self.thresholds)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocpaceConfig {
    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub alignment: AlignmentConfig,

    #[serde(default)]
    pub improvement: ImprovementConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    /// Phase catalog; replaces the built-in phases when present
    #[serde(default = "default_phases")]
    pub phases: Vec<Phase>,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DocpaceConfig {
    fn default() -> Self {
        Self {
            budget: BudgetConfig::default(),
            quality: QualityConfig::default(),
            alignment: AlignmentConfig::default(),
            improvement: ImprovementConfig::default(),
            planner: PlannerConfig::default(),
            phases: default_phases(),
            provider: ProviderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Budget(String),
    Quality(String),
    Alignment(String),
    Improvement(String),
    Planner(String),
    Phases(String),
    Provider(String),
    Logging(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Budget(msg) => write!(f, "Budget: {}", msg),
            ValidationError::Quality(msg) => write!(f, "Quality: {}", msg),
            ValidationError::Alignment(msg) => write!(f, "Alignment: {}", msg),
            ValidationError::Improvement(msg) => write!(f, "Improvement: {}", msg),
            ValidationError::Planner(msg) => write!(f, "Planner: {}", msg),
            ValidationError::Phases(msg) => write!(f, "Phases: {}", msg),
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl DocpaceConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.budget.total_budget_secs == 0 {
            errors.push(ValidationError::Budget(
                "total_budget_secs must be greater than zero".to_string(),
            ));
        }
        if let Err(e) = self.budget.thresholds.validate() {
            errors.push(ValidationError::Budget(e));
        }
        if self.planner.absolute_floor_secs >= self.budget.total_budget_secs {
            errors.push(ValidationError::Planner(format!(
                "absolute_floor_secs ({}) must be below total_budget_secs ({})",
                self.planner.absolute_floor_secs, self.budget.total_budget_secs
            )));
        }
        if self.improvement.retry_floor_secs < self.planner.absolute_floor_secs {
            errors.push(ValidationError::Improvement(format!(
                "retry_floor_secs ({}) must not be below absolute_floor_secs ({})",
                self.improvement.retry_floor_secs, self.planner.absolute_floor_secs
            )));
        }

        if let Err(e) = self.quality.tiers.validate() {
            errors.push(ValidationError::Quality(e));
        }
        if let Err(e) = self.quality.weights.validate() {
            errors.push(ValidationError::Quality(e));
        }
        if self.quality.pass_tier == crate::types::QualityTier::Fallback {
            errors.push(ValidationError::Quality(
                "pass_tier must be basic, medium or high".to_string(),
            ));
        }
        if let Err(e) = self.alignment.validate() {
            errors.push(ValidationError::Alignment(e));
        }
        if let Err(e) = self.improvement.validate() {
            errors.push(ValidationError::Improvement(e));
        }
        match PhaseCatalog::validate(&self.phases) {
            Err(e) => errors.push(ValidationError::Phases(e)),
            Ok(()) => {
                // enough time for the baseline must never fall under the floor
                if let Some(baseline) = self.phases.iter().find(|p| p.is_baseline()) {
                    if baseline.min_time_secs < self.planner.absolute_floor_secs {
                        errors.push(ValidationError::Planner(format!(
                            "baseline phase '{}' min_time_secs ({}) must not be below absolute_floor_secs ({})",
                            baseline.name, baseline.min_time_secs, self.planner.absolute_floor_secs
                        )));
                    }
                }
            }
        }
        if self.provider.enabled && self.provider.model.trim().is_empty() {
            errors.push(ValidationError::Provider("model cannot be empty".to_string()));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn catalog(&self) -> Result<PhaseCatalog, ApiError> {
        PhaseCatalog::new(self.phases.clone()).map_err(ApiError::ConfigError)
    }

    /// Scheduler policy for building an `AnalysisPipeline`.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings, ApiError> {
        Ok(PipelineSettings {
            catalog: self.catalog()?,
            planner: self.planner.clone(),
            quality: self.quality.clone(),
            alignment: self.alignment.clone(),
            improvement: self.improvement.clone(),
        })
    }
}

/// Join validation errors into one `ApiError`.
pub fn validation_failure(errors: &[ValidationError]) -> ApiError {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    ApiError::ConfigError(format!(
        "Configuration validation failed:\n{}",
        messages.join("\n")
    ))
}

/// Loads [`DocpaceConfig`] from the layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root`.
    pub fn load(workspace_root: &Path) -> Result<DocpaceConfig, ApiError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder
            .add_source(
                Environment::with_prefix("DOCPACE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load a single file on top of the defaults, skipping every other layer.
    pub fn load_from_file(path: &Path) -> Result<DocpaceConfig, ApiError> {
        let path = path.to_str().ok_or_else(|| {
            ApiError::ConfigError(format!("Config path is not valid UTF-8: {:?}", path))
        })?;
        let config = merge::merge_policy::builder_with_defaults()?
            .add_source(File::with_name(path).required(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Defaults only.
    pub fn defaults() -> Result<DocpaceConfig, ApiError> {
        let config: Config = merge::merge_policy::builder_with_defaults()?.build()?;
        Ok(config.try_deserialize()?)
    }
}
