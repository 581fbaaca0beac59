//! CLI route: single route table and run context. Dispatches to the pipeline and
//! presentation.

use crate::budget::TimeBudgetTracker;
use crate::cli::output::exit_code;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_analysis_json, format_analysis_text, format_budget_json, format_budget_text,
    format_phases_json, format_phases_text,
};
use crate::config::{validation_failure, ConfigLoader, DocpaceConfig};
use crate::error::ApiError;
use crate::generation::{ContentGenerator, TemplateGenerator};
use crate::pipeline::AnalysisPipeline;
use crate::planner::{AnalysisSelector, Checkpoint, PhasePlanner};
use crate::provider::{BlockingProvider, ProviderGenerator, ProviderScorer};
use crate::quality::{ContentScorer, HeuristicScorer};
use crate::tools::ToolRegistry;
use crate::types::RepositoryHandle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Rendered command result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub exit_code: i32,
}

impl CommandOutput {
    fn ok(text: String) -> Self {
        Self { text, exit_code: 0 }
    }
}

/// Runtime context for CLI execution: workspace and validated configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: DocpaceConfig,
    quiet: bool,
}

impl RunContext {
    /// Load and validate configuration. An explicit config path skips layered loading.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        quiet: bool,
    ) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Self::with_config(workspace_root, config, quiet)
    }

    pub fn with_config(
        workspace_root: PathBuf,
        config: DocpaceConfig,
        quiet: bool,
    ) -> Result<Self, ApiError> {
        config.validate().map_err(|errors| validation_failure(&errors))?;
        Ok(Self {
            workspace_root,
            config,
            quiet,
        })
    }

    pub fn config(&self) -> &DocpaceConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn execute(&self, command: &Commands) -> Result<CommandOutput, ApiError> {
        match command {
            Commands::Analyze {
                path,
                mode,
                budget_secs,
                elapsed_secs,
                format,
                offline,
            } => self.handle_analyze(
                path,
                mode.as_deref(),
                *budget_secs,
                *elapsed_secs,
                format,
                *offline,
            ),
            Commands::Phases { format } => self.handle_phases(format),
            Commands::Budget {
                elapsed_secs,
                budget_secs,
                mode,
                format,
            } => self.handle_budget(*elapsed_secs, *budget_secs, mode.as_deref(), format),
        }
    }

    fn tracker(&self, budget_secs: Option<u64>, elapsed_secs: u64) -> TimeBudgetTracker {
        let mut budget = self.config.budget.clone();
        if let Some(secs) = budget_secs {
            budget.total_budget_secs = secs;
        }
        let mut tracker = budget.tracker();
        if elapsed_secs > 0 {
            tracker.charge(Duration::from_secs(elapsed_secs));
        }
        tracker
    }

    fn handle_analyze(
        &self,
        path: &Path,
        mode: Option<&str>,
        budget_secs: Option<u64>,
        elapsed_secs: u64,
        format: &str,
        offline: bool,
    ) -> Result<CommandOutput, ApiError> {
        let root = path.canonicalize().map_err(|e| {
            ApiError::ConfigError(format!("Cannot open repository {}: {}", path.display(), e))
        })?;
        let repo = RepositoryHandle::new(root);

        let tools = ToolRegistry::with_builtins();
        let template = TemplateGenerator::new();
        let heuristic = HeuristicScorer::new(self.config.quality.weights.clone());

        let provider = if self.config.provider.enabled && !offline {
            Some(Arc::new(BlockingProvider::from_config(&self.config.provider)?))
        } else {
            None
        };
        let provider_generator = provider.clone().map(ProviderGenerator::new);
        let provider_scorer = provider.clone().map(ProviderScorer::new);

        let generator: &dyn ContentGenerator = match &provider_generator {
            Some(generator) => generator,
            None => &template,
        };
        let mut scorers: Vec<&dyn ContentScorer> = vec![&heuristic];
        if let Some(scorer) = &provider_scorer {
            scorers.push(scorer);
        }

        info!(
            repository = %repo.name,
            provider = provider.as_ref().map(|p| p.model_name()).unwrap_or("none"),
            scorers = scorers.len(),
            "Running analysis"
        );
        let pipeline = AnalysisPipeline::new(
            self.config.pipeline_settings()?,
            &tools,
            generator,
            scorers,
        );
        let mut tracker = self.tracker(budget_secs, elapsed_secs);
        let outcome = pipeline.run(&mut tracker, &repo, mode);

        if let Some(provider) = &provider {
            info!(total_tokens = provider.usage().total_tokens, "Provider usage");
        }

        let text = if format == "json" {
            format_analysis_json(&outcome)?
        } else {
            format_analysis_text(&outcome, self.quiet)
        };
        Ok(CommandOutput {
            text,
            exit_code: exit_code(outcome.result.success),
        })
    }

    fn handle_phases(&self, format: &str) -> Result<CommandOutput, ApiError> {
        let catalog = self.config.catalog()?;
        let text = if format == "json" {
            format_phases_json(&catalog)?
        } else {
            format_phases_text(&catalog)
        };
        Ok(CommandOutput::ok(text))
    }

    fn handle_budget(
        &self,
        elapsed_secs: u64,
        budget_secs: Option<u64>,
        mode: Option<&str>,
        format: &str,
    ) -> Result<CommandOutput, ApiError> {
        let tracker = self.tracker(budget_secs, elapsed_secs);
        let report = tracker.budget_status();
        let catalog = self.config.catalog()?;
        let selector = AnalysisSelector::resolve(mode, &catalog)?;
        let plan = PhasePlanner::new(self.config.planner.clone()).plan(
            &catalog,
            Checkpoint {
                status: report.status,
                remaining: tracker.remaining_budget(),
            },
            &selector,
        );
        let text = if format == "json" {
            format_budget_json(&report, &plan)?
        } else {
            format_budget_text(&report, &plan)
        };
        Ok(CommandOutput::ok(text))
    }
}
