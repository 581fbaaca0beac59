//! CLI parse: clap types for docpace. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// docpace CLI - Deadline-aware documentation analysis
#[derive(Parser)]
#[command(name = "docpace")]
#[command(about = "Deadline-aware repository documentation analysis with quality escalation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root used to locate docpace.toml and config/{env}.toml
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Print only the generated documentation
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one analysis invocation against a local checkout
    Analyze {
        /// Repository checkout to analyze
        #[arg(default_value = ".")]
        path: PathBuf,
        /// complete, progressive, or a phase name
        #[arg(long)]
        mode: Option<String>,
        /// Override the total time budget in seconds
        #[arg(long)]
        budget_secs: Option<u64>,
        /// Seconds already consumed by the host before this invocation
        #[arg(long, default_value = "0")]
        elapsed_secs: u64,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
        /// Never call the model provider, even when configured
        #[arg(long)]
        offline: bool,
    },
    /// List the configured phase catalog
    Phases {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the budget status report and the phases it would schedule
    Budget {
        /// Seconds already consumed
        #[arg(long, default_value = "0")]
        elapsed_secs: u64,
        /// Override the total time budget in seconds
        #[arg(long)]
        budget_secs: Option<u64>,
        /// complete, progressive, or a phase name
        #[arg(long)]
        mode: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
