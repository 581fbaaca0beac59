//! Phase Executor
//!
//! Runs one phase: gathers facts with the phase's tools, then asks the generator for
//! the first draft. Tool failures become gaps in the fact sheet and never abort the
//! phase. Facts are cached per invocation, so a tool shared by several phases runs once.

use crate::budget::TimeBudgetTracker;
use crate::error::GenerationError;
use crate::generation::{ContentGenerator, Feedback};
use crate::phase::Phase;
use crate::tools::ToolRunner;
use crate::types::{DraftContent, FactSheet, RepositoryHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Trace entry appended for every executed phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTrace {
    pub phase: String,
    pub tools_ok: Vec<String>,
    pub tools_failed: Vec<String>,
    /// Tools whose earlier result (or gap) was reused
    pub tools_cached: Vec<String>,
    pub duration_ms: u64,
    pub draft_produced: bool,
}

/// What executing a phase yields besides its trace entry.
#[derive(Debug, Clone, Default)]
pub struct PhaseExecution {
    /// `None` when the generator failed on both attempts
    pub draft: Option<DraftContent>,
    pub warnings: Vec<String>,
}

/// Generate section text, retrying once with identical input on an error or empty
/// result.
pub fn generate_draft_text(
    generator: &dyn ContentGenerator,
    phase: &Phase,
    facts: &FactSheet,
    feedback: Option<&Feedback>,
) -> Result<String, GenerationError> {
    let mut last_error = GenerationError::EmptyDraft(phase.section().to_string());
    for attempt in 1..=2 {
        match generator.generate_content(phase, facts, feedback) {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => {
                warn!(phase = %phase.name, attempt, "Generator returned empty text");
                last_error = GenerationError::EmptyDraft(phase.section().to_string());
            }
            Err(err) => {
                warn!(phase = %phase.name, attempt, error = %err, "Generation failed");
                last_error = err;
            }
        }
    }
    Err(last_error)
}

pub struct PhaseExecutor<'a> {
    tools: &'a dyn ToolRunner,
    generator: &'a dyn ContentGenerator,
}

impl<'a> PhaseExecutor<'a> {
    pub fn new(tools: &'a dyn ToolRunner, generator: &'a dyn ContentGenerator) -> Self {
        Self { tools, generator }
    }

    /// Gather facts into `facts`, produce the initial draft, append one trace entry.
    pub fn execute(
        &self,
        tracker: &TimeBudgetTracker,
        repo: &RepositoryHandle,
        phase: &Phase,
        facts: &mut FactSheet,
        trace: &mut Vec<PhaseTrace>,
    ) -> PhaseExecution {
        let started = tracker.elapsed();
        let mut entry = PhaseTrace {
            phase: phase.name.clone(),
            tools_ok: Vec::new(),
            tools_failed: Vec::new(),
            tools_cached: Vec::new(),
            duration_ms: 0,
            draft_produced: false,
        };
        let mut execution = PhaseExecution::default();

        for tool in &phase.required_tools {
            if facts.has_attempted(tool) {
                debug!(phase = %phase.name, tool = %tool, "Reusing cached tool result");
                entry.tools_cached.push(tool.clone());
                continue;
            }
            match self.tools.run_tool(tool, repo) {
                Ok(value) => {
                    facts.record(tool.clone(), value);
                    entry.tools_ok.push(tool.clone());
                }
                Err(err) => {
                    warn!(phase = %phase.name, tool = %tool, error = %err, "Tool failed; recording gap");
                    facts.record_gap(tool.clone(), err.to_string());
                    entry.tools_failed.push(tool.clone());
                    execution
                        .warnings
                        .push(format!("Tool '{}' failed in phase '{}': {}", tool, phase.name, err));
                }
            }
        }

        match generate_draft_text(self.generator, phase, facts, None) {
            Ok(text) => {
                execution.draft = Some(DraftContent::new(phase.section(), &phase.name, text));
                entry.draft_produced = true;
            }
            Err(err) => execution.warnings.push(format!(
                "Generation failed for section '{}': {}",
                phase.section(),
                err
            )),
        }

        entry.duration_ms = tracker.elapsed().saturating_sub(started).as_millis() as u64;
        info!(
            phase = %phase.name,
            tools_ok = entry.tools_ok.len(),
            tools_failed = entry.tools_failed.len(),
            tools_cached = entry.tools_cached.len(),
            duration_ms = entry.duration_ms,
            draft = entry.draft_produced,
            "Phase executed"
        );
        trace.push(entry);
        execution
    }
}
