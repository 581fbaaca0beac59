//! Shared test utilities for integration tests
//!
//! Scripted collaborators (tools, generator, scorer) driven by a manual clock, plus
//! environment isolation for configuration tests.

use docpace::budget::{ManualClock, StatusThresholds, TimeBudgetTracker};
use docpace::error::{GenerationError, ScoringError, ToolError};
use docpace::generation::{ContentGenerator, Feedback};
use docpace::phase::Phase;
use docpace::quality::{ContentScorer, RawScore, SectionBrief};
use docpace::types::{FactSheet, RepositoryHandle};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Tracker on a manual clock with `elapsed_secs` already charged by the host.
pub fn manual_tracker(total_secs: u64, elapsed_secs: u64) -> (TimeBudgetTracker, ManualClock) {
    let clock = ManualClock::new();
    let mut tracker = TimeBudgetTracker::with_clock(
        Box::new(clock.clone()),
        Duration::from_secs(total_secs),
        StatusThresholds::default(),
    );
    if elapsed_secs > 0 {
        tracker.charge(Duration::from_secs(elapsed_secs));
    }
    (tracker, clock)
}

pub fn repo() -> RepositoryHandle {
    RepositoryHandle::new("/work/sample-repo")
}

/// Tools that cost `cost_secs` of manual-clock time per call.
pub struct ScriptedTools {
    clock: ManualClock,
    cost_secs: u64,
    responses: BTreeMap<String, Result<Value, String>>,
    pub calls: RefCell<Vec<String>>,
}

impl ScriptedTools {
    /// Every tool succeeds with facts that satisfy the default phases' requirements.
    pub fn healthy(clock: &ManualClock, cost_secs: u64) -> Self {
        let mut responses = BTreeMap::new();
        responses.insert(
            "file_inventory".to_string(),
            Ok(json!({ "total_files": 42, "languages": ["rust"], "highlights": ["rust"] })),
        );
        responses.insert(
            "manifest_scan".to_string(),
            Ok(json!({ "project_name": "sample", "highlights": ["sample", "serde"] })),
        );
        responses.insert(
            "source_outline".to_string(),
            Ok(json!({
                "source_files": 12,
                "modules": [{ "path": "src", "files": 12, "lines": 900 }],
            })),
        );
        Self {
            clock: clock.clone(),
            cost_secs,
            responses,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn respond(mut self, tool: &str, facts: Value) -> Self {
        self.responses.insert(tool.to_string(), Ok(facts));
        self
    }

    pub fn failing(mut self, tool: &str, message: &str) -> Self {
        self.responses
            .insert(tool.to_string(), Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl docpace::tools::ToolRunner for ScriptedTools {
    fn run_tool(&self, tool_name: &str, _repo: &RepositoryHandle) -> Result<Value, ToolError> {
        self.calls.borrow_mut().push(tool_name.to_string());
        self.clock.advance_secs(self.cost_secs);
        match self.responses.get(tool_name) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(ToolError::Failed {
                tool: tool_name.to_string(),
                message: message.clone(),
            }),
            None => Ok(json!({ "tool": tool_name })),
        }
    }
}

/// Generator that records the feedback it receives.
pub struct RecordingGenerator {
    clock: ManualClock,
    cost_secs: u64,
    pub feedback: RefCell<Vec<(String, Option<Feedback>)>>,
}

impl RecordingGenerator {
    pub fn new(clock: &ManualClock, cost_secs: u64) -> Self {
        Self {
            clock: clock.clone(),
            cost_secs,
            feedback: RefCell::new(Vec::new()),
        }
    }

    /// Feedback passed on regeneration calls, in order.
    pub fn retries(&self) -> Vec<Feedback> {
        self.feedback
            .borrow()
            .iter()
            .filter_map(|(_, feedback)| feedback.clone())
            .collect()
    }
}

impl ContentGenerator for RecordingGenerator {
    fn generate_content(
        &self,
        phase: &Phase,
        _facts: &FactSheet,
        feedback: Option<&Feedback>,
    ) -> Result<String, GenerationError> {
        self.clock.advance_secs(self.cost_secs);
        self.feedback
            .borrow_mut()
            .push((phase.name.clone(), feedback.cloned()));
        let attempt = feedback.map(|f| f.attempt).unwrap_or(1);
        Ok(format!(
            "## {}\n\nDraft {} of the {} section.",
            phase.title(),
            attempt,
            phase.name
        ))
    }
}

/// Scorer replaying scripted scores; the last one repeats forever.
pub struct ScriptedScorer {
    source: String,
    scores: RefCell<VecDeque<RawScore>>,
    pub calls: RefCell<usize>,
}

impl ScriptedScorer {
    pub fn new(source: &str, scores: Vec<RawScore>) -> Self {
        Self {
            source: source.to_string(),
            scores: RefCell::new(scores.into()),
            calls: RefCell::new(0),
        }
    }

    pub fn passing() -> Self {
        Self::new("scripted", vec![overall(90.0)])
    }
}

impl ContentScorer for ScriptedScorer {
    fn source(&self) -> &str {
        &self.source
    }

    fn score_content(&self, _draft: &str, _section: &SectionBrief) -> Result<RawScore, ScoringError> {
        *self.calls.borrow_mut() += 1;
        let mut scores = self.scores.borrow_mut();
        let next = if scores.len() > 1 {
            scores.pop_front()
        } else {
            scores.front().cloned()
        };
        next.ok_or_else(|| ScoringError::Failed("no scripted score".to_string()))
    }
}

pub fn overall(score: f64) -> RawScore {
    RawScore {
        criteria: BTreeMap::new(),
        overall: Some(score),
    }
}

pub fn criteria(pairs: &[(&str, f64)]) -> RawScore {
    RawScore {
        criteria: pairs
            .iter()
            .map(|(name, score)| (name.to_string(), *score))
            .collect(),
        overall: None,
    }
}

/// Global mutex to serialize environment variable access across tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Run `f` with XDG_CONFIG_HOME pointed at a fresh temp dir and DOCPACE_* cleared.
/// The original environment is restored afterwards.
pub fn with_isolated_env<F, R>(f: F) -> R
where
    F: FnOnce(&TempDir) -> R,
{
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let keys = ["XDG_CONFIG_HOME", "DOCPACE_ENV"];
    let saved: Vec<(String, Option<String>)> = keys
        .iter()
        .map(|k| (k.to_string(), std::env::var(k).ok()))
        .chain(
            std::env::vars()
                .filter(|(k, _)| k.starts_with("DOCPACE__"))
                .map(|(k, v)| (k, Some(v))),
        )
        .collect();

    let temp_dir = TempDir::new().unwrap();
    let xdg = temp_dir.path().join("xdg");
    std::fs::create_dir_all(&xdg).unwrap();
    std::env::set_var("XDG_CONFIG_HOME", &xdg);
    std::env::remove_var("DOCPACE_ENV");
    for (key, _) in std::env::vars().filter(|(k, _)| k.starts_with("DOCPACE__")) {
        std::env::remove_var(key);
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&temp_dir)));

    for (key, _) in std::env::vars().filter(|(k, _)| k.starts_with("DOCPACE__")) {
        std::env::remove_var(key);
    }
    for (key, value) in saved {
        match value {
            Some(value) => std::env::set_var(&key, value),
            None => std::env::remove_var(&key),
        }
    }

    match result {
        Ok(result) => result,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

/// A small Rust checkout on disk for the built-in tools.
pub fn sample_checkout() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for sub in ["src/planner", "tests", "docs"] {
        std::fs::create_dir_all(root.join(sub)).unwrap();
    }
    std::fs::write(
        root.join("Cargo.toml"),
        r#"[package]
name = "sample"
version = "0.1.0"
description = "A sample crate for scheduling documentation work"

[dependencies]
serde = "1.0"
tokio = { version = "1", features = ["rt"] }
"#,
    )
    .unwrap();
    std::fs::write(
        root.join("README.md"),
        "# Sample\n\nSample schedules documentation work within a deadline.\n\n## Usage\n\nRun it.\n",
    )
    .unwrap();
    std::fs::write(
        root.join("src/lib.rs"),
        "pub mod planner;\n\npub fn run() {}\n\n#[cfg(test)]\nmod tests {\n    #[test]\n    fn runs() {}\n}\n",
    )
    .unwrap();
    std::fs::write(root.join("src/main.rs"), "fn main() { sample::run(); }\n").unwrap();
    std::fs::write(
        root.join("src/planner/mod.rs"),
        "pub struct Planner;\n\nimpl Planner {\n    pub fn new() -> Self { Planner }\n}\n",
    )
    .unwrap();
    std::fs::write(
        root.join("tests/smoke.rs"),
        "#[test]\nfn smoke() {\n    sample::run();\n}\n",
    )
    .unwrap();
    std::fs::write(root.join("docs/guide.md"), "# Guide\n\nHow to use it.\n").unwrap();
    std::fs::write(root.join("LICENSE"), "MIT\n").unwrap();
    dir
}
