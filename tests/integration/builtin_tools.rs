//! Integration tests for the built-in analysis tools against a real checkout

use super::test_utils::sample_checkout;
use docpace::budget::StatusThresholds;
use docpace::pipeline::{AnalysisPipeline, PipelineSettings};
use docpace::quality::HeuristicScorer;
use docpace::{
    ContentScorer, RepositoryHandle, TemplateGenerator, TimeBudgetTracker, ToolError, ToolRegistry,
    ToolRunner,
};
use std::time::Duration;

#[test]
fn test_builtin_tools_describe_checkout() {
    let checkout = sample_checkout();
    let repo = RepositoryHandle::new(checkout.path());
    let registry = ToolRegistry::with_builtins();

    let inventory = registry.run_tool("file_inventory", &repo).unwrap();
    assert_eq!(inventory["primary_language"], "rust");
    assert!(inventory["total_files"].as_u64().unwrap() >= 8);

    let manifest = registry.run_tool("manifest_scan", &repo).unwrap();
    assert_eq!(manifest["project_name"], "sample");
    assert_eq!(manifest["ecosystems"], serde_json::json!(["cargo"]));

    let outline = registry.run_tool("source_outline", &repo).unwrap();
    let modules: Vec<&str> = outline["modules"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["path"].as_str())
        .collect();
    assert_eq!(modules, vec!["src", "src/planner"]);
    let entry_points: Vec<&str> = outline["entry_points"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e.as_str())
        .collect();
    assert!(entry_points.contains(&"src/lib.rs"));
    assert!(entry_points.contains(&"src/main.rs"));

    let docs = registry.run_tool("docs_probe", &repo).unwrap();
    assert_eq!(docs["readme_title"], "Sample");
    assert_eq!(docs["license"], "LICENSE");
    assert_eq!(docs["docs_dir"], true);

    let tests = registry.run_tool("test_inventory", &repo).unwrap();
    assert_eq!(tests["test_files"], 1);
    assert_eq!(tests["test_functions"], 2);
    assert_eq!(tests["inline_test_modules"], 1);
}

#[test]
fn test_unknown_tool_and_missing_repository_are_errors() {
    let registry = ToolRegistry::with_builtins();
    let repo = RepositoryHandle::new("/definitely/not/a/checkout");

    assert!(matches!(
        registry.run_tool("license_audit", &repo),
        Err(ToolError::NotFound(_))
    ));
    assert!(matches!(
        registry.run_tool("file_inventory", &repo),
        Err(ToolError::RepositoryUnavailable(_))
    ));
}

#[test]
fn test_offline_pipeline_documents_checkout() {
    let checkout = sample_checkout();
    let repo = RepositoryHandle::new(checkout.path());
    let registry = ToolRegistry::with_builtins();
    let generator = TemplateGenerator::new();
    let settings = PipelineSettings::default();
    let heuristic = HeuristicScorer::new(settings.quality.weights.clone());
    let scorers: Vec<&dyn ContentScorer> = vec![&heuristic];
    let pipeline = AnalysisPipeline::new(settings, &registry, &generator, scorers);
    let mut tracker = TimeBudgetTracker::new(Duration::from_secs(900), StatusThresholds::default());

    let outcome = pipeline.run(&mut tracker, &repo, Some("complete"));
    let result = &outcome.result;

    assert!(result.success);
    assert_eq!(result.execution_info.ran_phases().len(), 3);
    assert_eq!(result.documentation.len(), 3);
    let overview = &result.documentation["overview"];
    assert!(overview.contains("## Project Overview"));
    assert!(overview.contains("sample"));
    assert!(outcome
        .diagnostics
        .phase_trace
        .iter()
        .all(|trace| trace.tools_failed.is_empty()));
    assert_eq!(tracker.elapsed(), Duration::ZERO);
}
