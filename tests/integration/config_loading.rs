//! Integration tests for layered configuration and the CLI run context

use super::test_utils::{sample_checkout, with_isolated_env};
use clap::Parser;
use docpace::cli::{map_error, Cli, Commands, RunContext};
use docpace::config::{global_config_path, ConfigLoader};
use docpace::Methodology;

#[test]
fn test_global_config_resolves_under_xdg_home() {
    with_isolated_env(|temp_dir| {
        let path = global_config_path().unwrap();
        assert!(path.starts_with(temp_dir.path().join("xdg")));
        assert!(path.ends_with("docpace/config.toml"));
    });
}

#[test]
fn test_layers_merge_key_by_key() {
    with_isolated_env(|temp_dir| {
        let global_dir = temp_dir.path().join("xdg").join("docpace");
        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join("config.toml"),
            "[alignment]\nmethodology = \"content_heuristic\"\n[improvement]\nmax_retries = 3\n",
        )
        .unwrap();

        let workspace = temp_dir.path().join("workspace");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(
            workspace.join("docpace.toml"),
            "[improvement]\nmax_retries = 1\n[planner]\nabsolute_floor_secs = 45\n",
        )
        .unwrap();
        std::env::set_var("DOCPACE__PLANNER__ABSOLUTE_FLOOR_SECS", "60");

        let config = ConfigLoader::load(&workspace).unwrap();

        assert_eq!(config.alignment.methodology, Methodology::ContentHeuristic);
        assert_eq!(config.improvement.max_retries, 1);
        assert_eq!(config.planner.absolute_floor_secs, 60);
        // untouched keys keep their defaults
        assert_eq!(config.budget.total_budget_secs, 900);
        assert_eq!(config.improvement.retry_floor_secs, 90);
        assert!(config.validate().is_ok());
    });
}

#[test]
fn test_workspace_phases_drive_the_cli() {
    with_isolated_env(|_| {
        let checkout = sample_checkout();
        std::fs::write(
            checkout.path().join("docpace.toml"),
            r#"
[[phases]]
name = "summary"
priority_rank = 1
title = "Summary"
required_tools = ["manifest_scan", "docs_probe"]
expected_subsections = ["Purpose"]
min_time_secs = 30
"#,
        )
        .unwrap();

        let context = RunContext::new(checkout.path().to_path_buf(), None, true).unwrap();
        let phases = context
            .execute(&Commands::Phases {
                format: "json".to_string(),
            })
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&phases.text).unwrap();
        assert_eq!(value["phases"].as_array().unwrap().len(), 1);
        assert_eq!(value["phases"][0]["name"], "summary");

        let analysis = context
            .execute(&Commands::Analyze {
                path: checkout.path().to_path_buf(),
                mode: None,
                budget_secs: None,
                elapsed_secs: 0,
                format: "json".to_string(),
                offline: true,
            })
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&analysis.text).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(
            value["execution_info"]["phases_run"],
            serde_json::json!([{ "phase": "summary", "status": "ran" }])
        );
        assert!(value["documentation"]["summary"].is_string());
        assert_eq!(analysis.exit_code, 0);
    });
}

#[test]
fn test_invalid_workspace_config_is_rejected_with_every_error() {
    with_isolated_env(|temp_dir| {
        std::fs::write(
            temp_dir.path().join("docpace.toml"),
            "[budget]\ntotal_budget_secs = 20\n[improvement]\nmax_retries = 7\n",
        )
        .unwrap();

        let err = match RunContext::new(temp_dir.path().to_path_buf(), None, false) {
            Ok(_) => panic!("invalid configuration accepted"),
            Err(err) => err,
        };
        let message = map_error(&err);
        assert!(message.starts_with("configuration error"));
        assert!(message.contains("Planner:"));
        assert!(message.contains("Improvement:"));
    });
}

#[test]
fn test_baseline_minimum_below_floor_is_rejected() {
    with_isolated_env(|temp_dir| {
        std::fs::write(
            temp_dir.path().join("docpace.toml"),
            r#"
[[phases]]
name = "summary"
priority_rank = 1
min_time_secs = 10
"#,
        )
        .unwrap();

        let config = ConfigLoader::load(temp_dir.path()).unwrap();
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().starts_with("Planner:"));
        assert!(errors[0].to_string().contains("'summary'"));

        let err = match RunContext::new(temp_dir.path().to_path_buf(), None, true) {
            Ok(_) => panic!("baseline below the floor accepted"),
            Err(err) => err,
        };
        assert!(map_error(&err).contains("absolute_floor_secs (30)"));
    });
}

#[test]
fn test_exhausted_budget_exits_with_fallback_code() {
    with_isolated_env(|_| {
        let checkout = sample_checkout();
        let context = RunContext::new(checkout.path().to_path_buf(), None, true).unwrap();

        let output = context
            .execute(&Commands::Analyze {
                path: checkout.path().to_path_buf(),
                mode: None,
                budget_secs: Some(300),
                elapsed_secs: 290,
                format: "json".to_string(),
                offline: true,
            })
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&output.text).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["tier"], "fallback");
        assert_eq!(output.exit_code, 2);
    });
}

#[test]
fn test_cli_parses_analyze_flags() {
    let cli = Cli::try_parse_from([
        "docpace",
        "--quiet",
        "analyze",
        "/work/repo",
        "--mode",
        "reference",
        "--elapsed-secs",
        "120",
        "--format",
        "json",
        "--offline",
    ])
    .unwrap();

    assert!(cli.quiet);
    match cli.command {
        Commands::Analyze {
            path,
            mode,
            elapsed_secs,
            format,
            offline,
            budget_secs,
        } => {
            assert_eq!(path.to_str(), Some("/work/repo"));
            assert_eq!(mode.as_deref(), Some("reference"));
            assert_eq!(elapsed_secs, 120);
            assert_eq!(format, "json");
            assert!(offline);
            assert_eq!(budget_secs, None);
        }
        _ => panic!("expected analyze"),
    }
}
