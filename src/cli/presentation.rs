//! CLI presentation: text and JSON renderings of analysis, phase and budget results.

use crate::budget::{BudgetReport, TimeStatus};
use crate::error::ApiError;
use crate::phase::PhaseCatalog;
use crate::pipeline::AnalysisOutcome;
use crate::planner::PhasePlan;
use crate::types::QualityTier;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

fn to_json(value: &impl serde::Serialize) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::ConfigError(format!("Failed to serialize output: {}", e)))
}

/// Section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn styled_status(status: TimeStatus) -> String {
    match status {
        TimeStatus::Good => status.green().to_string(),
        TimeStatus::Caution | TimeStatus::Warning => status.yellow().to_string(),
        TimeStatus::Urgent | TimeStatus::Critical => status.red().to_string(),
    }
}

fn styled_tier(tier: QualityTier) -> String {
    match tier {
        QualityTier::High | QualityTier::Medium => tier.green().to_string(),
        QualityTier::Basic => tier.yellow().to_string(),
        QualityTier::Fallback => tier.red().to_string(),
    }
}

pub fn format_analysis_json(outcome: &AnalysisOutcome) -> Result<String, ApiError> {
    to_json(&outcome.result)
}

pub fn format_analysis_text(outcome: &AnalysisOutcome, quiet: bool) -> String {
    let result = &outcome.result;
    let mut out = String::new();

    if !quiet {
        out.push_str(&format!("{}\n\n", format_section_heading("Analysis")));
        let success = if result.success {
            "yes".green().to_string()
        } else {
            "no".red().to_string()
        };
        out.push_str(&format!("  Success: {}\n", success));
        out.push_str(&format!("  Tier: {}\n", styled_tier(result.tier)));
        out.push_str(&format!("  Selector: {}\n", outcome.diagnostics.selector));
        out.push_str(&format!(
            "  Retries used: {}\n\n",
            result.execution_info.retries_used
        ));

        if !outcome.diagnostics.sections.is_empty() {
            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["Section", "Phase", "Tier", "Confidence", "Words"]);
            for section in &outcome.diagnostics.sections {
                table.add_row(vec![
                    section.section.clone(),
                    section.phase.clone(),
                    section.tier.to_string(),
                    section.confidence.to_string(),
                    section.text.split_whitespace().count().to_string(),
                ]);
            }
            out.push_str(&format!("{}\n\n", table));
        }

        if !result.execution_info.time_status_trace.is_empty() {
            out.push_str(&format!("{}\n\n", format_section_heading("Time status")));
            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["Checkpoint", "Elapsed (s)", "Remaining (s)", "Status"]);
            for sample in &result.execution_info.time_status_trace {
                table.add_row(vec![
                    sample.checkpoint.clone(),
                    format!("{:.1}", sample.elapsed_secs),
                    sample.remaining_secs.to_string(),
                    sample.status.to_string(),
                ]);
            }
            out.push_str(&format!("{}\n\n", table));
        }

        if !result.execution_info.warnings.is_empty() {
            out.push_str(&format!(
                "{}\n\n",
                format_section_heading(&format!(
                    "Warnings ({})",
                    result.execution_info.warnings.len()
                ))
            ));
            for warning in &result.execution_info.warnings {
                out.push_str(&format!("  - {}\n", warning.yellow()));
            }
            out.push('\n');
        }
    }

    for section in &outcome.diagnostics.sections {
        out.push_str(&section.text);
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

pub fn format_phases_json(catalog: &PhaseCatalog) -> Result<String, ApiError> {
    to_json(&json!({ "phases": catalog.phases() }))
}

pub fn format_phases_text(catalog: &PhaseCatalog) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Phases"));
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Rank", "Phase", "Tier", "Section", "Tools", "Min time (s)", "Requires",
    ]);
    for phase in catalog.iter() {
        let tier = match phase.tier() {
            crate::phase::PhaseTier::Baseline => "baseline",
            crate::phase::PhaseTier::Secondary => "secondary",
            crate::phase::PhaseTier::Extended => "extended",
        };
        table.add_row(vec![
            phase.priority_rank.to_string(),
            phase.name.clone(),
            tier.to_string(),
            phase.section().to_string(),
            phase.required_tools.join(", "),
            phase.min_time_secs.to_string(),
            if phase.requires_facts.is_empty() {
                "-".to_string()
            } else {
                phase.requires_facts.join(", ")
            },
        ]);
    }
    out.push_str(&format!("{}", table));
    out
}

pub fn format_budget_json(report: &BudgetReport, plan: &PhasePlan) -> Result<String, ApiError> {
    to_json(&json!({ "budget": report, "plan": plan }))
}

pub fn format_budget_text(report: &BudgetReport, plan: &PhasePlan) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Budget"));
    out.push_str(&format!("  Remaining: {}s\n", report.remaining_seconds));
    out.push_str(&format!("  Status: {}\n", styled_status(report.status)));
    out.push_str(&format!("  Recommendation: {}\n\n", report.recommendation_text));

    out.push_str(&format!("{}\n\n", format_section_heading("Plan")));
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Phase", "Decision"]);
    for name in &plan.scheduled {
        table.add_row(vec![name.clone(), "run".to_string()]);
    }
    for skipped in &plan.skipped {
        table.add_row(vec![skipped.phase.clone(), format!("skip: {}", skipped.reason)]);
    }
    out.push_str(&format!("{}", table));
    out
}
