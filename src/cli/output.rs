//! Output formatting for CLI commands.
//!
//! Every formatter returns a `String`; the binary decides where it goes.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::planner::{ActionStatus, ActionType, DriftKind, DriftReport, Plan};
use crate::release::{Release, ReleasePhase};
use crate::resource::{ResourceGraph, SpecHasher};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Release row for the history table.
#[derive(Tabled)]
struct ReleaseRow {
    #[tabled(rename = "Revision")]
    revision: u64,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Resources")]
    resources: usize,
    #[tabled(rename = "Modified")]
    modified: String,
}

/// Graph row for ordered resource display.
#[derive(Tabled)]
struct GraphRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Depends on")]
    depends_on: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(plan),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    fn format_plan_text(plan: &Plan, detailed: bool) -> String {
        if !plan.has_changes() {
            return format!("{} No changes. Resources are up to date.\n", "✓".green());
        }

        let mut output = String::new();
        let _ = writeln!(output, "\nPlan (spec {})\n", SpecHasher::short_hash(&plan.spec_hash));

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .filter(|a| detailed || a.action_type != ActionType::NoOp)
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                resource: a.resource_id.clone(),
                reason: if detailed { a.reason.clone() } else { Self::truncate(&a.reason, 40) },
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete, {} unchanged",
            plan.count(ActionType::Create).to_string().green(),
            plan.count(ActionType::Update).to_string().yellow(),
            plan.count(ActionType::Delete).to_string().red(),
            plan.count(ActionType::NoOp),
        );
        output
    }

    /// Formats the apply (or destroy) order of a resource graph.
    #[must_use]
    pub fn format_graph(&self, graph: &ResourceGraph, destroy: bool) -> String {
        let order = if destroy { graph.destroy_order() } else { graph.topological_order() };

        match self.format {
            OutputFormat::Json => {
                let nodes: Vec<GraphNodeJson<'_>> = order
                    .iter()
                    .map(|&id| GraphNodeJson {
                        id,
                        depends_on: graph.dependencies_of(id),
                    })
                    .collect();
                to_json(&GraphJson { destroy, nodes })
            }
            OutputFormat::Text => {
                if order.is_empty() {
                    return String::from("No resources.\n");
                }
                let rows: Vec<GraphRow> = order
                    .iter()
                    .enumerate()
                    .map(|(i, &id)| GraphRow {
                        index: i + 1,
                        resource: id.to_string(),
                        depends_on: graph.dependencies_of(id).join(", "),
                    })
                    .collect();
                let title = if destroy { "Destroy order" } else { "Apply order" };
                format!("\n{title}\n\n{}\n", Table::new(rows))
            }
        }
    }

    /// Formats one release.
    #[must_use]
    pub fn format_release(&self, release: &Release) -> String {
        match self.format {
            OutputFormat::Json => to_json(release),
            OutputFormat::Text => Self::format_release_text(release),
        }
    }

    fn format_release_text(release: &Release) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "\nRelease {} revision {}", release.key(), release.revision);
        let _ = writeln!(output, "   Phase:     {}", Self::format_phase(release.phase));
        let _ = writeln!(output, "   Created:   {}", release.create_time.to_rfc3339());
        let _ = writeln!(output, "   Modified:  {}", release.modified_time.to_rfc3339());
        let _ = writeln!(
            output,
            "   Spec:      {}",
            release
                .spec
                .as_ref()
                .map_or_else(|| String::from("-"), |s| format!("{} resources", s.len()))
        );
        let _ = writeln!(output, "   State:     {} resources", release.state.len());

        for resource in &release.state.resources {
            let _ = writeln!(output, "     - {}", resource.id);
        }

        if let Some(failure) = &release.failure {
            let _ = writeln!(
                output,
                "\n{} Failed during {}: {}",
                "✗".red(),
                failure.stage,
                failure.message
            );
            for action in &failure.actions {
                let _ = writeln!(
                    output,
                    "   {} {} {}{}",
                    Self::format_action_status(action.status),
                    Self::format_action_type(action.action),
                    action.id,
                    action.error.as_deref().map(|e| format!(": {e}")).unwrap_or_default()
                );
            }
        }
        output
    }

    /// Formats release history.
    #[must_use]
    pub fn format_release_list(&self, releases: &[Release]) -> String {
        match self.format {
            OutputFormat::Json => {
                let list: Vec<ReleaseSummaryJson<'_>> = releases.iter().map(ReleaseSummaryJson::from).collect();
                to_json(&list)
            }
            OutputFormat::Text => {
                if releases.is_empty() {
                    return String::from("No releases found.\n");
                }
                let rows: Vec<ReleaseRow> = releases
                    .iter()
                    .map(|r| ReleaseRow {
                        revision: r.revision,
                        phase: Self::format_phase(r.phase),
                        resources: r.state.len(),
                        modified: r.modified_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                if !report.has_drift {
                    return format!("{} No drift detected.\n", "✓".green());
                }
                let mut output = format!("\n{} Drift detected:\n", "⚠".yellow());
                for entry in &report.entries {
                    let kind = match entry.kind {
                        DriftKind::Missing => "missing".red().to_string(),
                        DriftKind::Modified => "modified".yellow().to_string(),
                    };
                    let _ = writeln!(output, "   {kind} {}", entry.id);
                    for detail in &entry.details {
                        let _ = writeln!(
                            output,
                            "     {}: {} -> {}",
                            detail.field,
                            detail.old_value.as_ref().map_or_else(|| String::from("-"), ToString::to_string),
                            detail.new_value.as_ref().map_or_else(|| String::from("-"), ToString::to_string),
                        );
                    }
                }
                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                to_json(&json)
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Configuration is valid", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Configuration has {} error(s):", "✗".red(), result.error_count());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }
                if show_warnings && result.warning_count() > 0 {
                    let _ = writeln!(output, "\nWarnings:");
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
            ActionType::NoOp => "noop".dimmed().to_string(),
        }
    }

    fn format_action_status(status: ActionStatus) -> String {
        match status {
            ActionStatus::Succeeded => "succeeded".green().to_string(),
            ActionStatus::Failed => "failed".red().to_string(),
            ActionStatus::Skipped => "skipped".yellow().to_string(),
            ActionStatus::Cancelled => "cancelled".dimmed().to_string(),
        }
    }

    /// Formats a release phase with color.
    fn format_phase(phase: ReleasePhase) -> String {
        match phase {
            ReleasePhase::Succeeded => phase.as_str().green().to_string(),
            ReleasePhase::Failed => phase.as_str().red().to_string(),
            _ => phase.as_str().yellow().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &"✓".green().to_string(), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", &"✗".red().to_string(), message)
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", &"⚠".yellow().to_string(), message)
    }

    fn message(&self, status: &str, marker: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({ "status": status, "message": message })),
            OutputFormat::Text => format!("{marker} {message}"),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

#[derive(Serialize)]
struct GraphJson<'a> {
    destroy: bool,
    nodes: Vec<GraphNodeJson<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphNodeJson<'a> {
    id: &'a str,
    depends_on: Vec<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseSummaryJson<'a> {
    revision: u64,
    phase: ReleasePhase,
    resources: usize,
    modified_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<&'a str>,
}

impl<'a> From<&'a Release> for ReleaseSummaryJson<'a> {
    fn from(release: &'a Release) -> Self {
        Self {
            revision: release.revision,
            phase: release.phase,
            resources: release.state.len(),
            modified_time: release.modified_time.to_rfc3339(),
            failure: release.failure.as_ref().map(|f| f.message.as_str()),
        }
    }
}
