//! Output formatting for CLI commands.

use aca_rollout::{RevisionDeploymentResult, RolloutPhase, RolloutReport};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print data in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => println!("{}", format_json(data, "[]")),
    }
}

/// Print a single item as JSON.
pub fn print_single<T: Serialize>(data: &T) {
    println!("{}", format_json(data, "{}"));
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}

/// One line per revision state field.
#[derive(Debug, Tabled)]
struct RevisionRow {
    #[tabled(rename = "Revision")]
    revision: String,
    #[tabled(rename = "Active")]
    active: bool,
    #[tabled(rename = "Health")]
    health: String,
    #[tabled(rename = "Provisioning")]
    provisioning: String,
    #[tabled(rename = "Running")]
    running: String,
    #[tabled(rename = "URL")]
    url: String,
}

impl From<&RevisionDeploymentResult> for RevisionRow {
    fn from(result: &RevisionDeploymentResult) -> Self {
        Self {
            revision: result.revision_name.clone(),
            active: result.active,
            health: result.health_state.to_string(),
            provisioning: result.provisioning_state.to_string(),
            running: result.running_state.to_string(),
            url: result.revision_url.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Print a revision's state.
pub fn print_revision(result: &RevisionDeploymentResult, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_single(&serde_json::json!({
            "revision": result,
            "healthy": result.is_healthy(),
        })),
        OutputFormat::Table => {
            println!("{}", Table::new([RevisionRow::from(result)]));
            println!("Status: {}", verdict_label(result.is_healthy()));
        }
    }
}

/// Print the outcome of a rollout.
pub fn print_report(report: &RolloutReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_single(report),
        OutputFormat::Table => {
            println!("{}", Table::new([RevisionRow::from(&report.result)]));
            let phases: Vec<&str> = report.phases.iter().map(|p| p.phase.as_str()).collect();
            println!("Phases:  {}", phases.join(" -> "));
            println!(
                "Polls:   {} in {}s",
                report.polls,
                report.elapsed.as_secs()
            );
            println!("Outcome: {}", phase_label(report.phase));
        }
    }
}

fn verdict_label(healthy: bool) -> String {
    if healthy {
        "healthy".green().bold().to_string()
    } else {
        "not healthy".red().bold().to_string()
    }
}

fn phase_label(phase: RolloutPhase) -> String {
    match phase {
        RolloutPhase::Healthy => phase.as_str().green().bold().to_string(),
        RolloutPhase::Unhealthy => phase.as_str().red().bold().to_string(),
        RolloutPhase::TimedOut => phase.as_str().yellow().bold().to_string(),
        other => other.as_str().to_string(),
    }
}

fn format_json<T: Serialize + ?Sized>(data: &T, fallback: &str) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| fallback.to_string())
}
