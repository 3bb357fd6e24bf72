//! Output formatting for CLI commands.

use colored::Colorize;
use jobprobe_harness::{HarnessError, ScenarioReport, ScenarioStatus};
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// JSON format.
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("{} failed to render JSON: {e}", "Error:".red().bold()),
    }
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Machine-readable summary of one scenario run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub scenario: String,
    pub namespace: Option<String>,
    /// `passed`, `skipped` or `failed`.
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn from_result(scenario: &str, result: &Result<ScenarioReport, HarnessError>) -> Self {
        match result {
            Ok(report) => {
                let (result, reason) = match &report.status {
                    ScenarioStatus::Passed => ("passed", None),
                    ScenarioStatus::Skipped { reason } => ("skipped", Some(reason.clone())),
                };
                Self {
                    scenario: scenario.to_string(),
                    namespace: Some(report.namespace.to_string()),
                    result,
                    trigger: report.outcome.as_ref().map(|o| o.label.clone()),
                    elapsed_ms: report.outcome.as_ref().map(|o| o.elapsed.as_millis() as u64),
                    reason,
                    error: None,
                }
            }
            Err(e) => Self {
                scenario: scenario.to_string(),
                namespace: e
                    .object()
                    .and_then(|o| o.namespace.as_ref())
                    .map(ToString::to_string),
                result: "failed",
                trigger: None,
                elapsed_ms: None,
                reason: Some(e.reason_code().to_string()),
                error: Some(e.to_string()),
            },
        }
    }

    pub fn failed(&self) -> bool {
        self.result == "failed"
    }

    /// Print as a single human-readable line.
    pub fn print_text(&self) {
        let ns = self.namespace.as_deref().unwrap_or("-");
        match self.result {
            "passed" => println!(
                "{} {} ({ns}) {}",
                "PASS".green().bold(),
                self.scenario,
                self.trigger.as_deref().unwrap_or_default().dimmed()
            ),
            "skipped" => println!(
                "{} {} ({ns}) {}",
                "SKIP".yellow().bold(),
                self.scenario,
                self.reason.as_deref().unwrap_or_default()
            ),
            _ => println!(
                "{} {} ({ns}) {}",
                "FAIL".red().bold(),
                self.scenario,
                self.error.as_deref().unwrap_or_default()
            ),
        }
    }
}
