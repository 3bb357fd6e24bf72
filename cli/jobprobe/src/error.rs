//! Error handling and display for the CLI.

use colored::Colorize;
use jobprobe_harness::{ControlPlaneError, HarnessError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{failed} of {total} scenario(s) failed")]
    ScenariosFailed { failed: usize, total: usize },

    #[error("no scenario files given")]
    NoScenarios,
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(harness_err) = err.downcast_ref::<HarnessError>() {
        if let Some(hint) = hint(harness_err) {
            eprintln!("\n{}", format!("Hint: {hint}").yellow());
        }
    }
}

fn hint(err: &HarnessError) -> Option<&'static str> {
    match err {
        HarnessError::TimedOut { .. } => {
            Some("The workload never finished. Raise --timeout-secs or inspect it with --keep-namespace.")
        }
        HarnessError::Submission {
            source: ControlPlaneError::Forbidden(_),
            ..
        }
        | HarnessError::ControlPlane(ControlPlaneError::Forbidden(_)) => {
            Some("Your credentials may not allow creating namespaces, roles or jobs.")
        }
        HarnessError::ControlPlane(ControlPlaneError::Unavailable(_)) => {
            Some("Check that the cluster is reachable and your kubeconfig is current.")
        }
        HarnessError::Config(_) => Some("Check the JOBPROBE_* environment variables."),
        _ => None,
    }
}
