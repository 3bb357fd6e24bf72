//! Check command.
//!
//! Operates purely on local scenario files (offline).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use jobprobe_harness::ObjectBuilder;
use jobprobe_names::NamespaceName;

use crate::output::{print_json, print_success, OutputFormat};
use crate::scenario_file::ScenarioFile;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct CheckCommand {
    /// Scenario files (TOML).
    #[arg(value_name = "SCENARIO", required = true)]
    scenarios: Vec<PathBuf>,
}

impl CheckCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let mut checked = Vec::new();
        for path in &self.scenarios {
            let namespace = NamespaceName::generate(&ctx.config.namespace_prefix)?;
            let scenario = ScenarioFile::load(path)?.into_scenario(namespace)?;
            ObjectBuilder::new(scenario.params.clone())
                .build()
                .with_context(|| format!("invalid scenario: {}", path.display()))?;
            checked.push(scenario.name().to_string());
        }

        match ctx.format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "valid": true,
                "scenarios": checked,
            })),
            OutputFormat::Text => {
                for name in &checked {
                    print_success(&format!("Scenario is valid: {name}"));
                }
            }
        }
        Ok(())
    }
}
