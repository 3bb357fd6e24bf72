//! Run command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use jobprobe_harness::{ConditionKind, HarnessContext, HarnessError, Scenario};
use tracing::info;

use crate::error::CliError;
use crate::output::{print_json, OutputFormat, RunSummary};
use crate::scenario_file::ScenarioFile;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Scenario files (TOML). Scenarios run concurrently, each in its own namespace.
    #[arg(value_name = "SCENARIO", required = true)]
    scenarios: Vec<PathBuf>,

    /// Override the expected condition of every scenario (e.g. Complete, Failed).
    #[arg(long)]
    expect: Option<String>,

    /// Upper bound on waiting for a terminal condition.
    #[arg(long)]
    timeout_secs: Option<f64>,

    /// Interval between status reads.
    #[arg(long)]
    interval_secs: Option<f64>,

    /// Leave namespaces in place for inspection.
    #[arg(long)]
    keep_namespace: bool,
}

impl RunCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let mut config = ctx.config;
        if let Some(secs) = self.timeout_secs {
            config.timeout = seconds("--timeout-secs", secs)?;
        }
        if let Some(secs) = self.interval_secs {
            config.poll_interval = seconds("--interval-secs", secs)?;
        }
        config.keep_namespaces |= self.keep_namespace;
        config.validate()?;

        let harness = HarnessContext::connect(config).await?;
        let scenarios = load_scenarios(&harness, &self.scenarios, self.expect.as_deref())?;

        let summaries = run_scenarios(&harness, &scenarios).await;
        for summary in &summaries {
            if ctx.format == OutputFormat::Text {
                summary.print_text();
            }
        }
        if ctx.format == OutputFormat::Json {
            print_json(&summaries);
        }

        let failed = summaries.iter().filter(|s| s.failed()).count();
        if failed > 0 {
            return Err(CliError::ScenariosFailed {
                failed,
                total: summaries.len(),
            }
            .into());
        }
        Ok(())
    }
}

fn seconds(flag: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("{flag} is out of range: {secs}"))
}

/// Loads every scenario file into a fresh namespace.
pub fn load_scenarios(
    harness: &HarnessContext,
    paths: &[PathBuf],
    expect: Option<&str>,
) -> Result<Vec<Scenario>> {
    if paths.is_empty() {
        return Err(CliError::NoScenarios.into());
    }
    paths
        .iter()
        .map(|path| -> Result<Scenario> {
            let namespace = harness.new_namespace()?;
            let mut scenario = ScenarioFile::load(path)?.into_scenario(namespace)?;
            if let Some(expect) = expect {
                scenario.expect = ConditionKind::parse(expect);
            }
            Ok(scenario)
        })
        .collect()
}

/// Runs scenarios concurrently and summarizes each result.
pub async fn run_scenarios(harness: &HarnessContext, scenarios: &[Scenario]) -> Vec<RunSummary> {
    info!(count = scenarios.len(), "Running scenarios");
    let results: Vec<Result<_, HarnessError>> = harness.runner().run_all(scenarios).await;
    scenarios
        .iter()
        .zip(&results)
        .map(|(scenario, result)| RunSummary::from_result(scenario.name(), result))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use jobprobe_testing::{fake_context, test_config, FakeControlPlane, JobBehavior};

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test(start_paused = true)]
    async fn summarizes_each_scenario() {
        let fake = Arc::new(FakeControlPlane::new());
        fake.on_job("stuck", JobBehavior::Stuck);
        let harness = fake_context(&fake, test_config());

        let dir = tempfile::tempdir().unwrap();
        let paths = vec![
            write(
                &dir,
                "ok.toml",
                "name = \"ok\"\nimage = \"busybox\"\nscript = \"echo ok\"\n",
            ),
            write(
                &dir,
                "stuck.toml",
                "name = \"stuck\"\nimage = \"busybox\"\nscript = \"sleep 1000\"\n",
            ),
            write(
                &dir,
                "routes.toml",
                "name = \"routes\"\nimage = \"busybox\"\nscript = \"true\"\nrequires = [\"route.openshift.io\"]\n",
            ),
        ];

        let scenarios = load_scenarios(&harness, &paths, None).unwrap();
        let summaries = run_scenarios(&harness, &scenarios).await;

        let results: Vec<_> = summaries.iter().map(|s| s.result).collect();
        assert_eq!(results, vec!["passed", "failed", "skipped"]);
        assert_eq!(summaries[0].trigger.as_deref(), Some("Complete=True"));
        assert_eq!(summaries[1].reason.as_deref(), Some("timed_out"));
    }

    #[tokio::test(start_paused = true)]
    async fn expect_override_applies_to_all() {
        let fake = Arc::new(FakeControlPlane::new());
        let harness = fake_context(&fake, test_config());

        let dir = tempfile::tempdir().unwrap();
        let paths = vec![write(
            &dir,
            "fail.toml",
            "name = \"fail\"\nimage = \"busybox\"\nscript = \"exit 2\"\n",
        )];

        let scenarios = load_scenarios(&harness, &paths, Some("Failed")).unwrap();
        assert_eq!(scenarios[0].expect, ConditionKind::Failed);

        let summaries = run_scenarios(&harness, &scenarios).await;
        assert!(!summaries[0].failed());
    }

    #[test]
    fn rejects_negative_seconds() {
        assert!(seconds("--timeout-secs", -1.0).is_err());
        assert_eq!(seconds("--timeout-secs", 1.5).unwrap(), Duration::from_millis(1500));
    }
}
