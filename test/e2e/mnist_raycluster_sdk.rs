//! MNIST training through the CodeFlare SDK on a real cluster.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p jobprobe-e2e --test mnist_raycluster_sdk -- --ignored
//! ```
//!
//! Uses the current kubeconfig context, or `JOBPROBE_KUBECONFIG`. The cluster
//! must run the CodeFlare stack; the scenario is skipped on clusters that do
//! not serve OpenShift routes.

mod support;

use anyhow::Result;
use jobprobe_harness::{logging, ConditionKind, HarnessContext, Scenario, ScenarioStatus};

#[tokio::test]
#[ignore = "requires a cluster running the CodeFlare stack"]
async fn test_mnist_raycluster_sdk() -> Result<()> {
    logging::init_for_tests();

    let ctx = HarnessContext::from_env().await?;
    let namespace = ctx.new_namespace()?;
    let scenario = Scenario::new(support::mnist_sdk(namespace)?, ConditionKind::Complete)
        .requires_api_group(support::ROUTE_GROUP);

    let report = ctx.runner().run(&scenario).await?;

    if let ScenarioStatus::Skipped { reason } = &report.status {
        tracing::warn!(%reason, "MNIST scenario skipped");
        return Ok(());
    }
    assert!(report.passed());
    let outcome = report.outcome.as_ref().expect("passed runs carry an outcome");
    assert_eq!(outcome.label, "Complete=True");
    Ok(())
}
