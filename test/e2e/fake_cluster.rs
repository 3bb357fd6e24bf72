//! End-to-end scenarios against the in-memory control plane.
//!
//! These mirror the real-cluster suites but run without a cluster, so they
//! run by default:
//!
//! ```bash
//! cargo test -p jobprobe-e2e --test fake_cluster
//! ```

mod support;

use std::sync::Arc;

use anyhow::Result;
use jobprobe_harness::objects::ObjectKind;
use jobprobe_harness::{
    logging, shell_command, ConditionKind, HarnessError, Scenario, ScenarioParams, ScenarioStatus,
};
use jobprobe_testing::{fake_context, test_config, unique_namespace, FakeControlPlane};
use rstest::rstest;

fn openshift() -> Arc<FakeControlPlane> {
    logging::init_for_tests();
    let fake = Arc::new(FakeControlPlane::new());
    fake.with_api_group(support::MCAD_GROUP);
    fake.with_api_group(support::RAY_GROUP);
    fake.with_api_group(support::ROUTE_GROUP);
    fake
}

#[tokio::test(start_paused = true)]
async fn test_mnist_sdk_objects_are_submitted_and_verified() -> Result<()> {
    let fake = openshift();
    let ctx = fake_context(&fake, test_config());
    let namespace = ctx.new_namespace()?;
    let scenario = Scenario::new(support::mnist_sdk(namespace.clone())?, ConditionKind::Complete)
        .requires_api_group(support::ROUTE_GROUP);

    let report = ctx.runner().run(&scenario).await?;

    assert!(report.passed());
    assert_eq!(
        fake.created_kinds(&namespace),
        [
            ObjectKind::Namespace,
            ObjectKind::ConfigPayload,
            ObjectKind::Identity,
            ObjectKind::PermissionGrant,
            ObjectKind::PermissionBinding,
            ObjectKind::UnitOfWork,
        ]
    );
    let names: Vec<String> = fake
        .created()
        .iter()
        .filter(|r| r.kind != ObjectKind::Namespace)
        .map(|r| r.name.to_string())
        .collect();
    assert_eq!(
        names,
        ["mnist-raycluster-sdk", "sdk-user", "sdk", "sdk", "sdk"]
    );
    assert!(!fake.namespace_exists(&namespace));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_mnist_sdk_is_skipped_without_routes() -> Result<()> {
    let fake = Arc::new(FakeControlPlane::new());
    let ctx = fake_context(&fake, test_config());
    let scenario = Scenario::new(support::mnist_sdk(ctx.new_namespace()?)?, ConditionKind::Complete)
        .requires_api_group(support::ROUTE_GROUP);

    let report = ctx.runner().run(&scenario).await?;

    match report.status {
        ScenarioStatus::Skipped { reason } => assert!(reason.contains(support::ROUTE_GROUP)),
        other => panic!("expected skip, got {other:?}"),
    }
    assert!(fake.created().is_empty());
    Ok(())
}

#[rstest]
#[case::appwrappers("kubectl create appwrappers.mcad.ibm.com", ConditionKind::Complete)]
#[case::ray_status("kubectl get rayclusters/status.ray.io", ConditionKind::Complete)]
#[case::routes("kubectl list routes.route.openshift.io", ConditionKind::Complete)]
#[case::ray_delete("kubectl delete rayclusters.ray.io", ConditionKind::Failed)]
#[case::route_create("kubectl create routes.route.openshift.io", ConditionKind::Failed)]
#[case::core_pods("kubectl get pods", ConditionKind::Failed)]
#[tokio::test(start_paused = true)]
async fn test_sdk_identity_has_exactly_its_granted_permissions(
    #[case] script: &str,
    #[case] expect: ConditionKind,
) -> Result<()> {
    let fake = openshift();
    let ctx = fake_context(&fake, test_config());
    let mut params = support::mnist_sdk(ctx.new_namespace()?)?;
    params.command = shell_command(script);

    let report = ctx.runner().run(&Scenario::new(params, expect)).await?;

    assert!(report.passed(), "logs: {}", report.logs_text());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_wrong_expectation_surfaces_mismatch_with_conditions() {
    let fake = openshift();
    let ctx = fake_context(&fake, test_config());
    let params = ScenarioParams::new(
        unique_namespace("test-ns-"),
        "sdk",
        "busybox",
        shell_command("echo training && exit 1"),
    );

    let err = ctx
        .runner()
        .run(&Scenario::new(params, ConditionKind::Complete))
        .await
        .unwrap_err();

    let HarnessError::OutcomeMismatch { object, actual, .. } = &err else {
        panic!("expected OutcomeMismatch, got {err:?}");
    };
    assert_eq!(object.kind, ObjectKind::UnitOfWork);
    assert!(actual.iter().any(|c| c.kind == ConditionKind::Failed));
    assert!(err.to_string().contains("expected Complete=True"));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_suites_share_nothing_but_the_client() -> Result<()> {
    let fake = openshift();
    let ctx = fake_context(&fake, test_config());

    let scenarios = (0..4)
        .map(|_| -> Result<Scenario> {
            Ok(Scenario::new(
                support::mnist_sdk(ctx.new_namespace()?)?,
                ConditionKind::Complete,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let results = ctx.runner().run_all(&scenarios).await;

    for result in results {
        assert!(result?.passed());
    }
    assert_eq!(fake.deleted_namespaces().len(), 4);
    Ok(())
}
