//! Shared scenario definitions for the e2e suites.

#![allow(dead_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use jobprobe_harness::{shell_command, PolicyRule, ScenarioParams};
use jobprobe_names::NamespaceName;

/// Image with Python and pip, used by the SDK scenarios.
pub const NOTEBOOK_IMAGE: &str =
    "quay.io/opendatahub/notebooks:jupyter-minimal-ubi8-python-3.8-4c8f26e";

pub const MCAD_GROUP: &str = "mcad.ibm.com";
pub const RAY_GROUP: &str = "ray.io";
pub const ROUTE_GROUP: &str = "route.openshift.io";

pub fn testdata(name: &str) -> Result<Vec<u8>> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(name);
    std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
}

/// Permissions the SDK needs to bring a Ray cluster up and down.
pub fn sdk_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new(
            ["get", "create", "delete", "list", "patch", "update"],
            [MCAD_GROUP],
            ["appwrappers"],
        ),
        PolicyRule::new(["get", "list"], [RAY_GROUP], ["rayclusters", "rayclusters/status"]),
        PolicyRule::new(["get", "list"], [ROUTE_GROUP], ["routes"]),
    ]
}

/// The MNIST training scenario driven through the CodeFlare SDK.
///
/// The job installs the SDK, copies the mounted payload into its working
/// directory and runs the SDK script against its own namespace.
pub fn mnist_sdk(namespace: NamespaceName) -> Result<ScenarioParams> {
    let script = format!(
        "pip install codeflare-sdk==0.4.4 && cp /test/* . && python mnist_raycluster_sdk.py {namespace}"
    );
    let mut params = ScenarioParams::new(namespace, "sdk", NOTEBOOK_IMAGE, shell_command(script))
        .with_file("mnist_raycluster_sdk.py", testdata("mnist_raycluster_sdk.py")?)
        .with_file("requirements.txt", testdata("requirements.txt")?)
        .with_file("mnist.py", testdata("mnist.py")?);
    params.payload_name = Some("mnist-raycluster-sdk".to_string());
    for rule in sdk_rules() {
        params = params.with_rule(rule);
    }
    Ok(params)
}
