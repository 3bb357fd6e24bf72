//! Render command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use jobprobe_harness::cluster::to_manifest;
use jobprobe_harness::ObjectBuilder;
use jobprobe_names::NamespaceName;

use crate::output::{print_info, print_json, OutputFormat};
use crate::scenario_file::ScenarioFile;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct RenderCommand {
    /// Scenario file (TOML).
    #[arg(value_name = "SCENARIO")]
    scenario: PathBuf,

    /// Namespace to render into. A fresh name is generated when omitted.
    #[arg(long)]
    namespace: Option<String>,
}

impl RenderCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let namespace = match &self.namespace {
            Some(name) => NamespaceName::parse(name)?,
            None => NamespaceName::generate(&ctx.config.namespace_prefix)?,
        };
        let manifests = render(&self.scenario, namespace.clone())?;

        if ctx.format == OutputFormat::Text {
            print_info(&format!("{} object(s) in namespace {namespace}", manifests.len()));
        }
        print_json(&manifests);
        Ok(())
    }
}

/// Wire manifests of every object the scenario submits, in submission order.
pub fn render(path: &Path, namespace: NamespaceName) -> Result<Vec<serde_json::Value>> {
    let scenario = ScenarioFile::load(path)?.into_scenario(namespace)?;
    let objects = ObjectBuilder::new(scenario.params).build()?;
    objects
        .submission_order()
        .iter()
        .map(|object| Ok(to_manifest(object)?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.toml");
        std::fs::write(
            &path,
            "name = \"hello\"\nimage = \"busybox\"\nscript = \"cat /test/a.txt\"\n\n[[files]]\nname = \"a.txt\"\ncontents = \"a\"\n",
        )
        .unwrap();

        let manifests = render(&path, NamespaceName::parse("test-ns-render").unwrap()).unwrap();

        let kinds: Vec<_> = manifests
            .iter()
            .map(|m| m["kind"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            kinds,
            ["Namespace", "ConfigMap", "ServiceAccount", "Role", "RoleBinding", "Job"]
        );
        assert!(manifests[4]["metadata"]["namespace"].is_null());
        assert_eq!(manifests[4]["subjects"][0]["namespace"], "test-ns-render");
        assert_eq!(manifests[5]["spec"]["backoffLimit"], 0);
    }
}
