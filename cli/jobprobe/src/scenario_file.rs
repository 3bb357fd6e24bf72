//! Scenario files.
//!
//! A scenario file is TOML describing one workload and its expected outcome:
//!
//! ```toml
//! name = "mnist"
//! image = "quay.io/project-codeflare/ray:latest-py39-cu118"
//! script = "pip install -r /test/requirements.txt && python /test/mnist.py"
//! expect = "Complete"
//! requires = ["workload.codeflare.dev"]
//!
//! [[files]]
//! name = "mnist.py"
//! path = "mnist.py"
//!
//! [[rules]]
//! verbs = ["get", "list", "create"]
//! api_groups = ["workload.codeflare.dev"]
//! resources = ["appwrappers"]
//! ```
//!
//! File paths resolve relative to the scenario file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use jobprobe_harness::objects::DEFAULT_MOUNT_PATH;
use jobprobe_harness::{shell_command, ConditionKind, PolicyRule, Scenario, ScenarioParams};
use jobprobe_names::NamespaceName;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    pub name: String,
    pub image: String,

    /// Shell script run with `/bin/sh -c`. Exclusive with `command`.
    #[serde(default)]
    pub script: Option<String>,

    #[serde(default)]
    pub command: Option<Vec<String>>,

    #[serde(default = "default_expect")]
    pub expect: String,

    /// API groups the cluster must serve.
    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(default)]
    pub completions: Option<i32>,
    #[serde(default)]
    pub parallelism: Option<i32>,
    #[serde(default)]
    pub backoff_limit: Option<i32>,
    #[serde(default)]
    pub mount_path: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub files: Vec<FileEntry>,

    #[serde(default)]
    pub rules: Vec<RuleEntry>,

    /// Directory the scenario was loaded from.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// A file placed in the config payload, inline or read from disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEntry {
    pub name: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub contents: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub verbs: Vec<String>,
    #[serde(default = "core_group")]
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
}

fn default_expect() -> String {
    "Complete".to_string()
}

fn core_group() -> Vec<String> {
    vec![String::new()]
}

impl ScenarioFile {
    /// Loads and parses a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario: {}", path.display()))?;
        let mut file = Self::from_toml_str(&contents)
            .with_context(|| format!("invalid scenario: {}", path.display()))?;
        file.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(file)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: Self = toml::from_str(contents).context("invalid scenario TOML")?;
        Ok(file)
    }

    fn command(&self) -> Result<Vec<String>> {
        match (&self.script, &self.command) {
            (Some(script), None) => Ok(shell_command(script.clone())),
            (None, Some(command)) => Ok(command.clone()),
            (Some(_), Some(_)) => bail!("scenario '{}' sets both script and command", self.name),
            (None, None) => bail!("scenario '{}' needs a script or a command", self.name),
        }
    }

    fn file_contents(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        match (&entry.path, &entry.contents) {
            (Some(path), None) => {
                let full = self.base_dir.join(path);
                std::fs::read(&full)
                    .with_context(|| format!("failed to read payload file: {}", full.display()))
            }
            (None, Some(contents)) => Ok(contents.clone().into_bytes()),
            _ => bail!(
                "file '{}' needs exactly one of path or contents",
                entry.name
            ),
        }
    }

    /// Turns the file into a runnable scenario in `namespace`.
    pub fn into_scenario(self, namespace: NamespaceName) -> Result<Scenario> {
        let mut params = ScenarioParams::new(namespace, &self.name, &self.image, self.command()?);

        for entry in &self.files {
            params = params.with_file(&entry.name, self.file_contents(entry)?);
        }
        for rule in &self.rules {
            params = params.with_rule(PolicyRule::new(
                rule.verbs.iter().cloned(),
                rule.api_groups.iter().cloned(),
                rule.resources.iter().cloned(),
            ));
        }
        for (key, value) in &self.env {
            params = params.with_env(key, value);
        }
        if let Some(identity) = &self.identity {
            params = params.with_identity(identity);
        }
        params.completions = self.completions.unwrap_or(params.completions);
        params.parallelism = self.parallelism.unwrap_or(params.parallelism);
        params.backoff_limit = self.backoff_limit.unwrap_or(params.backoff_limit);
        params.mount_path = self
            .mount_path
            .clone()
            .unwrap_or_else(|| DEFAULT_MOUNT_PATH.to_string());

        let mut scenario = Scenario::new(params, ConditionKind::parse(&self.expect));
        for group in self.requires {
            scenario = scenario.requires_api_group(group);
        }
        Ok(scenario)
    }
}
