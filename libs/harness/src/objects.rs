//! Object Builder.
//!
//! Turns scenario parameters into typed descriptions of every object one
//! scenario needs. Nothing here talks to the network; the descriptions are
//! translated into wire objects by a [`ControlPlane`](crate::client::ControlPlane)
//! implementation at submission time.
//!
//! Submission order is fixed by [`ScenarioObjects::submission_order`]:
//! namespace, config payload, identity, permission grant, permission binding,
//! unit of work.

use std::collections::BTreeMap;
use std::fmt;

use jobprobe_names::{ConfigKey, NamespaceName, ObjectName};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// Label applied to every generated namespace.
pub const SCENARIO_LABEL: &str = "jobprobe.io/scenario";

/// Default mount path of the config payload inside the workload.
pub const DEFAULT_MOUNT_PATH: &str = "/test";

/// Default container name of the workload.
pub const DEFAULT_CONTAINER_NAME: &str = "test";

/// Kinds of objects the harness can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Namespace,
    ConfigPayload,
    Identity,
    PermissionGrant,
    PermissionBinding,
    UnitOfWork,
}

impl ObjectKind {
    /// Kind name as the cluster reports it.
    pub fn cluster_kind(&self) -> &'static str {
        match self {
            ObjectKind::Namespace => "Namespace",
            ObjectKind::ConfigPayload => "ConfigMap",
            ObjectKind::Identity => "ServiceAccount",
            ObjectKind::PermissionGrant => "Role",
            ObjectKind::PermissionBinding => "RoleBinding",
            ObjectKind::UnitOfWork => "Job",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cluster_kind())
    }
}

/// Identity of an object on the control plane.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub namespace: Option<NamespaceName>,
    pub name: ObjectName,
}

impl ObjectRef {
    /// Reference to a namespaced object.
    pub fn namespaced(kind: ObjectKind, namespace: NamespaceName, name: ObjectName) -> Self {
        Self {
            kind,
            namespace: Some(namespace),
            name,
        }
    }

    /// Reference to a namespace.
    pub fn namespace(name: &NamespaceName) -> Self {
        Self {
            kind: ObjectKind::Namespace,
            namespace: None,
            name: name.clone().into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

// =============================================================================
// Object Descriptions
// =============================================================================

/// Disposable namespace for one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSpec {
    pub name: NamespaceName,
    pub labels: BTreeMap<String, String>,
}

/// Immutable named file contents mounted into the unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPayload {
    pub namespace: NamespaceName,
    pub name: ObjectName,
    pub files: BTreeMap<ConfigKey, Vec<u8>>,
    /// Always true when produced by [`ObjectBuilder`].
    pub immutable: bool,
}

/// Principal the unit of work runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub namespace: NamespaceName,
    pub name: ObjectName,
}

/// One permission rule: every verb applies to every (group, resource) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub verbs: Vec<String>,
    #[serde(default)]
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyRule {
    pub fn new<V, G, R>(verbs: V, api_groups: G, resources: R) -> Self
    where
        V: IntoIterator,
        V::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            verbs: verbs.into_iter().map(Into::into).collect(),
            api_groups: api_groups.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if this rule permits `verb` on `group`/`resource`.
    ///
    /// `*` matches anything in each position.
    pub fn allows(&self, verb: &str, group: &str, resource: &str) -> bool {
        let matches = |set: &[String], value: &str| set.iter().any(|s| s == "*" || s == value);
        matches(&self.verbs, verb)
            && matches(&self.api_groups, group)
            && matches(&self.resources, resource)
    }
}

/// Ordered permission rules in a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    pub namespace: NamespaceName,
    pub name: ObjectName,
    pub rules: Vec<PolicyRule>,
}

impl PermissionGrant {
    /// Returns true if any rule permits the operation.
    pub fn allows(&self, verb: &str, group: &str, resource: &str) -> bool {
        self.rules.iter().any(|r| r.allows(verb, group, resource))
    }
}

/// Subject of a permission binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSubject {
    pub namespace: NamespaceName,
    pub name: ObjectName,
}

/// Associates one identity with one grant.
///
/// The description carries no namespace of its own. It is placed next to its
/// subject when submitted, so callers must not expect a namespace here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionBinding {
    pub name: ObjectName,
    pub grant: ObjectName,
    pub subject: BindingSubject,
}

/// A single bounded execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOfWork {
    pub namespace: NamespaceName,
    pub name: ObjectName,
    pub container_name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub completions: i32,
    pub parallelism: i32,
    /// Retry budget; zero means the first failure is final.
    pub backoff_limit: i32,
    pub identity: ObjectName,
    pub payload: ObjectName,
    pub mount_path: String,
}

/// Sealed set of objects the harness submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterObject {
    Namespace(NamespaceSpec),
    ConfigPayload(ConfigPayload),
    Identity(Identity),
    PermissionGrant(PermissionGrant),
    PermissionBinding(PermissionBinding),
    UnitOfWork(UnitOfWork),
}

impl ClusterObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ClusterObject::Namespace(_) => ObjectKind::Namespace,
            ClusterObject::ConfigPayload(_) => ObjectKind::ConfigPayload,
            ClusterObject::Identity(_) => ObjectKind::Identity,
            ClusterObject::PermissionGrant(_) => ObjectKind::PermissionGrant,
            ClusterObject::PermissionBinding(_) => ObjectKind::PermissionBinding,
            ClusterObject::UnitOfWork(_) => ObjectKind::UnitOfWork,
        }
    }

    /// Where the object lives once submitted.
    ///
    /// A binding resolves to its subject's namespace.
    pub fn object_ref(&self) -> ObjectRef {
        let kind = self.kind();
        match self {
            ClusterObject::Namespace(ns) => ObjectRef::namespace(&ns.name),
            ClusterObject::ConfigPayload(o) => {
                ObjectRef::namespaced(kind, o.namespace.clone(), o.name.clone())
            }
            ClusterObject::Identity(o) => {
                ObjectRef::namespaced(kind, o.namespace.clone(), o.name.clone())
            }
            ClusterObject::PermissionGrant(o) => {
                ObjectRef::namespaced(kind, o.namespace.clone(), o.name.clone())
            }
            ClusterObject::PermissionBinding(o) => {
                ObjectRef::namespaced(kind, o.subject.namespace.clone(), o.name.clone())
            }
            ClusterObject::UnitOfWork(o) => {
                ObjectRef::namespaced(kind, o.namespace.clone(), o.name.clone())
            }
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Wraps a script in a POSIX shell invocation.
pub fn shell_command(script: impl Into<String>) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script.into()]
}

/// Parameters of one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    pub namespace: NamespaceName,
    /// Name of the unit of work; other object names default to it.
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Files in insertion order; duplicate names are rejected.
    pub files: Vec<(String, Vec<u8>)>,
    pub rules: Vec<PolicyRule>,
    pub completions: i32,
    pub parallelism: i32,
    pub backoff_limit: i32,
    pub mount_path: String,
    pub payload_name: Option<String>,
    pub identity_name: Option<String>,
    pub grant_name: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl ScenarioParams {
    /// Parameters with a single completion, no retries and no files.
    pub fn new(
        namespace: NamespaceName,
        name: impl Into<String>,
        image: impl Into<String>,
        command: Vec<String>,
    ) -> Self {
        Self {
            namespace,
            name: name.into(),
            image: image.into(),
            command,
            env: BTreeMap::new(),
            files: Vec::new(),
            rules: Vec::new(),
            completions: 1,
            parallelism: 1,
            backoff_limit: 0,
            mount_path: DEFAULT_MOUNT_PATH.to_string(),
            payload_name: None,
            identity_name: None,
            grant_name: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.push((name.into(), contents.into()));
        self
    }

    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_identity(mut self, name: impl Into<String>) -> Self {
        self.identity_name = Some(name.into());
        self
    }
}

/// Every object of one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioObjects {
    pub namespace: NamespaceSpec,
    pub payload: ConfigPayload,
    pub identity: Identity,
    pub grant: PermissionGrant,
    pub binding: PermissionBinding,
    pub unit_of_work: UnitOfWork,
}

impl ScenarioObjects {
    /// Objects in the order they must be submitted.
    pub fn submission_order(&self) -> Vec<ClusterObject> {
        vec![
            ClusterObject::Namespace(self.namespace.clone()),
            ClusterObject::ConfigPayload(self.payload.clone()),
            ClusterObject::Identity(self.identity.clone()),
            ClusterObject::PermissionGrant(self.grant.clone()),
            ClusterObject::PermissionBinding(self.binding.clone()),
            ClusterObject::UnitOfWork(self.unit_of_work.clone()),
        ]
    }

    /// Reference to the unit of work.
    pub fn unit_of_work_ref(&self) -> ObjectRef {
        ObjectRef::namespaced(
            ObjectKind::UnitOfWork,
            self.unit_of_work.namespace.clone(),
            self.unit_of_work.name.clone(),
        )
    }
}

/// Builds [`ScenarioObjects`] from [`ScenarioParams`].
#[derive(Debug, Clone)]
pub struct ObjectBuilder {
    params: ScenarioParams,
}

impl ObjectBuilder {
    pub fn new(params: ScenarioParams) -> Self {
        Self { params }
    }

    pub fn build(&self) -> Result<ScenarioObjects, HarnessError> {
        let p = &self.params;
        let invalid = |msg: String| HarnessError::InvalidScenario(msg);

        if p.image.trim().is_empty() {
            return Err(invalid("image cannot be empty".into()));
        }
        if p.command.is_empty() || p.command.iter().all(|a| a.trim().is_empty()) {
            return Err(invalid("command cannot be empty".into()));
        }
        if p.completions < 1 {
            return Err(invalid(format!(
                "completions must be at least 1, got {}",
                p.completions
            )));
        }
        if p.parallelism < 1 {
            return Err(invalid(format!(
                "parallelism must be at least 1, got {}",
                p.parallelism
            )));
        }
        if p.backoff_limit < 0 {
            return Err(invalid(format!(
                "backoff limit cannot be negative, got {}",
                p.backoff_limit
            )));
        }
        if !p.mount_path.starts_with('/') {
            return Err(invalid(format!(
                "mount path must be absolute, got '{}'",
                p.mount_path
            )));
        }
        for rule in &p.rules {
            if rule.verbs.is_empty() || rule.resources.is_empty() {
                return Err(invalid(
                    "permission rules need at least one verb and one resource".into(),
                ));
            }
        }

        let name = ObjectName::parse(&p.name)?;
        let payload_name = match &p.payload_name {
            Some(n) => ObjectName::parse(n)?,
            None => name.clone(),
        };
        let identity_name = match &p.identity_name {
            Some(n) => ObjectName::parse(n)?,
            None => ObjectName::parse(&format!("{}-user", p.name))?,
        };
        let grant_name = match &p.grant_name {
            Some(n) => ObjectName::parse(n)?,
            None => name.clone(),
        };

        let mut files = BTreeMap::new();
        for (key, contents) in &p.files {
            let key = ConfigKey::parse(key)?;
            if files.insert(key.clone(), contents.clone()).is_some() {
                return Err(invalid(format!("duplicate file name '{key}'")));
            }
        }

        let mut labels = p.labels.clone();
        labels.insert(SCENARIO_LABEL.to_string(), p.name.clone());

        let ns = p.namespace.clone();

        Ok(ScenarioObjects {
            namespace: NamespaceSpec {
                name: ns.clone(),
                labels,
            },
            payload: ConfigPayload {
                namespace: ns.clone(),
                name: payload_name.clone(),
                files,
                immutable: true,
            },
            identity: Identity {
                namespace: ns.clone(),
                name: identity_name.clone(),
            },
            grant: PermissionGrant {
                namespace: ns.clone(),
                name: grant_name.clone(),
                rules: p.rules.clone(),
            },
            binding: PermissionBinding {
                name: grant_name.clone(),
                grant: grant_name,
                subject: BindingSubject {
                    namespace: ns.clone(),
                    name: identity_name.clone(),
                },
            },
            unit_of_work: UnitOfWork {
                namespace: ns,
                name,
                container_name: DEFAULT_CONTAINER_NAME.to_string(),
                image: p.image.clone(),
                command: p.command.clone(),
                env: p.env.clone(),
                completions: p.completions,
                parallelism: p.parallelism,
                backoff_limit: p.backoff_limit,
                identity: identity_name,
                payload: payload_name,
                mount_path: p.mount_path.clone(),
            },
        })
    }
}
