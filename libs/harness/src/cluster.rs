//! Kubernetes implementation of [`ControlPlane`].
//!
//! Object descriptions map onto core/v1, rbac/v1 and batch/v1 types. Status
//! reads only decode Job status; other kinds are checked for existence.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use jobprobe_names::{NamespaceName, ObjectName};
use k8s_openapi::api::batch::v1::{Job, JobSpec, JobStatus};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EnvVar, Namespace, Pod, PodSpec,
    PodTemplateSpec, ServiceAccount, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{
    PolicyRule as RbacPolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::client::{ControlPlane, ControlPlaneError, LogStream};
use crate::objects::{
    ClusterObject, ConfigPayload, Identity, NamespaceSpec, ObjectKind, ObjectRef,
    PermissionBinding, PermissionGrant, UnitOfWork,
};
use crate::status::{Condition, ConditionKind, ConditionStatus, ObservedObject, UnitOfWorkStatus};

/// Label the Job controller puts on every pod it creates.
pub const JOB_NAME_LABEL: &str = "job-name";

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Control plane backed by a Kubernetes API server.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects using an explicit kubeconfig, or infers the configuration
    /// from the environment when none is given.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self, ControlPlaneError> {
        let mut config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    ControlPlaneError::Other(format!(
                        "failed to read kubeconfig {}: {e}",
                        path.display()
                    ))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| {
                        ControlPlaneError::Other(format!("failed to load kubeconfig: {e}"))
                    })?
            }
            None => Config::infer()
                .await
                .map_err(|e| ControlPlaneError::Other(format!("failed to infer config: {e}")))?,
        };
        config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
        config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

        let client = Client::try_from(config)
            .map_err(|e| ControlPlaneError::Other(format!("failed to create client: {e}")))?;
        Ok(Self::new(client))
    }

    fn namespaced<K>(&self, ns: &NamespaceName) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), ns.as_str())
    }
}

impl From<kube::Error> for ControlPlaneError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => match resp.code {
                409 => ControlPlaneError::AlreadyExists(resp.message),
                404 => ControlPlaneError::NotFound(resp.message),
                401 | 403 => ControlPlaneError::Forbidden(resp.message),
                400 | 422 => ControlPlaneError::Invalid(resp.message),
                429 | 500..=599 => ControlPlaneError::Unavailable(resp.message),
                code => ControlPlaneError::Other(format!("{code}: {}", resp.message)),
            },
            kube::Error::SerdeError(e) => ControlPlaneError::Other(e.to_string()),
            other => ControlPlaneError::Unavailable(other.to_string()),
        }
    }
}

async fn create_in<K>(api: Api<K>, object: &K) -> Result<(), ControlPlaneError>
where
    K: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    api.create(&PostParams::default(), object).await?;
    Ok(())
}

async fn replace_in<K>(api: Api<K>, name: &str, object: &K) -> Result<(), ControlPlaneError>
where
    K: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    api.replace(name, &PostParams::default(), object).await?;
    Ok(())
}

fn require_namespace(object: &ObjectRef) -> Result<&NamespaceName, ControlPlaneError> {
    object
        .namespace
        .as_ref()
        .ok_or_else(|| ControlPlaneError::Invalid(format!("{object} has no namespace")))
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn create(&self, object: &ClusterObject) -> Result<ObjectRef, ControlPlaneError> {
        let target = object.object_ref();
        debug!(object = %target, "Creating object");

        match object {
            ClusterObject::Namespace(ns) => {
                create_in(Api::all(self.client.clone()), &to_namespace(ns)).await?
            }
            ClusterObject::ConfigPayload(p) => {
                create_in(self.namespaced(&p.namespace), &to_config_map(p)).await?
            }
            ClusterObject::Identity(i) => {
                create_in(self.namespaced(&i.namespace), &to_service_account(i)).await?
            }
            ClusterObject::PermissionGrant(g) => {
                create_in(self.namespaced(&g.namespace), &to_role(g)).await?
            }
            ClusterObject::PermissionBinding(b) => {
                create_in(self.namespaced(&b.subject.namespace), &to_role_binding(b)).await?
            }
            ClusterObject::UnitOfWork(u) => {
                create_in(self.namespaced(&u.namespace), &to_job(u)).await?
            }
        }

        Ok(target)
    }

    async fn update(&self, object: &ClusterObject) -> Result<ObjectRef, ControlPlaneError> {
        let target = object.object_ref();
        let name = target.name.as_str();
        debug!(object = %target, "Replacing object");

        match object {
            ClusterObject::Namespace(ns) => {
                replace_in(Api::all(self.client.clone()), name, &to_namespace(ns)).await?
            }
            ClusterObject::ConfigPayload(p) => {
                replace_in(self.namespaced(&p.namespace), name, &to_config_map(p)).await?
            }
            ClusterObject::Identity(i) => {
                replace_in(self.namespaced(&i.namespace), name, &to_service_account(i)).await?
            }
            ClusterObject::PermissionGrant(g) => {
                replace_in(self.namespaced(&g.namespace), name, &to_role(g)).await?
            }
            ClusterObject::PermissionBinding(b) => {
                replace_in(
                    self.namespaced(&b.subject.namespace),
                    name,
                    &to_role_binding(b),
                )
                .await?
            }
            ClusterObject::UnitOfWork(u) => {
                replace_in(self.namespaced(&u.namespace), name, &to_job(u)).await?
            }
        }

        Ok(target)
    }

    async fn get(&self, object: &ObjectRef) -> Result<ObservedObject, ControlPlaneError> {
        let name = object.name.as_str();
        trace!(object = %object, "Reading object");

        let status = match object.kind {
            ObjectKind::Namespace => {
                Api::<Namespace>::all(self.client.clone()).get(name).await?;
                None
            }
            ObjectKind::ConfigPayload => {
                self.namespaced::<ConfigMap>(require_namespace(object)?)
                    .get(name)
                    .await?;
                None
            }
            ObjectKind::Identity => {
                self.namespaced::<ServiceAccount>(require_namespace(object)?)
                    .get(name)
                    .await?;
                None
            }
            ObjectKind::PermissionGrant => {
                self.namespaced::<Role>(require_namespace(object)?)
                    .get(name)
                    .await?;
                None
            }
            ObjectKind::PermissionBinding => {
                self.namespaced::<RoleBinding>(require_namespace(object)?)
                    .get(name)
                    .await?;
                None
            }
            ObjectKind::UnitOfWork => {
                let job = self
                    .namespaced::<Job>(require_namespace(object)?)
                    .get(name)
                    .await?;
                Some(job_status(job.status.as_ref()))
            }
        };

        Ok(ObservedObject {
            object: object.clone(),
            status,
        })
    }

    async fn stream_logs(
        &self,
        namespace: &NamespaceName,
        unit_of_work: &ObjectName,
    ) -> Result<LogStream, ControlPlaneError> {
        let pods: Api<Pod> = self.namespaced(namespace);
        let selector = format!("{JOB_NAME_LABEL}={unit_of_work}");
        let list = pods.list(&ListParams::default().labels(&selector)).await?;

        let mut pod_names: Vec<String> = list
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect();
        pod_names.sort();
        debug!(namespace = %namespace, job = %unit_of_work, pods = pod_names.len(), "Streaming job logs");

        let ns = namespace.to_string();
        let stream = futures_util::stream::iter(pod_names).then(move |pod| {
            let pods = pods.clone();
            let ns = ns.clone();
            async move {
                let mut text = pods.logs(&pod, &LogParams::default()).await?;
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                Ok::<Bytes, ControlPlaneError>(Bytes::from(format!(
                    "--- pod {ns}/{pod} ---\n{text}"
                )))
            }
        });

        Ok(Box::pin(stream))
    }

    async fn delete_namespace(&self, namespace: &NamespaceName) -> Result<(), ControlPlaneError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api
            .delete(namespace.as_str(), &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn serves_api_group(&self, group: &str) -> Result<bool, ControlPlaneError> {
        if group.is_empty() {
            return Ok(true);
        }
        let groups = self.client.list_api_groups().await?;
        Ok(groups.groups.iter().any(|g| g.name == group))
    }
}

// =============================================================================
// Conversions
// =============================================================================

pub fn to_namespace(spec: &NamespaceSpec) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(spec.name.to_string()),
            labels: Some(spec.labels.clone()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn to_config_map(payload: &ConfigPayload) -> ConfigMap {
    let binary_data: BTreeMap<String, ByteString> = payload
        .files
        .iter()
        .map(|(key, contents)| (key.to_string(), ByteString(contents.clone())))
        .collect();

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(payload.name.to_string()),
            namespace: Some(payload.namespace.to_string()),
            ..Default::default()
        },
        binary_data: Some(binary_data),
        immutable: Some(payload.immutable),
        ..Default::default()
    }
}

pub fn to_service_account(identity: &Identity) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(identity.name.to_string()),
            namespace: Some(identity.namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn to_role(grant: &PermissionGrant) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(grant.name.to_string()),
            namespace: Some(grant.namespace.to_string()),
            ..Default::default()
        },
        rules: Some(
            grant
                .rules
                .iter()
                .map(|rule| RbacPolicyRule {
                    verbs: rule.verbs.clone(),
                    api_groups: Some(rule.api_groups.clone()),
                    resources: Some(rule.resources.clone()),
                    ..Default::default()
                })
                .collect(),
        ),
    }
}

/// The binding's metadata carries no namespace; the API server assigns the
/// namespace of the endpoint it is posted to.
pub fn to_role_binding(binding: &PermissionBinding) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(binding.name.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: binding.grant.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            api_group: Some(String::new()),
            name: binding.subject.name.to_string(),
            namespace: Some(binding.subject.namespace.to_string()),
        }]),
    }
}

pub fn to_job(unit: &UnitOfWork) -> Job {
    let volume_name = "payload".to_string();
    let env = unit
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect::<Vec<_>>();

    Job {
        metadata: ObjectMeta {
            name: Some(unit.name.to_string()),
            namespace: Some(unit.namespace.to_string()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            completions: Some(unit.completions),
            parallelism: Some(unit.parallelism),
            backoff_limit: Some(unit.backoff_limit),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: unit.container_name.clone(),
                        image: Some(unit.image.clone()),
                        command: Some(unit.command.clone()),
                        env: if env.is_empty() { None } else { Some(env) },
                        volume_mounts: Some(vec![VolumeMount {
                            name: volume_name.clone(),
                            mount_path: unit.mount_path.clone(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: volume_name,
                        config_map: Some(ConfigMapVolumeSource {
                            name: unit.payload.to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    restart_policy: Some("Never".to_string()),
                    service_account_name: Some(unit.identity.to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Decodes a Job status; a missing status reads as empty.
pub fn job_status(status: Option<&JobStatus>) -> UnitOfWorkStatus {
    let Some(status) = status else {
        return UnitOfWorkStatus::default();
    };

    let conditions = status
        .conditions
        .iter()
        .flatten()
        .map(|c| Condition {
            kind: ConditionKind::parse(&c.type_),
            status: ConditionStatus::parse(&c.status),
            reason: c.reason.clone(),
            message: c.message.clone(),
        })
        .collect();

    UnitOfWorkStatus {
        conditions,
        active: status.active.unwrap_or(0),
        succeeded: status.succeeded.unwrap_or(0),
        failed: status.failed.unwrap_or(0),
    }
}

/// Renders an object as the manifest that would be submitted.
pub fn to_manifest(object: &ClusterObject) -> Result<serde_json::Value, serde_json::Error> {
    match object {
        ClusterObject::Namespace(ns) => serde_json::to_value(to_namespace(ns)),
        ClusterObject::ConfigPayload(p) => serde_json::to_value(to_config_map(p)),
        ClusterObject::Identity(i) => serde_json::to_value(to_service_account(i)),
        ClusterObject::PermissionGrant(g) => serde_json::to_value(to_role(g)),
        ClusterObject::PermissionBinding(b) => serde_json::to_value(to_role_binding(b)),
        ClusterObject::UnitOfWork(u) => serde_json::to_value(to_job(u)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{shell_command, ObjectBuilder, PolicyRule, ScenarioParams};
    use k8s_openapi::api::batch::v1::JobCondition;

    fn objects() -> crate::objects::ScenarioObjects {
        let params = ScenarioParams::new(
            NamespaceName::parse("test-ns-a").unwrap(),
            "sdk",
            "quay.io/opendatahub/notebooks:jupyter-minimal",
            shell_command("python run.py"),
        )
        .with_file("run.py", b"print(1)".to_vec())
        .with_rule(PolicyRule::new(["get", "list"], ["ray.io"], ["rayclusters"]))
        .with_env("MODE", "test");
        ObjectBuilder::new(params).build().unwrap()
    }

    #[test]
    fn test_config_map_is_immutable_binary() {
        let cm = to_config_map(&objects().payload);
        assert_eq!(cm.immutable, Some(true));
        let data = cm.binary_data.unwrap();
        assert_eq!(data.get("run.py").map(|b| b.0.as_slice()), Some(&b"print(1)"[..]));
        assert!(cm.data.is_none());
    }

    #[test]
    fn test_role_binding_has_no_namespace() {
        let rb = to_role_binding(&objects().binding);
        assert!(rb.metadata.namespace.is_none());
        assert_eq!(rb.role_ref.kind, "Role");
        assert_eq!(rb.role_ref.name, "sdk");
        let subject = &rb.subjects.unwrap()[0];
        assert_eq!(subject.kind, "ServiceAccount");
        assert_eq!(subject.name, "sdk-user");
        assert_eq!(subject.namespace.as_deref(), Some("test-ns-a"));
    }

    #[test]
    fn test_role_rules() {
        let role = to_role(&objects().grant);
        let rules = role.rules.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].verbs, vec!["get", "list"]);
        assert_eq!(rules[0].api_groups.as_deref(), Some(&["ray.io".to_string()][..]));
    }

    #[test]
    fn test_job_spec() {
        let job = to_job(&objects().unit_of_work);
        let spec = job.spec.unwrap();
        assert_eq!(spec.completions, Some(1));
        assert_eq!(spec.parallelism, Some(1));
        assert_eq!(spec.backoff_limit, Some(0));

        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.service_account_name.as_deref(), Some("sdk-user"));

        let container = &pod.containers[0];
        assert_eq!(
            container.command.as_deref(),
            Some(&shell_command("python run.py")[..])
        );
        let mount = &container.volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.mount_path, "/test");
        assert_eq!(container.env.as_ref().unwrap()[0].name, "MODE");

        let volume = &pod.volumes.unwrap()[0];
        assert_eq!(volume.name, mount.name);
        assert_eq!(volume.config_map.as_ref().unwrap().name, "sdk");
    }

    #[test]
    fn test_job_status_decoding() {
        let status = JobStatus {
            conditions: Some(vec![
                JobCondition {
                    type_: "FailureTarget".into(),
                    status: "True".into(),
                    ..Default::default()
                },
                JobCondition {
                    type_: "Failed".into(),
                    status: "True".into(),
                    reason: Some("BackoffLimitExceeded".into()),
                    ..Default::default()
                },
            ]),
            failed: Some(1),
            ..Default::default()
        };
        let decoded = job_status(Some(&status));
        assert!(decoded.is_true(&ConditionKind::Failed));
        assert!(!decoded.is_true(&ConditionKind::Complete));
        assert_eq!(decoded.failed, 1);
        assert_eq!(decoded.active, 0);
        assert_eq!(job_status(None), UnitOfWorkStatus::default());
    }

    #[test]
    fn test_manifest_carries_type_meta() {
        let manifest = to_manifest(&ClusterObject::UnitOfWork(objects().unit_of_work)).unwrap();
        assert_eq!(manifest["apiVersion"], "batch/v1");
        assert_eq!(manifest["kind"], "Job");
    }

    #[test]
    fn test_kube_error_mapping() {
        let api_err = |code: u16| {
            kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".into(),
                message: format!("code {code}"),
                reason: String::new(),
                code,
            })
        };
        assert!(matches!(
            ControlPlaneError::from(api_err(409)),
            ControlPlaneError::AlreadyExists(_)
        ));
        assert!(matches!(
            ControlPlaneError::from(api_err(422)),
            ControlPlaneError::Invalid(_)
        ));
        assert!(matches!(
            ControlPlaneError::from(api_err(403)),
            ControlPlaneError::Forbidden(_)
        ));
        assert!(ControlPlaneError::from(api_err(503)).is_transient());
    }
}
