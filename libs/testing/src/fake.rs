//! In-memory control plane.
//!
//! Stores submitted objects, enforces namespace existence, name uniqueness and
//! payload immutability, and simulates job execution by interpreting the
//! workload command once the job has been observed running for a few reads.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use jobprobe_harness::objects::{ClusterObject, ObjectKind, ObjectRef, UnitOfWork};
use jobprobe_harness::status::{Condition, ConditionKind, ConditionStatus, ObservedObject};
use jobprobe_harness::{ControlPlane, ControlPlaneError, LogStream, UnitOfWorkStatus};
use jobprobe_names::{NamespaceName, ObjectName};
use tracing::debug;

use crate::script::{self, ApiCall, Environment, Execution};

/// API groups served unless told otherwise.
pub const DEFAULT_API_GROUPS: &[&str] = &["apps", "batch", "rbac.authorization.k8s.io"];

/// Number of reads a job reports as running before it executes.
pub const DEFAULT_RUN_TICKS: u32 = 2;

/// How a job with a given name behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobBehavior {
    /// Interpret the workload command.
    Script,
    /// Report the job as running forever.
    Stuck,
    /// Status reads for the job never return.
    Hang,
    /// Return these statuses in order, repeating the last one.
    Timeline(Vec<UnitOfWorkStatus>),
}

#[derive(Debug, Default)]
struct JobRecord {
    reads: u32,
    execution: Option<Execution>,
}

#[derive(Debug)]
struct State {
    namespaces: BTreeSet<NamespaceName>,
    objects: BTreeMap<ObjectRef, ClusterObject>,
    jobs: BTreeMap<ObjectRef, JobRecord>,
    created: Vec<ObjectRef>,
    deleted: Vec<NamespaceName>,
    api_groups: BTreeSet<String>,
    behaviors: HashMap<String, JobBehavior>,
    create_failures: HashMap<ObjectKind, ControlPlaneError>,
    log_failure: Option<ControlPlaneError>,
    read_failures: u32,
    read_latency: Duration,
    run_ticks: u32,
    reads: u32,
    log_requests: u32,
}

impl Default for State {
    fn default() -> Self {
        Self {
            namespaces: BTreeSet::new(),
            objects: BTreeMap::new(),
            jobs: BTreeMap::new(),
            created: Vec::new(),
            deleted: Vec::new(),
            api_groups: DEFAULT_API_GROUPS.iter().map(|g| g.to_string()).collect(),
            behaviors: HashMap::new(),
            create_failures: HashMap::new(),
            log_failure: None,
            read_failures: 0,
            read_latency: Duration::ZERO,
            run_ticks: DEFAULT_RUN_TICKS,
            reads: 0,
            log_requests: 0,
        }
    }
}

/// A control plane that lives entirely in memory.
#[derive(Debug, Default)]
pub struct FakeControlPlane {
    state: Mutex<State>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Setup
    // -------------------------------------------------------------------------

    /// Creates a namespace as if someone else owned it.
    pub fn add_namespace(&self, namespace: &NamespaceName) {
        self.lock().namespaces.insert(namespace.clone());
    }

    /// Serves an additional API group.
    pub fn with_api_group(&self, group: impl Into<String>) {
        self.lock().api_groups.insert(group.into());
    }

    /// Sets the behavior of every job named `name`.
    pub fn on_job(&self, name: impl Into<String>, behavior: JobBehavior) {
        self.lock().behaviors.insert(name.into(), behavior);
    }

    /// The next `count` status reads fail with `Unavailable`.
    pub fn fail_next_reads(&self, count: u32) {
        self.lock().read_failures = count;
    }

    /// The next create of `kind` fails with `error`.
    pub fn fail_next_create(&self, kind: ObjectKind, error: ControlPlaneError) {
        self.lock().create_failures.insert(kind, error);
    }

    /// Every log request fails with `error`.
    pub fn fail_logs(&self, error: ControlPlaneError) {
        self.lock().log_failure = Some(error);
    }

    pub fn set_run_ticks(&self, ticks: u32) {
        self.lock().run_ticks = ticks;
    }

    /// Every status read waits this long before answering.
    pub fn set_read_latency(&self, latency: Duration) {
        self.lock().read_latency = latency;
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Every successfully created object, in creation order.
    pub fn created(&self) -> Vec<ObjectRef> {
        self.lock().created.clone()
    }

    /// Kinds created in `namespace`, in creation order.
    pub fn created_kinds(&self, namespace: &NamespaceName) -> Vec<ObjectKind> {
        self.lock()
            .created
            .iter()
            .filter(|r| match &r.namespace {
                Some(ns) => ns == namespace,
                None => r.name.as_str() == namespace.as_str(),
            })
            .map(|r| r.kind)
            .collect()
    }

    pub fn namespace_exists(&self, namespace: &NamespaceName) -> bool {
        self.lock().namespaces.contains(namespace)
    }

    pub fn deleted_namespaces(&self) -> Vec<NamespaceName> {
        self.lock().deleted.clone()
    }

    /// Total number of status reads served.
    pub fn reads(&self) -> u32 {
        self.lock().reads
    }

    /// Number of log requests, failed ones included.
    pub fn log_requests(&self) -> u32 {
        self.lock().log_requests
    }

    pub fn object(&self, object: &ObjectRef) -> Option<ClusterObject> {
        self.lock().objects.get(object).cloned()
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.lock().objects.contains_key(object)
    }

    /// Whether `identity` may perform the operation in `namespace`.
    pub fn can_i(
        &self,
        namespace: &NamespaceName,
        identity: &ObjectName,
        verb: &str,
        group: &str,
        resource: &str,
    ) -> bool {
        self.lock().allows(namespace, identity, verb, group, resource)
    }
}

impl State {
    fn allows(
        &self,
        namespace: &NamespaceName,
        identity: &ObjectName,
        verb: &str,
        group: &str,
        resource: &str,
    ) -> bool {
        self.objects.values().any(|object| match object {
            ClusterObject::PermissionBinding(binding)
                if &binding.subject.namespace == namespace && &binding.subject.name == identity =>
            {
                let grant = ObjectRef::namespaced(
                    ObjectKind::PermissionGrant,
                    namespace.clone(),
                    binding.grant.clone(),
                );
                matches!(
                    self.objects.get(&grant),
                    Some(ClusterObject::PermissionGrant(g)) if g.allows(verb, group, resource)
                )
            }
            _ => false,
        })
    }

    fn has(&self, kind: ObjectKind, namespace: &NamespaceName, name: &ObjectName) -> bool {
        self.objects
            .contains_key(&ObjectRef::namespaced(kind, namespace.clone(), name.clone()))
    }

    fn job_status(&mut self, target: &ObjectRef, job: &UnitOfWork) -> UnitOfWorkStatus {
        let behavior = self
            .behaviors
            .get(job.name.as_str())
            .cloned()
            .unwrap_or(JobBehavior::Script);
        let reads = match self.jobs.get_mut(target) {
            Some(record) => {
                record.reads += 1;
                record.reads
            }
            None => return UnitOfWorkStatus::default(),
        };

        match behavior {
            JobBehavior::Timeline(statuses) => {
                let index = (reads as usize).saturating_sub(1).min(statuses.len().saturating_sub(1));
                statuses.get(index).cloned().unwrap_or_default()
            }
            JobBehavior::Stuck | JobBehavior::Hang => running(job),
            JobBehavior::Script => {
                // Pods cannot start without their volume and service account.
                if !self.has(ObjectKind::ConfigPayload, &job.namespace, &job.payload)
                    || !self.has(ObjectKind::Identity, &job.namespace, &job.identity)
                {
                    return UnitOfWorkStatus::default();
                }
                if reads <= self.run_ticks {
                    return running(job);
                }
                let execution = self.execute(target, job);
                finished(job, &execution)
            }
        }
    }

    fn execute(&mut self, target: &ObjectRef, job: &UnitOfWork) -> Execution {
        if let Some(execution) = self.jobs.get(target).and_then(|r| r.execution.clone()) {
            return execution;
        }
        let execution = script::run(
            &script::script_of(&job.command),
            &JobEnvironment { state: self, job },
        );
        debug!(job = %target, exit_code = execution.exit_code, "Fake job executed");
        if let Some(record) = self.jobs.get_mut(target) {
            record.execution = Some(execution.clone());
        }
        execution
    }
}

fn running(job: &UnitOfWork) -> UnitOfWorkStatus {
    UnitOfWorkStatus {
        active: job.parallelism,
        ..UnitOfWorkStatus::default()
    }
}

fn finished(job: &UnitOfWork, execution: &Execution) -> UnitOfWorkStatus {
    if execution.exit_code == 0 {
        UnitOfWorkStatus {
            conditions: vec![
                Condition::new(ConditionKind::SuccessCriteriaMet, ConditionStatus::True)
                    .with_reason("CompletionsReached"),
                Condition::new(ConditionKind::Complete, ConditionStatus::True)
                    .with_reason("CompletionsReached"),
            ],
            succeeded: job.completions,
            ..UnitOfWorkStatus::default()
        }
    } else {
        let message = "Job has reached the specified backoff limit";
        UnitOfWorkStatus {
            conditions: vec![
                Condition::new(ConditionKind::FailureTarget, ConditionStatus::True)
                    .with_reason("BackoffLimitExceeded")
                    .with_message(message),
                Condition::new(ConditionKind::Failed, ConditionStatus::True)
                    .with_reason("BackoffLimitExceeded")
                    .with_message(message),
            ],
            failed: job.backoff_limit + 1,
            ..UnitOfWorkStatus::default()
        }
    }
}

struct JobEnvironment<'a> {
    state: &'a State,
    job: &'a UnitOfWork,
}

impl Environment for JobEnvironment<'_> {
    fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let mount = self.job.mount_path.trim_end_matches('/');
        let key = path.strip_prefix(mount)?.strip_prefix('/')?;
        let payload = ObjectRef::namespaced(
            ObjectKind::ConfigPayload,
            self.job.namespace.clone(),
            self.job.payload.clone(),
        );
        match self.state.objects.get(&payload) {
            Some(ClusterObject::ConfigPayload(p)) => p
                .files
                .iter()
                .find(|(k, _)| k.as_str() == key)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    fn authorize(&self, call: &ApiCall) -> Result<(), String> {
        let ns = &self.job.namespace;
        if self
            .state
            .allows(ns, &self.job.identity, &call.verb, &call.group, &call.resource)
        {
            return Ok(());
        }
        Err(format!(
            "Error from server (Forbidden): {resource} is forbidden: User \
             \"system:serviceaccount:{ns}:{sa}\" cannot {verb} resource \"{resource}\" \
             in API group \"{group}\" in the namespace \"{ns}\"",
            resource = call.resource,
            sa = self.job.identity,
            verb = call.verb,
            group = call.group,
        ))
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn create(&self, object: &ClusterObject) -> Result<ObjectRef, ControlPlaneError> {
        let mut state = self.lock();
        let target = object.object_ref();

        if let Some(error) = state.create_failures.remove(&object.kind()) {
            return Err(error);
        }

        match (object, &target.namespace) {
            (ClusterObject::Namespace(spec), _) => {
                if !state.namespaces.insert(spec.name.clone()) {
                    return Err(ControlPlaneError::AlreadyExists(format!(
                        "namespaces \"{}\" already exists",
                        spec.name
                    )));
                }
            }
            (_, Some(ns)) => {
                if !state.namespaces.contains(ns) {
                    return Err(ControlPlaneError::NotFound(format!(
                        "namespaces \"{ns}\" not found"
                    )));
                }
                if state.objects.contains_key(&target) {
                    return Err(ControlPlaneError::AlreadyExists(format!(
                        "{} \"{}\" already exists",
                        target.kind, target.name
                    )));
                }
                if object.kind() == ObjectKind::UnitOfWork {
                    state.jobs.insert(target.clone(), JobRecord::default());
                }
            }
            (_, None) => {
                return Err(ControlPlaneError::Invalid(format!(
                    "{target} has no namespace"
                )))
            }
        }

        state.objects.insert(target.clone(), object.clone());
        state.created.push(target.clone());
        Ok(target)
    }

    async fn update(&self, object: &ClusterObject) -> Result<ObjectRef, ControlPlaneError> {
        let mut state = self.lock();
        let target = object.object_ref();

        match state.objects.get(&target) {
            None => {
                return Err(ControlPlaneError::NotFound(format!(
                    "{} \"{}\" not found",
                    target.kind, target.name
                )))
            }
            Some(ClusterObject::ConfigPayload(existing)) if existing.immutable => {
                return Err(ControlPlaneError::Invalid(format!(
                    "ConfigMap \"{}\" is invalid: data: Forbidden: field is immutable when \
                     `immutable` is set",
                    target.name
                )))
            }
            Some(ClusterObject::UnitOfWork(_)) => {
                return Err(ControlPlaneError::Invalid(format!(
                    "Job.batch \"{}\" is invalid: spec.template: Invalid value: field is immutable",
                    target.name
                )))
            }
            Some(_) => {}
        }

        state.objects.insert(target.clone(), object.clone());
        Ok(target)
    }

    async fn get(&self, object: &ObjectRef) -> Result<ObservedObject, ControlPlaneError> {
        let latency = self.lock().read_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        {
            let mut state = self.lock();
            state.reads += 1;
            if state.read_failures > 0 {
                state.read_failures -= 1;
                return Err(ControlPlaneError::Unavailable(
                    "the server is currently unable to handle the request".into(),
                ));
            }

            let stored = match object.kind {
                ObjectKind::Namespace => {
                    let known = state
                        .namespaces
                        .iter()
                        .any(|ns| ns.as_str() == object.name.as_str());
                    if known {
                        return Ok(ObservedObject {
                            object: object.clone(),
                            status: None,
                        });
                    }
                    None
                }
                _ => state.objects.get(object).cloned(),
            };

            match stored {
                None => {
                    return Err(ControlPlaneError::NotFound(format!(
                        "{} \"{}\" not found",
                        object.kind, object.name
                    )))
                }
                Some(ClusterObject::UnitOfWork(job))
                    if state.behaviors.get(job.name.as_str()) == Some(&JobBehavior::Hang) => {}
                Some(ClusterObject::UnitOfWork(job)) => {
                    let status = state.job_status(object, &job);
                    return Ok(ObservedObject {
                        object: object.clone(),
                        status: Some(status),
                    });
                }
                Some(_) => {
                    return Ok(ObservedObject {
                        object: object.clone(),
                        status: None,
                    })
                }
            }
        }

        std::future::pending().await
    }

    async fn stream_logs(
        &self,
        namespace: &NamespaceName,
        unit_of_work: &ObjectName,
    ) -> Result<LogStream, ControlPlaneError> {
        let mut state = self.lock();
        state.log_requests += 1;
        if let Some(error) = &state.log_failure {
            return Err(error.clone());
        }

        let target = ObjectRef::namespaced(
            ObjectKind::UnitOfWork,
            namespace.clone(),
            unit_of_work.clone(),
        );
        let record = state.jobs.get(&target).ok_or_else(|| {
            ControlPlaneError::NotFound(format!("Job.batch \"{unit_of_work}\" not found"))
        })?;

        let mut chunks: Vec<Result<Bytes, ControlPlaneError>> = vec![Ok(Bytes::from(format!(
            "--- pod {namespace}/{unit_of_work}-0 ---\n"
        )))];
        if let Some(execution) = &record.execution {
            chunks.push(Ok(Bytes::from(execution.output.clone())));
        }
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn delete_namespace(&self, namespace: &NamespaceName) -> Result<(), ControlPlaneError> {
        let mut state = self.lock();
        if !state.namespaces.remove(namespace) {
            return Ok(());
        }
        state
            .objects
            .retain(|r, _| r.namespace.as_ref() != Some(namespace));
        state
            .jobs
            .retain(|r, _| r.namespace.as_ref() != Some(namespace));
        state.deleted.push(namespace.clone());
        Ok(())
    }

    async fn serves_api_group(&self, group: &str) -> Result<bool, ControlPlaneError> {
        Ok(group.is_empty() || self.lock().api_groups.contains(group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobprobe_harness::objects::{shell_command, ObjectBuilder, PolicyRule, ScenarioParams};

    fn ns(s: &str) -> NamespaceName {
        NamespaceName::parse(s).unwrap()
    }

    fn params(namespace: &str, script: &str) -> ScenarioParams {
        ScenarioParams::new(ns(namespace), "job", "busybox", shell_command(script))
            .with_file("hello.txt", "hello")
    }

    async fn submit_all(fake: &FakeControlPlane, params: ScenarioParams) -> ObjectRef {
        let objects = ObjectBuilder::new(params).build().unwrap();
        for object in objects.submission_order() {
            fake.create(&object).await.unwrap();
        }
        objects.unit_of_work_ref()
    }

    #[tokio::test]
    async fn test_namespaced_create_requires_namespace() {
        let fake = FakeControlPlane::new();
        let objects = ObjectBuilder::new(params("a", "true")).build().unwrap();
        let payload = ClusterObject::ConfigPayload(objects.payload);
        let err = fake.create(&payload).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let fake = FakeControlPlane::new();
        let objects = ObjectBuilder::new(params("a", "true")).build().unwrap();
        let namespace = ClusterObject::Namespace(objects.namespace);
        fake.create(&namespace).await.unwrap();
        let err = fake.create(&namespace).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_job_runs_after_ticks() {
        let fake = FakeControlPlane::new();
        let job = submit_all(&fake, params("a", "cat /test/hello.txt")).await;

        for _ in 0..DEFAULT_RUN_TICKS {
            let status = fake.get(&job).await.unwrap().status.unwrap();
            assert_eq!(status.active, 1);
            assert!(!status.is_finished());
        }
        let status = fake.get(&job).await.unwrap().status.unwrap();
        assert!(status.is_true(&ConditionKind::Complete));
        assert_eq!(status.succeeded, 1);
    }

    #[tokio::test]
    async fn test_failing_job_reports_failed() {
        let fake = FakeControlPlane::new();
        fake.set_run_ticks(0);
        let job = submit_all(&fake, params("a", "exit 1")).await;
        let status = fake.get(&job).await.unwrap().status.unwrap();
        assert!(status.is_true(&ConditionKind::Failed));
        assert!(!status.is_true(&ConditionKind::Complete));
        assert_eq!(status.failed, 1);
    }

    #[tokio::test]
    async fn test_rbac_follows_binding() {
        let fake = FakeControlPlane::new();
        let p = params("a", "true").with_rule(PolicyRule::new(["get"], ["batch"], ["jobs"]));
        submit_all(&fake, p).await;

        let user = ObjectName::parse("job-user").unwrap();
        assert!(fake.can_i(&ns("a"), &user, "get", "batch", "jobs"));
        assert!(!fake.can_i(&ns("a"), &user, "delete", "batch", "jobs"));
        assert!(!fake.can_i(&ns("b"), &user, "get", "batch", "jobs"));
    }

    #[tokio::test]
    async fn test_logs_include_output() {
        use futures_util::StreamExt;

        let fake = FakeControlPlane::new();
        fake.set_run_ticks(0);
        let job = submit_all(&fake, params("a", "echo hi")).await;
        fake.get(&job).await.unwrap();

        let mut stream = fake.stream_logs(&ns("a"), &job.name).await.unwrap();
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
        }
        assert!(text.starts_with("--- pod a/job-0 ---"));
        assert!(text.ends_with("hi\n"));
    }

    #[tokio::test]
    async fn test_delete_namespace_removes_contents() {
        let fake = FakeControlPlane::new();
        let job = submit_all(&fake, params("a", "true")).await;
        fake.delete_namespace(&ns("a")).await.unwrap();
        assert!(!fake.contains(&job));
        assert!(!fake.namespace_exists(&ns("a")));
        fake.delete_namespace(&ns("a")).await.unwrap();
        assert_eq!(fake.deleted_namespaces(), vec![ns("a")]);
    }
}
