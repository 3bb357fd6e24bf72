//! Scenario Orchestrator.
//!
//! Runs one scenario end to end:
//!
//! 1. Check preconditions (served API groups); skip if unmet
//! 2. Build every object locally
//! 3. Submit in dependency order, stopping at the first rejection
//! 4. Poll the unit of work until a terminal condition or the deadline
//! 5. Emit logs and verify the expected condition
//! 6. Delete the namespace unless configured to keep it
//!
//! Steps run strictly in sequence. Scenarios in distinct namespaces share no
//! state and may run concurrently.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use jobprobe_names::NamespaceName;
use tracing::{error, info, warn};

use crate::context::HarnessContext;
use crate::error::HarnessError;
use crate::objects::{ObjectBuilder, ObjectKind, ObjectRef, ScenarioObjects, ScenarioParams};
use crate::poller::{job_finished, PollOutcome, TerminalPredicate};
use crate::status::ConditionKind;

/// One end-to-end scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub params: ScenarioParams,
    /// Condition that must be `True` for the scenario to pass.
    pub expect: ConditionKind,
    /// API groups the cluster must serve; the scenario is skipped otherwise.
    pub required_api_groups: Vec<String>,
    /// Conditions that end the poll.
    pub predicates: Vec<TerminalPredicate>,
}

impl Scenario {
    /// A scenario that polls until the job completes or fails.
    pub fn new(params: ScenarioParams, expect: ConditionKind) -> Self {
        Self {
            params,
            expect,
            required_api_groups: Vec::new(),
            predicates: job_finished(),
        }
    }

    pub fn requires_api_group(mut self, group: impl Into<String>) -> Self {
        self.required_api_groups.push(group.into());
        self
    }

    pub fn with_predicates(mut self, predicates: Vec<TerminalPredicate>) -> Self {
        self.predicates = predicates;
        self
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn namespace(&self) -> &NamespaceName {
        &self.params.namespace
    }
}

/// How a scenario ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioStatus {
    Passed,
    Skipped { reason: String },
}

/// Record of a scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: String,
    pub namespace: NamespaceName,
    pub status: ScenarioStatus,
    pub unit_of_work: Option<ObjectRef>,
    pub outcome: Option<PollOutcome>,
    /// Execution log, when it could be read.
    pub logs: Option<Bytes>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    /// Execution log as text.
    pub fn logs_text(&self) -> String {
        self.logs
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

/// Runs scenarios against the context's control plane.
#[derive(Clone)]
pub struct ScenarioRunner {
    ctx: HarnessContext,
}

impl ScenarioRunner {
    pub fn new(ctx: HarnessContext) -> Self {
        Self { ctx }
    }

    /// Runs one scenario to completion.
    pub async fn run(&self, scenario: &Scenario) -> Result<ScenarioReport, HarnessError> {
        let started_at = Utc::now();
        let namespace = scenario.namespace().clone();

        info!(scenario = scenario.name(), namespace = %namespace, "Starting scenario");

        if let Some(reason) = self.unmet_precondition(scenario).await? {
            info!(scenario = scenario.name(), reason = %reason, "Skipping scenario");
            return Ok(ScenarioReport {
                name: scenario.name().to_string(),
                namespace,
                status: ScenarioStatus::Skipped { reason },
                unit_of_work: None,
                outcome: None,
                logs: None,
                started_at,
                finished_at: Utc::now(),
            });
        }

        let objects = ObjectBuilder::new(scenario.params.clone()).build()?;

        let mut namespace_created = false;
        let result = self
            .execute(scenario, &objects, &mut namespace_created)
            .await;

        if namespace_created {
            self.teardown(&namespace).await;
        }

        match &result {
            Ok(_) => info!(scenario = scenario.name(), namespace = %namespace, "Scenario passed"),
            Err(e) => error!(
                scenario = scenario.name(),
                namespace = %namespace,
                reason = e.reason_code(),
                error = %e,
                "Scenario failed"
            ),
        }

        let (outcome, logs) = result?;
        Ok(ScenarioReport {
            name: scenario.name().to_string(),
            namespace,
            status: ScenarioStatus::Passed,
            unit_of_work: Some(objects.unit_of_work_ref()),
            outcome: Some(outcome),
            logs,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Runs independent scenarios concurrently; results keep input order.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> Vec<Result<ScenarioReport, HarnessError>> {
        join_all(scenarios.iter().map(|s| self.run(s))).await
    }

    /// Submits every object in dependency order.
    ///
    /// Stops at the first rejection and surfaces it unchanged.
    /// `namespace_created` is set once the namespace exists.
    pub async fn submit(
        &self,
        objects: &ScenarioObjects,
        namespace_created: &mut bool,
    ) -> Result<(), HarnessError> {
        for object in objects.submission_order() {
            let target = object.object_ref();
            if let Err(source) = self.ctx.client().create(&object).await {
                error!(object = %target, error = %source, "Submission rejected");
                return Err(HarnessError::Submission {
                    object: target,
                    source,
                });
            }
            if object.kind() == ObjectKind::Namespace {
                *namespace_created = true;
            }
            info!(object = %target, "Created {} successfully", target.kind);
        }
        Ok(())
    }

    async fn execute(
        &self,
        scenario: &Scenario,
        objects: &ScenarioObjects,
        namespace_created: &mut bool,
    ) -> Result<(PollOutcome, Option<Bytes>), HarnessError> {
        self.submit(objects, namespace_created).await?;

        let job = objects.unit_of_work_ref();
        let verifier = self.ctx.verifier();

        let outcome = match self.ctx.poller().wait(&job, &scenario.predicates).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Whatever the job printed is the best clue to why it hung.
                verifier.emit_logs(&job).await;
                return Err(e);
            }
        };

        let logs = verifier.verify(&job, &outcome, &scenario.expect).await?;
        Ok((outcome, logs))
    }

    async fn unmet_precondition(&self, scenario: &Scenario) -> Result<Option<String>, HarnessError> {
        for group in &scenario.required_api_groups {
            if !self.ctx.client().serves_api_group(group).await? {
                return Ok(Some(format!("API group '{group}' is not served")));
            }
        }
        Ok(None)
    }

    async fn teardown(&self, namespace: &NamespaceName) {
        if self.ctx.config().keep_namespaces {
            info!(namespace = %namespace, "Keeping namespace for inspection");
            return;
        }
        match self.ctx.client().delete_namespace(namespace).await {
            Ok(()) => info!(namespace = %namespace, "Deleted namespace"),
            Err(e) => warn!(namespace = %namespace, error = %e, "Failed to delete namespace"),
        }
    }
}
