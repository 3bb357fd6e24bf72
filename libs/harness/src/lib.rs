//! # jobprobe-harness
//!
//! End-to-end verification of batch workloads on a cluster.
//!
//! A scenario provisions a disposable namespace with a config payload, an
//! identity and its permissions, submits one unit of work, waits for it to
//! reach a terminal condition and checks that the condition is the expected
//! one.
//!
//! ## Components
//!
//! - [`objects`]: builds typed object descriptions, no network access
//! - [`client`]: the control-plane seam; [`cluster`] implements it on kube-rs
//! - [`poller`]: fixed-interval status polling with a hard deadline
//! - [`verifier`]: emits execution logs, then checks the outcome
//! - [`scenario`]: sequences the above for one run
//! - [`context`]: the client and configuration shared by a suite

pub mod client;
pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod objects;
pub mod poller;
pub mod scenario;
pub mod status;
pub mod verifier;

pub use client::{ControlPlane, ControlPlaneError, LogStream};
pub use config::HarnessConfig;
pub use context::HarnessContext;
pub use error::HarnessError;
pub use objects::{
    shell_command, ClusterObject, ObjectBuilder, ObjectKind, ObjectRef, PolicyRule,
    ScenarioObjects, ScenarioParams,
};
pub use poller::{ConditionPoller, PollConfig, PollOutcome, TerminalPredicate};
pub use scenario::{Scenario, ScenarioReport, ScenarioRunner, ScenarioStatus};
pub use status::{Condition, ConditionKind, ConditionStatus, UnitOfWorkStatus};
pub use verifier::OutcomeVerifier;
