//! Harness error types.
//!
//! Only `Submission`, `TimedOut` and `OutcomeMismatch` fail a scenario at run
//! time. `TransientRead` is produced and absorbed inside the poll loop.

use std::time::Duration;

use jobprobe_names::NameError;
use thiserror::Error;

use crate::client::ControlPlaneError;
use crate::objects::ObjectRef;
use crate::status::{Condition, ConditionKind, UnitOfWorkStatus};

/// Errors raised while running a scenario.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A create call was rejected. Fatal, never retried.
    #[error("failed to create {object}: {source}")]
    Submission {
        object: ObjectRef,
        #[source]
        source: ControlPlaneError,
    },

    /// A status read failed during polling.
    #[error("transient read of {object} failed: {source}")]
    TransientRead {
        object: ObjectRef,
        #[source]
        source: ControlPlaneError,
    },

    /// No terminal condition was observed before the deadline.
    #[error(
        "timed out after {elapsed:?} ({attempts} reads) waiting for {object} to reach a terminal condition; last status: {}",
        describe_status(.last_status)
    )]
    TimedOut {
        object: ObjectRef,
        elapsed: Duration,
        attempts: u32,
        last_status: Option<UnitOfWorkStatus>,
    },

    /// A terminal condition was observed, but not the expected one.
    #[error(
        "{object} finished with an unexpected outcome: expected {expected}=True, observed {}",
        describe_conditions(.actual)
    )]
    OutcomeMismatch {
        object: ObjectRef,
        expected: ConditionKind,
        actual: Vec<Condition>,
    },

    /// Scenario parameters failed validation.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// A name failed validation.
    #[error("invalid name: {0}")]
    Name(#[from] NameError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// A control plane call outside of submission failed.
    #[error("control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),
}

impl HarnessError {
    /// Standardized reason code for reports.
    pub fn reason_code(&self) -> &'static str {
        match self {
            HarnessError::Submission { .. } => "submission_failed",
            HarnessError::TransientRead { .. } => "transient_read",
            HarnessError::TimedOut { .. } => "timed_out",
            HarnessError::OutcomeMismatch { .. } => "outcome_mismatch",
            HarnessError::InvalidScenario(_) => "invalid_scenario",
            HarnessError::Name(_) => "invalid_name",
            HarnessError::Config(_) => "config",
            HarnessError::ControlPlane(_) => "control_plane",
        }
    }

    /// Returns the object the error is about, if any.
    pub fn object(&self) -> Option<&ObjectRef> {
        match self {
            HarnessError::Submission { object, .. }
            | HarnessError::TransientRead { object, .. }
            | HarnessError::TimedOut { object, .. }
            | HarnessError::OutcomeMismatch { object, .. } => Some(object),
            _ => None,
        }
    }
}

fn describe_status(status: &Option<UnitOfWorkStatus>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "none observed".to_string(),
    }
}

fn describe_conditions(conditions: &[Condition]) -> String {
    if conditions.is_empty() {
        return "no conditions".to_string();
    }
    let parts: Vec<String> = conditions.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::ObjectKind;
    use crate::status::ConditionStatus;
    use jobprobe_names::{NamespaceName, ObjectName};

    fn job_ref() -> ObjectRef {
        ObjectRef::namespaced(
            ObjectKind::UnitOfWork,
            NamespaceName::parse("test-ns-a").unwrap(),
            ObjectName::parse("sdk").unwrap(),
        )
    }

    #[test]
    fn test_timed_out_message_carries_identity_and_status() {
        let err = HarnessError::TimedOut {
            object: job_ref(),
            elapsed: Duration::from_secs(10),
            attempts: 11,
            last_status: Some(UnitOfWorkStatus {
                active: 1,
                ..Default::default()
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("Job test-ns-a/sdk"), "{msg}");
        assert!(msg.contains("active=1"), "{msg}");
        assert_eq!(err.reason_code(), "timed_out");
    }

    #[test]
    fn test_timed_out_without_status() {
        let err = HarnessError::TimedOut {
            object: job_ref(),
            elapsed: Duration::from_secs(1),
            attempts: 2,
            last_status: None,
        };
        assert!(err.to_string().contains("none observed"));
    }

    #[test]
    fn test_mismatch_message_lists_both_sides() {
        let err = HarnessError::OutcomeMismatch {
            object: job_ref(),
            expected: ConditionKind::Complete,
            actual: vec![Condition::new(ConditionKind::Failed, ConditionStatus::True)],
        };
        let msg = err.to_string();
        assert!(msg.contains("expected Complete=True"), "{msg}");
        assert!(msg.contains("[Failed=True]"), "{msg}");
        assert_eq!(err.object(), Some(&job_ref()));
    }
}
