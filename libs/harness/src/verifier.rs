//! Outcome Verifier.
//!
//! Emits the unit of work's execution log, then checks that the expected
//! condition is `True` in the terminal snapshot. The log is emitted before the
//! check on every path so a failed run can be diagnosed from its output alone.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tracing::{info, warn};

use crate::client::ControlPlane;
use crate::error::HarnessError;
use crate::objects::ObjectRef;
use crate::poller::PollOutcome;
use crate::status::ConditionKind;

/// Tracing target for lines of workload output.
pub const WORKLOAD_LOG_TARGET: &str = "jobprobe::workload";

/// Verifies terminal outcomes.
#[derive(Clone)]
pub struct OutcomeVerifier {
    client: Arc<dyn ControlPlane>,
}

impl OutcomeVerifier {
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self { client }
    }

    /// Retrieves and emits the execution log of `object`.
    ///
    /// Returns the collected bytes, or `None` if the log could not be read.
    /// A read failure is logged and never fails the caller.
    pub async fn emit_logs(&self, object: &ObjectRef) -> Option<Bytes> {
        let Some(namespace) = object.namespace.as_ref() else {
            warn!(object = %object, "Cannot read logs of an object without a namespace");
            return None;
        };

        info!(object = %object, "Printing execution logs");

        let mut stream = match self.client.stream_logs(namespace, &object.name).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(object = %object, error = %e, "Failed to open execution logs");
                return None;
            }
        };

        let mut collected = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    for line in String::from_utf8_lossy(&bytes).lines() {
                        info!(target: WORKLOAD_LOG_TARGET, namespace = %namespace, job = %object.name, "{line}");
                    }
                    collected.extend_from_slice(&bytes);
                }
                Err(e) => {
                    warn!(object = %object, error = %e, "Execution log stream broke off");
                    break;
                }
            }
        }

        Some(collected.freeze())
    }

    /// Emits logs, then checks that `expected` is `True` in the outcome.
    pub async fn verify(
        &self,
        object: &ObjectRef,
        outcome: &PollOutcome,
        expected: &ConditionKind,
    ) -> Result<Option<Bytes>, HarnessError> {
        let logs = self.emit_logs(object).await;
        check_outcome(object, outcome, expected)?;
        Ok(logs)
    }
}

/// The pure half of verification.
pub fn check_outcome(
    object: &ObjectRef,
    outcome: &PollOutcome,
    expected: &ConditionKind,
) -> Result<(), HarnessError> {
    if outcome.status.is_true(expected) {
        info!(object = %object, expected = %expected, trigger = %outcome.label, "Outcome matches expectation");
        return Ok(());
    }

    Err(HarnessError::OutcomeMismatch {
        object: object.clone(),
        expected: expected.clone(),
        actual: outcome.status.conditions.clone(),
    })
}
