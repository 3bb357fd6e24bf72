//! Observed status of a unit of work.
//!
//! Mirrors the condition list a batch Job reports: each condition has a kind
//! and a tri-state status. Absent conditions read as `Unknown`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::objects::ObjectRef;

/// Kind of a status condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ConditionKind {
    /// All completions succeeded.
    Complete,
    /// The retry budget is exhausted or a deadline was hit.
    Failed,
    /// Execution is suspended.
    Suspended,
    /// Failure has been decided but pods are still terminating.
    FailureTarget,
    /// Success has been decided but pods are still terminating.
    SuccessCriteriaMet,
    /// Any condition kind this harness does not model.
    Other(String),
}

impl ConditionKind {
    /// Returns the wire name of the condition kind.
    pub fn as_str(&self) -> &str {
        match self {
            ConditionKind::Complete => "Complete",
            ConditionKind::Failed => "Failed",
            ConditionKind::Suspended => "Suspended",
            ConditionKind::FailureTarget => "FailureTarget",
            ConditionKind::SuccessCriteriaMet => "SuccessCriteriaMet",
            ConditionKind::Other(s) => s,
        }
    }

    /// Parses a wire name, accepting the lowercase spellings used in
    /// scenario files and on the command line.
    pub fn parse(s: &str) -> Self {
        match s {
            "Complete" | "complete" | "completed" => ConditionKind::Complete,
            "Failed" | "failed" => ConditionKind::Failed,
            "Suspended" | "suspended" => ConditionKind::Suspended,
            "FailureTarget" | "failuretarget" => ConditionKind::FailureTarget,
            "SuccessCriteriaMet" | "successcriteriamet" => ConditionKind::SuccessCriteriaMet,
            other => ConditionKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ConditionKind {
    fn from(s: String) -> Self {
        ConditionKind::parse(&s)
    }
}

impl From<ConditionKind> for String {
    fn from(kind: ConditionKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Tri-state status of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    /// Parses the control plane's spelling; anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single status condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// Creates a condition without reason or message.
    pub fn new(kind: ConditionKind, status: ConditionStatus) -> Self {
        Self {
            kind,
            status,
            reason: None,
            message: None,
        }
    }

    /// Sets the machine-readable reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the human-readable message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.status)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

/// Status snapshot of a unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfWorkStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub active: i32,
    #[serde(default)]
    pub succeeded: i32,
    #[serde(default)]
    pub failed: i32,
}

impl UnitOfWorkStatus {
    /// Returns the status of the first condition of the given kind, or
    /// `Unknown` when the condition is absent.
    pub fn condition_status(&self, kind: &ConditionKind) -> ConditionStatus {
        self.conditions
            .iter()
            .find(|c| &c.kind == kind)
            .map(|c| c.status)
            .unwrap_or(ConditionStatus::Unknown)
    }

    /// Returns true if the given condition is present with status `True`.
    pub fn is_true(&self, kind: &ConditionKind) -> bool {
        self.condition_status(kind) == ConditionStatus::True
    }

    /// Returns true if the unit of work has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.is_true(&ConditionKind::Complete) || self.is_true(&ConditionKind::Failed)
    }
}

impl fmt::Display for UnitOfWorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{condition}")?;
        }
        write!(
            f,
            "] active={} succeeded={} failed={}",
            self.active, self.succeeded, self.failed
        )
    }
}

/// An object as read back from the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedObject {
    pub object: ObjectRef,
    /// Present only for kinds that report status.
    pub status: Option<UnitOfWorkStatus>,
}
