//! Condition Poller.
//!
//! Reads a unit of work's status at a fixed interval until one of a set of
//! labelled terminal predicates holds, or the deadline passes.
//!
//! # Invariants
//!
//! - Predicates are evaluated in order on each snapshot; the first match wins
//!   and its label is recorded, so exactly one trigger is ever reported
//! - A failed or slow read never aborts the loop; it is counted and the next
//!   tick proceeds
//! - No read or sleep extends past the deadline, so the loop returns within
//!   one interval of the timeout
//! - `Terminal` and `TimedOut` are absorbing

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::ControlPlane;
use crate::error::HarnessError;
use crate::objects::ObjectRef;
use crate::status::{ConditionKind, UnitOfWorkStatus};

/// Default interval between status reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    /// Requires a positive interval and a timeout of at least one interval.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.interval.is_zero() {
            return Err(HarnessError::Config("poll interval must be positive".into()));
        }
        if self.timeout < self.interval {
            return Err(HarnessError::Config(format!(
                "timeout {:?} is shorter than the poll interval {:?}",
                self.timeout, self.interval
            )));
        }
        Ok(())
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: crate::config::TIMEOUT_LONG,
        }
    }
}

type Check = dyn Fn(&UnitOfWorkStatus) -> bool + Send + Sync;

/// A labelled terminal test on a status snapshot.
#[derive(Clone)]
pub struct TerminalPredicate {
    label: String,
    check: Arc<Check>,
}

impl TerminalPredicate {
    pub fn new<F>(label: impl Into<String>, check: F) -> Self
    where
        F: Fn(&UnitOfWorkStatus) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            check: Arc::new(check),
        }
    }

    /// Holds when the given condition is `True`. Labelled `<Kind>=True`.
    pub fn condition_true(kind: ConditionKind) -> Self {
        let label = format!("{kind}=True");
        Self::new(label, move |status| status.is_true(&kind))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn matches(&self, status: &UnitOfWorkStatus) -> bool {
        (self.check)(status)
    }
}

impl fmt::Debug for TerminalPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalPredicate")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// `Complete=True` or `Failed=True`, in that order.
pub fn job_finished() -> Vec<TerminalPredicate> {
    vec![
        TerminalPredicate::condition_true(ConditionKind::Complete),
        TerminalPredicate::condition_true(ConditionKind::Failed),
    ]
}

/// Poll loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Terminal,
    TimedOut,
}

impl PollState {
    /// Applies one tick's observation.
    ///
    /// A terminal observation wins over an expired deadline on the same tick.
    pub fn advance(self, terminal: bool, deadline_passed: bool) -> PollState {
        match self {
            PollState::Pending if terminal => PollState::Terminal,
            PollState::Pending if deadline_passed => PollState::TimedOut,
            state => state,
        }
    }
}

/// Result of a successful poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Label of the predicate that stopped the poll.
    pub label: String,
    /// Snapshot that satisfied the predicate.
    pub status: UnitOfWorkStatus,
    pub attempts: u32,
    pub transient_errors: u32,
    pub elapsed: Duration,
}

/// Polls a unit of work until a terminal predicate holds.
#[derive(Clone)]
pub struct ConditionPoller {
    client: Arc<dyn ControlPlane>,
    config: PollConfig,
}

impl ConditionPoller {
    pub fn new(client: Arc<dyn ControlPlane>, config: PollConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Waits for the first predicate to hold on `object`'s status.
    pub async fn wait(
        &self,
        object: &ObjectRef,
        predicates: &[TerminalPredicate],
    ) -> Result<PollOutcome, HarnessError> {
        if predicates.is_empty() {
            return Err(HarnessError::InvalidScenario(
                "at least one terminal predicate is required".into(),
            ));
        }
        self.config.validate()?;

        let start = Instant::now();
        let deadline = start + self.config.timeout;
        let mut state = PollState::Pending;
        let mut attempts = 0u32;
        let mut transient_errors = 0u32;
        let mut last_status: Option<UnitOfWorkStatus> = None;

        info!(
            object = %object,
            interval_ms = self.config.interval.as_millis() as u64,
            timeout_secs = self.config.timeout.as_secs(),
            "Waiting for terminal condition"
        );

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());

            let mut hit: Option<&TerminalPredicate> = None;
            match tokio::time::timeout(remaining, self.client.get(object)).await {
                Ok(Ok(observed)) => match observed.status {
                    Some(status) => {
                        hit = predicates.iter().find(|p| p.matches(&status));
                        debug!(object = %object, attempt = attempts, status = %status, "Observed status");
                        last_status = Some(status);
                    }
                    None => {
                        debug!(object = %object, attempt = attempts, "Object reports no status yet");
                    }
                },
                Ok(Err(source)) => {
                    transient_errors += 1;
                    let transient = source.is_transient();
                    let err = HarnessError::TransientRead {
                        object: object.clone(),
                        source,
                    };
                    warn!(attempt = attempts, transient, error = %err, "Status read failed, will retry");
                }
                Err(_) => {
                    transient_errors += 1;
                    warn!(object = %object, attempt = attempts, "Status read did not finish before the deadline");
                }
            }

            let now = Instant::now();
            state = state.advance(hit.is_some(), now >= deadline);

            match state {
                PollState::Terminal => {
                    let label = hit.map(|p| p.label().to_string()).unwrap_or_default();
                    let status = last_status.unwrap_or_default();
                    let elapsed = now - start;
                    info!(
                        object = %object,
                        trigger = %label,
                        attempts,
                        transient_errors,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Terminal condition reached"
                    );
                    return Ok(PollOutcome {
                        label,
                        status,
                        attempts,
                        transient_errors,
                        elapsed,
                    });
                }
                PollState::TimedOut => {
                    let elapsed = now - start;
                    warn!(object = %object, attempts, transient_errors, "Timed out waiting for terminal condition");
                    return Err(HarnessError::TimedOut {
                        object: object.clone(),
                        elapsed,
                        attempts,
                        last_status,
                    });
                }
                PollState::Pending => {
                    let wait = self.config.interval.min(deadline - now);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{Condition, ConditionStatus};

    fn status_with(kinds: &[ConditionKind]) -> UnitOfWorkStatus {
        UnitOfWorkStatus {
            conditions: kinds
                .iter()
                .map(|k| Condition::new(k.clone(), ConditionStatus::True))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_state_machine_absorbing() {
        assert_eq!(PollState::Pending.advance(false, false), PollState::Pending);
        assert_eq!(PollState::Pending.advance(true, false), PollState::Terminal);
        assert_eq!(PollState::Pending.advance(false, true), PollState::TimedOut);
        assert_eq!(PollState::Pending.advance(true, true), PollState::Terminal);
        assert_eq!(PollState::Terminal.advance(false, true), PollState::Terminal);
        assert_eq!(PollState::TimedOut.advance(true, false), PollState::TimedOut);
    }

    #[test]
    fn test_poll_config_requires_positive_interval() {
        let zero = PollConfig {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(zero.validate(), Err(HarnessError::Config(_))));

        let short = PollConfig {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
        };
        assert!(short.validate().is_err());
        assert!(PollConfig::default().validate().is_ok());
    }

    #[test]
    fn test_first_matching_predicate_wins() {
        let predicates = job_finished();
        let both = status_with(&[ConditionKind::Failed, ConditionKind::Complete]);
        let hit = predicates.iter().find(|p| p.matches(&both)).unwrap();
        assert_eq!(hit.label(), "Complete=True");

        let failed = status_with(&[ConditionKind::Failed]);
        let hit = predicates.iter().find(|p| p.matches(&failed)).unwrap();
        assert_eq!(hit.label(), "Failed=True");
    }

    #[test]
    fn test_custom_predicate() {
        let p = TerminalPredicate::new("two-succeeded", |s| s.succeeded >= 2);
        assert!(!p.matches(&UnitOfWorkStatus::default()));
        assert!(p.matches(&UnitOfWorkStatus {
            succeeded: 2,
            ..Default::default()
        }));
        assert!(format!("{p:?}").contains("two-succeeded"));
    }
}
