//! Test support for jobprobe.
//!
//! [`FakeControlPlane`] stands in for a cluster so the harness can be
//! exercised without one. The helpers below build statuses and contexts the
//! way most tests need them.

pub mod fake;
pub mod script;

use std::sync::Arc;
use std::time::Duration;

use jobprobe_harness::status::{Condition, ConditionKind, ConditionStatus};
use jobprobe_harness::{HarnessConfig, HarnessContext, UnitOfWorkStatus};
use jobprobe_names::NamespaceName;

pub use fake::{FakeControlPlane, JobBehavior};

/// Configuration with a 1s interval and 10s timeout.
pub fn test_config() -> HarnessConfig {
    HarnessConfig {
        poll_interval: Duration::from_secs(1),
        timeout: Duration::from_secs(10),
        ..HarnessConfig::default()
    }
}

/// A context backed by `fake`. Panics on an invalid `config`.
pub fn fake_context(fake: &Arc<FakeControlPlane>, config: HarnessConfig) -> HarnessContext {
    match HarnessContext::new(fake.clone(), config) {
        Ok(ctx) => ctx,
        Err(e) => panic!("invalid test config: {e}"),
    }
}

/// A fresh namespace with the given prefix.
pub fn unique_namespace(prefix: &str) -> NamespaceName {
    match NamespaceName::generate(prefix) {
        Ok(ns) => ns,
        Err(e) => panic!("invalid namespace prefix '{prefix}': {e}"),
    }
}

/// Status of a job with `active` running pods.
pub fn running(active: i32) -> UnitOfWorkStatus {
    UnitOfWorkStatus {
        active,
        ..UnitOfWorkStatus::default()
    }
}

/// Status of a job whose pods all succeeded.
pub fn complete() -> UnitOfWorkStatus {
    UnitOfWorkStatus {
        conditions: vec![Condition::new(ConditionKind::Complete, ConditionStatus::True)],
        succeeded: 1,
        ..UnitOfWorkStatus::default()
    }
}

/// Status of a job that exhausted its retries.
pub fn failed() -> UnitOfWorkStatus {
    UnitOfWorkStatus {
        conditions: vec![Condition::new(ConditionKind::Failed, ConditionStatus::True)
            .with_reason("BackoffLimitExceeded")],
        failed: 1,
        ..UnitOfWorkStatus::default()
    }
}

/// Status carrying a single condition.
pub fn with_condition(kind: ConditionKind, status: ConditionStatus) -> UnitOfWorkStatus {
    UnitOfWorkStatus {
        conditions: vec![Condition::new(kind, status)],
        ..UnitOfWorkStatus::default()
    }
}
