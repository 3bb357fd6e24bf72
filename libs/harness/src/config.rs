//! Harness configuration.

use std::path::PathBuf;
use std::time::Duration;

use jobprobe_names::DEFAULT_NAMESPACE_PREFIX;

use crate::error::HarnessError;
use crate::logging::LogFormat;
use crate::poller::{PollConfig, DEFAULT_POLL_INTERVAL};

/// Timeout for quick checks.
pub const TIMEOUT_SHORT: Duration = Duration::from_secs(60);
/// Timeout for workloads that start a few pods.
pub const TIMEOUT_MEDIUM: Duration = Duration::from_secs(2 * 60);
/// Timeout for workloads that install packages or train models.
pub const TIMEOUT_LONG: Duration = Duration::from_secs(5 * 60);

/// Suite-wide configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Interval between status reads.
    pub poll_interval: Duration,

    /// Upper bound on waiting for a terminal condition.
    pub timeout: Duration,

    /// Prefix of generated namespaces.
    pub namespace_prefix: String,

    /// Leave namespaces in place after a run for inspection.
    pub keep_namespaces: bool,

    /// Explicit kubeconfig; inferred from the environment when unset.
    pub kubeconfig: Option<PathBuf>,

    /// Log output format.
    pub log_format: LogFormat,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: TIMEOUT_LONG,
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            keep_namespaces: false,
            kubeconfig: None,
            log_format: LogFormat::Pretty,
            log_filter: "info".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HarnessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let poll_interval =
            duration_secs(&lookup, "JOBPROBE_POLL_INTERVAL_SECS")?.unwrap_or(defaults.poll_interval);

        let timeout = duration_secs(&lookup, "JOBPROBE_TIMEOUT_SECS")?.unwrap_or(defaults.timeout);

        let namespace_prefix =
            lookup("JOBPROBE_NAMESPACE_PREFIX").unwrap_or(defaults.namespace_prefix);

        let keep_namespaces = lookup("JOBPROBE_KEEP_NAMESPACES")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let kubeconfig = lookup("JOBPROBE_KUBECONFIG").map(PathBuf::from);

        let log_format = match lookup("JOBPROBE_LOG_FORMAT") {
            Some(v) => v.parse()?,
            None => defaults.log_format,
        };

        let log_filter = lookup("JOBPROBE_LOG_LEVEL").unwrap_or(defaults.log_filter);

        let config = Self {
            poll_interval,
            timeout,
            namespace_prefix,
            keep_namespaces,
            kubeconfig,
            log_format,
            log_filter,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), HarnessError> {
        self.poll_config().validate()
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            timeout: self.timeout,
        }
    }
}

fn duration_secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>, HarnessError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| HarnessError::Config(format!("{key} must be a number of seconds, got '{raw}'")))?;
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| HarnessError::Config(format!("{key} is out of range: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.timeout, TIMEOUT_LONG);
        assert_eq!(config.namespace_prefix, "test-ns-");
    }

    #[test]
    fn test_overrides() {
        let config = HarnessConfig::from_lookup(lookup(&[
            ("JOBPROBE_POLL_INTERVAL_SECS", "0.5"),
            ("JOBPROBE_TIMEOUT_SECS", "30"),
            ("JOBPROBE_NAMESPACE_PREFIX", "ci-"),
            ("JOBPROBE_KEEP_NAMESPACES", "true"),
            ("JOBPROBE_KUBECONFIG", "/tmp/kubeconfig"),
            ("JOBPROBE_LOG_FORMAT", "json"),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.namespace_prefix, "ci-");
        assert!(config.keep_namespaces);
        assert_eq!(config.kubeconfig, Some(PathBuf::from("/tmp/kubeconfig")));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_garbage_duration() {
        let err = HarnessConfig::from_lookup(lookup(&[("JOBPROBE_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, HarnessError::Config(ref m) if m.contains("JOBPROBE_TIMEOUT_SECS")));
    }

    #[test]
    fn test_rejects_negative_duration() {
        assert!(
            HarnessConfig::from_lookup(lookup(&[("JOBPROBE_POLL_INTERVAL_SECS", "-1")])).is_err()
        );
    }

    #[test]
    fn test_rejects_timeout_below_interval() {
        let err = HarnessConfig::from_lookup(lookup(&[
            ("JOBPROBE_POLL_INTERVAL_SECS", "10"),
            ("JOBPROBE_TIMEOUT_SECS", "5"),
        ]))
        .unwrap_err();
        assert_eq!(err.reason_code(), "config");
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(
            HarnessConfig::from_lookup(lookup(&[("JOBPROBE_POLL_INTERVAL_SECS", "0")])).is_err()
        );
    }
}
