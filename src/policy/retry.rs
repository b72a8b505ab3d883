//! Per-method retry policies.

use crate::core::{ConfigManager, ConfigMonitor, KeySet, Validate};
use crate::error::{Result, ValidationError};
use crate::policy::{ClientFileConfig, RETRY_CALLBACK_KEY, WILDCARD};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on `stop_policy.max_retry_times`.
pub const MAX_RETRY_TIMES: u32 = 5;

/// Retry policy for one method.
///
/// Exactly one of `failure_policy` (retry after a failed call) and
/// `backup_policy` (send a backup request after a delay) must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Whether retries are enabled for the method.
    #[serde(default = "default_enable")]
    pub enable: bool,
    /// Retry after a failed call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
    /// Send a backup request when the first one is slow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_policy: Option<BackupPolicy>,
}

fn default_enable() -> bool {
    true
}

/// Which kind of retry a policy configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    /// Retry on failure.
    Failure,
    /// Backup request.
    Backup,
}

impl RetryPolicy {
    /// A failure-retry policy.
    pub fn failure(policy: FailurePolicy) -> Self {
        Self {
            enable: true,
            failure_policy: Some(policy),
            backup_policy: None,
        }
    }

    /// A backup-request policy.
    pub fn backup(policy: BackupPolicy) -> Self {
        Self {
            enable: true,
            failure_policy: None,
            backup_policy: Some(policy),
        }
    }

    /// The kind of retry configured, if exactly one is set.
    pub fn kind(&self) -> Option<RetryKind> {
        match (&self.failure_policy, &self.backup_policy) {
            (Some(_), None) => Some(RetryKind::Failure),
            (None, Some(_)) => Some(RetryKind::Backup),
            _ => None,
        }
    }
}

impl Validate for RetryPolicy {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        match (&self.failure_policy, &self.backup_policy) {
            (Some(_), Some(_)) => Err(ValidationError::custom(
                "BackupPolicy and FailurePolicy must not be set at same time",
            )),
            (None, None) => Err(ValidationError::custom(
                "BackupPolicy and FailurePolicy must not be empty at same time",
            )),
            (Some(failure), None) => failure.stop_policy.validate(),
            (None, Some(backup)) => {
                if backup.retry_delay_ms == 0 {
                    return Err(ValidationError::invalid_field(
                        "backup_policy.retry_delay_ms",
                        "must be greater than 0",
                    ));
                }
                backup.stop_policy.validate()
            }
        }
    }
}

/// Retry after a failed call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailurePolicy {
    /// When to give up.
    pub stop_policy: StopPolicy,
    /// Delay between attempts; no delay when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_policy: Option<BackoffPolicy>,
    /// Allow retrying on the node that just failed.
    pub retry_same_node: bool,
}

/// Send a backup request if the first one has not answered after a delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupPolicy {
    /// Delay before the backup request is sent.
    pub retry_delay_ms: u32,
    /// When to give up.
    pub stop_policy: StopPolicy,
    /// Allow the backup request to hit the same node.
    pub retry_same_node: bool,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            retry_delay_ms: 100,
            stop_policy: StopPolicy::default(),
            retry_same_node: false,
        }
    }
}

/// When to give up retrying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopPolicy {
    /// Maximum number of retries, at most [`MAX_RETRY_TIMES`].
    pub max_retry_times: u32,
    /// Total time budget for the call and its retries; 0 means unbounded.
    pub max_duration_ms: u32,
    /// Keep retrying even if an upstream call was itself a retry.
    pub disable_chain_stop: bool,
    /// Stop once the request deadline has passed.
    pub ddl_stop: bool,
    /// Error-rate breaker for retries.
    pub cb_policy: CbPolicy,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            max_retry_times: 2,
            max_duration_ms: 0,
            disable_chain_stop: false,
            ddl_stop: false,
            cb_policy: CbPolicy::default(),
        }
    }
}

impl Validate for StopPolicy {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut errors = Vec::new();
        if self.max_retry_times > MAX_RETRY_TIMES {
            errors.push(ValidationError::invalid_field(
                "stop_policy.max_retry_times",
                format!("must be at most {}", MAX_RETRY_TIMES),
            ));
        }
        if !(self.cb_policy.error_rate > 0.0 && self.cb_policy.error_rate <= 0.3) {
            errors.push(ValidationError::invalid_field(
                "stop_policy.cb_policy.error_rate",
                "must be in (0, 0.3]",
            ));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

/// Stop retrying once the method's error rate exceeds `error_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CbPolicy {
    /// Threshold in (0, 0.3].
    pub error_rate: f64,
}

impl Default for CbPolicy {
    fn default() -> Self {
        Self { error_rate: 0.1 }
    }
}

/// Delay between retries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Strategy.
    pub backoff_type: BackoffType,
    /// Type-specific settings, e.g. `fix_ms` or `min_ms`/`max_ms`.
    pub cfg_items: HashMap<String, f64>,
}

/// Backoff strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffType {
    /// Retry immediately.
    #[default]
    None,
    /// Wait `cfg_items["fix_ms"]`.
    Fixed,
    /// Wait a random time between `cfg_items["min_ms"]` and `cfg_items["max_ms"]`.
    Random,
}

/// Live retry policies keyed by method name.
///
/// `"*"` acts as a fallback for methods without their own policy.
#[derive(Debug, Default)]
pub struct RetryContainer {
    policies: RwLock<HashMap<String, RetryPolicy>>,
}

impl RetryContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the policy for `method`.
    pub fn notify_policy_change(&self, method: &str, policy: RetryPolicy) {
        debug!(method, "retry policy updated");
        self.policies.write().insert(method.to_string(), policy);
    }

    /// Remove the policy for `method`.
    pub fn delete_policy(&self, method: &str) -> Option<RetryPolicy> {
        self.policies.write().remove(method)
    }

    /// The policy that applies to `method`, falling back to `"*"`.
    pub fn policy(&self, method: &str) -> Option<RetryPolicy> {
        let policies = self.policies.read();
        policies
            .get(method)
            .or_else(|| policies.get(WILDCARD))
            .cloned()
    }

    /// Whether `method` has its own policy installed.
    pub fn contains(&self, method: &str) -> bool {
        self.policies.read().contains_key(method)
    }

    /// Methods with an installed policy, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.policies.read().keys().cloned().collect();
        methods.sort();
        methods
    }

    /// Number of installed policies.
    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    /// Whether no policy is installed.
    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }
}

/// Keep a [`RetryContainer`] in sync with the monitor's `retry` section.
///
/// Every refresh installs each valid method policy and deletes the methods
/// that disappeared from the file. A method whose entry fails validation is
/// skipped with a warning and keeps whatever policy it had. If the monitor
/// already holds a config, it is applied before this returns.
///
/// # Errors
///
/// Returns [`ConfigError::DuplicateKey`](crate::error::ConfigError::DuplicateKey)
/// if the monitor already feeds a retry container.
pub fn init_retry_container<M>(monitor: &ConfigMonitor<M>) -> Result<Arc<RetryContainer>>
where
    M: ConfigManager<Config = ClientFileConfig>,
{
    let container = Arc::new(RetryContainer::new());
    let installed = KeySet::new();
    let weak = monitor.downgrade();
    let target = Arc::clone(&container);

    let on_change = Arc::new(move || {
        let Some(monitor) = weak.upgrade() else {
            return;
        };
        let Some(config) = monitor.config() else {
            warn!(key = monitor.key(), "retry config not found, skip");
            return;
        };

        let removed = installed.reconcile(&config.retry, |method, policy| {
            policy.validate()?;
            target.notify_policy_change(method, policy.clone());
            Ok(())
        });
        for method in removed {
            info!(key = monitor.key(), method = %method, "remove method retry policy");
            target.delete_policy(&method);
        }
    });

    monitor.register_and_notify(on_change, RETRY_CALLBACK_KEY)?;
    Ok(container)
}
