//! Per-method RPC client policies driven by a config monitor.
//!
//! Each consumer registers one callback on a [`ConfigMonitor`] whose config
//! type is [`ClientFileConfig`]. On every refresh it installs the entries of
//! its section and uses a [`KeySet`] to remove the methods that vanished:
//!
//! - [`init_retry_container`]: retry policies, removed methods are deleted.
//! - [`init_circuit_breaker`]: breaker thresholds, removed methods fall back
//!   to the default thresholds.
//! - [`init_rpc_timeout`]: RPC timeouts, removed methods are deleted.
//!
//! [`ConfigMonitor`]: crate::core::ConfigMonitor
//! [`KeySet`]: crate::core::KeySet

mod circuit_breaker;
mod retry;
mod timeout;

pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerSuite, init_circuit_breaker, service_cb_key,
};
pub use retry::{
    BackoffPolicy, BackoffType, BackupPolicy, CbPolicy, FailurePolicy, MAX_RETRY_TIMES,
    RetryContainer, RetryKind, RetryPolicy, StopPolicy, init_retry_container,
};
pub use timeout::{RpcTimeout, TimeoutContainer, init_rpc_timeout};

use crate::core::FileManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Method key matching every method without its own entry.
pub const WILDCARD: &str = "*";

/// Monitor callback key used by [`init_retry_container`].
pub const RETRY_CALLBACK_KEY: &str = "retry";

/// Monitor callback key used by [`init_circuit_breaker`].
pub const CIRCUIT_BREAKER_CALLBACK_KEY: &str = "circuit_breaker";

/// Monitor callback key used by [`init_rpc_timeout`].
pub const TIMEOUT_CALLBACK_KEY: &str = "rpc_timeout";

/// Client-side policies for one service, keyed by method name.
///
/// Missing sections decode as empty, which removes every policy of that kind.
///
/// ```yaml
/// svcA:
///   timeout:
///     "*": { rpc_timeout_ms: 1000, conn_timeout_ms: 50 }
///   retry:
///     Echo:
///       failure_policy:
///         stop_policy: { max_retry_times: 2 }
///   circuitbreaker:
///     Echo: { enable: true, err_rate: 0.3, min_sample: 100 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientFileConfig {
    /// RPC timeouts.
    pub timeout: HashMap<String, RpcTimeout>,
    /// Retry policies.
    pub retry: HashMap<String, RetryPolicy>,
    /// Circuit-breaker thresholds.
    pub circuitbreaker: HashMap<String, CircuitBreakerConfig>,
}

/// Manager decoding a file of [`ClientFileConfig`] entries keyed by service.
pub type ClientFileManager = FileManager<ClientFileConfig>;
