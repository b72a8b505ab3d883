//! Per-method RPC timeouts.

use crate::core::{ConfigManager, ConfigMonitor, KeySet};
use crate::error::Result;
use crate::policy::{ClientFileConfig, TIMEOUT_CALLBACK_KEY, WILDCARD};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Timeouts for one method. Zero means no timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcTimeout {
    /// Whole-call timeout in milliseconds.
    pub rpc_timeout_ms: u64,
    /// Connection establishment timeout in milliseconds.
    pub conn_timeout_ms: u64,
}

impl RpcTimeout {
    /// The call timeout, if any.
    pub fn rpc_timeout(&self) -> Option<Duration> {
        (self.rpc_timeout_ms > 0).then(|| Duration::from_millis(self.rpc_timeout_ms))
    }

    /// The connect timeout, if any.
    pub fn conn_timeout(&self) -> Option<Duration> {
        (self.conn_timeout_ms > 0).then(|| Duration::from_millis(self.conn_timeout_ms))
    }
}

/// Live RPC timeouts keyed by method name, with `"*"` as fallback.
#[derive(Debug, Default)]
pub struct TimeoutContainer {
    timeouts: RwLock<HashMap<String, RpcTimeout>>,
}

impl TimeoutContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the timeouts for `method`.
    pub fn update(&self, method: &str, timeout: RpcTimeout) {
        self.timeouts.write().insert(method.to_string(), timeout);
    }

    /// Remove the timeouts for `method`.
    pub fn delete(&self, method: &str) -> Option<RpcTimeout> {
        self.timeouts.write().remove(method)
    }

    /// The timeouts that apply to `method`, falling back to `"*"`.
    pub fn timeout(&self, method: &str) -> Option<RpcTimeout> {
        let timeouts = self.timeouts.read();
        timeouts.get(method).or_else(|| timeouts.get(WILDCARD)).copied()
    }

    /// Number of methods with timeouts installed.
    pub fn len(&self) -> usize {
        self.timeouts.read().len()
    }

    /// Whether no timeouts are installed.
    pub fn is_empty(&self) -> bool {
        self.timeouts.read().is_empty()
    }
}

/// Keep a [`TimeoutContainer`] in sync with the monitor's `timeout` section.
///
/// Methods that disappear from the file are deleted. If the monitor already
/// holds a config, it is applied before this returns.
///
/// # Errors
///
/// Returns [`ConfigError::DuplicateKey`](crate::error::ConfigError::DuplicateKey)
/// if the monitor already feeds a timeout container.
pub fn init_rpc_timeout<M>(monitor: &ConfigMonitor<M>) -> Result<Arc<TimeoutContainer>>
where
    M: ConfigManager<Config = ClientFileConfig>,
{
    let container = Arc::new(TimeoutContainer::new());
    let installed = KeySet::new();
    let weak = monitor.downgrade();
    let target = Arc::clone(&container);

    let on_change = Arc::new(move || {
        let Some(monitor) = weak.upgrade() else {
            return;
        };
        let Some(config) = monitor.config() else {
            warn!(key = monitor.key(), "timeout config not found, skip");
            return;
        };

        let removed = installed.reconcile(&config.timeout, |method, timeout| {
            target.update(method, *timeout);
            Ok(())
        });
        for method in removed {
            info!(key = monitor.key(), method = %method, "remove method timeout");
            target.delete(&method);
        }
    });

    monitor.register_and_notify(on_change, TIMEOUT_CALLBACK_KEY)?;
    Ok(container)
}
