//! Per-method circuit-breaker thresholds.

use crate::core::{ConfigManager, ConfigMonitor, KeySet, Validate};
use crate::error::{Result, ValidationError};
use crate::policy::{CIRCUIT_BREAKER_CALLBACK_KEY, ClientFileConfig};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Circuit-breaker thresholds for one service method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Whether the breaker may open at all.
    pub enable: bool,
    /// Error rate in (0, 1] above which the breaker opens.
    pub err_rate: f64,
    /// Minimum number of samples before the error rate is trusted.
    pub min_sample: i64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enable: true,
            err_rate: 0.5,
            min_sample: 200,
        }
    }
}

impl Validate for CircuitBreakerConfig {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if !(self.err_rate > 0.0 && self.err_rate <= 1.0) {
            return Err(ValidationError::invalid_field("err_rate", "must be in (0, 1]"));
        }
        if self.min_sample <= 0 {
            return Err(ValidationError::invalid_field(
                "min_sample",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Breaker key for a call to `method` on `to_service`.
pub fn service_cb_key(to_service: &str, method: &str) -> String {
    let mut key = String::with_capacity(to_service.len() + method.len() + 1);
    key.push_str(to_service);
    key.push('/');
    key.push_str(method);
    key
}

/// Live circuit-breaker thresholds keyed by [`service_cb_key`].
///
/// Lookups always resolve: keys without an entry get
/// [`CircuitBreakerConfig::default`].
#[derive(Debug, Default)]
pub struct CircuitBreakerSuite {
    configs: RwLock<HashMap<String, CircuitBreakerConfig>>,
}

impl CircuitBreakerSuite {
    /// Create a suite with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the thresholds for `key`.
    pub fn update_service_cb_config(&self, key: impl Into<String>, config: CircuitBreakerConfig) {
        self.configs.write().insert(key.into(), config);
    }

    /// The thresholds that apply to `key`.
    pub fn service_cb_config(&self, key: &str) -> CircuitBreakerConfig {
        self.configs.read().get(key).cloned().unwrap_or_default()
    }

    /// Keys with explicit thresholds, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.configs.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Keep a [`CircuitBreakerSuite`] in sync with the monitor's `circuitbreaker`
/// section for calls to `to_service`.
///
/// Methods that disappear from the file are reset to
/// [`CircuitBreakerConfig::default`] rather than deleted. Invalid entries are
/// skipped with a warning. If the monitor already holds a config, it is applied
/// before this returns.
///
/// # Errors
///
/// Returns [`ConfigError::DuplicateKey`](crate::error::ConfigError::DuplicateKey)
/// if the monitor already feeds a circuit-breaker suite.
pub fn init_circuit_breaker<M>(
    monitor: &ConfigMonitor<M>,
    to_service: impl Into<String>,
) -> Result<Arc<CircuitBreakerSuite>>
where
    M: ConfigManager<Config = ClientFileConfig>,
{
    let suite = Arc::new(CircuitBreakerSuite::new());
    let installed = KeySet::new();
    let to_service = to_service.into();
    let weak = monitor.downgrade();
    let target = Arc::clone(&suite);

    let on_change = Arc::new(move || {
        let Some(monitor) = weak.upgrade() else {
            return;
        };
        let Some(config) = monitor.config() else {
            warn!(key = monitor.key(), "circuit breaker config not found, skip");
            return;
        };

        let removed = installed.reconcile(&config.circuitbreaker, |method, cb| {
            cb.validate()?;
            target.update_service_cb_config(service_cb_key(&to_service, method), cb.clone());
            Ok(())
        });
        for method in removed {
            info!(key = monitor.key(), method = %method, "remove method CB config");
            target.update_service_cb_config(
                service_cb_key(&to_service, &method),
                CircuitBreakerConfig::default(),
            );
        }
    });

    monitor.register_and_notify(on_change, CIRCUIT_BREAKER_CALLBACK_KEY)?;
    Ok(suite)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_cb_key() {
        assert_eq!(service_cb_key("svcB", "Echo"), "svcB/Echo");
        assert_eq!(service_cb_key("", ""), "/");
    }

    #[test]
    fn test_validate() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());

        let bad_rate = CircuitBreakerConfig {
            err_rate: 1.5,
            ..CircuitBreakerConfig::default()
        };
        assert!(bad_rate.validate().is_err());

        let bad_sample = CircuitBreakerConfig {
            min_sample: 0,
            ..CircuitBreakerConfig::default()
        };
        assert!(bad_sample.validate().is_err());
    }

    #[test]
    fn test_suite_defaults_unknown_keys() {
        let suite = CircuitBreakerSuite::new();
        assert_eq!(
            suite.service_cb_config("svcB/Echo"),
            CircuitBreakerConfig::default()
        );

        let strict = CircuitBreakerConfig {
            enable: true,
            err_rate: 0.2,
            min_sample: 10,
        };
        suite.update_service_cb_config("svcB/Echo", strict.clone());
        assert_eq!(suite.service_cb_config("svcB/Echo"), strict);
        assert_eq!(suite.keys(), vec!["svcB/Echo".to_string()]);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_deserialize_partial() {
        let cb: CircuitBreakerConfig = serde_json::from_str(r#"{"err_rate": 0.3}"#).unwrap();
        assert!(cb.enable);
        assert_eq!(cb.err_rate, 0.3);
        assert_eq!(cb.min_sample, 200);
    }
}
