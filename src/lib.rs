//! # hotswap-policy
//!
//! Live per-method RPC policies driven by a watched configuration file.
//!
//! ## Overview
//!
//! `hotswap-policy` watches one local configuration file and pushes what it
//! contains into running subsystems without a restart:
//! - [`FileWatcher`](notify::FileWatcher) follows a single file and hands its
//!   contents to keyed byte callbacks
//! - [`ConfigMonitor`](core::ConfigMonitor) decodes the file, extracts the
//!   sub-config for one service key and notifies its own callbacks
//! - [`KeySet`](core::KeySet) diffs successive generations of method keys so
//!   stale per-method policies get removed
//! - [`policy`] wires retry, circuit-breaker and timeout consumers to a monitor
//!
//! A parse that fails never clears a good config: the last good config wins.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hotswap_policy::prelude::*;
//!
//! # async fn example() -> hotswap_policy::error::Result<()> {
//! let path = "config/policies.yaml";
//! let monitor = ConfigMonitorBuilder::new(path)
//!     .with_key("svcA")
//!     .with_manager(ClientFileManager::for_path(path)?)
//!     .build()?;
//!
//! let retries = init_retry_container(&monitor)?;
//! let breakers = init_circuit_breaker(&monitor, "svcB")?;
//!
//! if let Some(policy) = retries.policy("Echo") {
//!     println!("Echo retries: {:?}", policy.kind());
//! }
//! println!("{:?}", breakers.service_cb_config(&service_cb_key("svcB", "Echo")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `json`, `yaml` (default), `toml`, `all-formats`: file formats
//! - `metrics`: OpenTelemetry metrics for monitor parse cycles

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod policy;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{
        ConfigManager, ConfigMonitor, ConfigMonitorBuilder, FileManager, Format, KeySet, Validate,
    };
    pub use crate::error::{ConfigError, Result, ValidationError};
    pub use crate::notify::FileWatcher;
    pub use crate::policy::{
        ClientFileConfig, ClientFileManager, init_circuit_breaker, init_retry_container,
        init_rpc_timeout, service_cb_key,
    };
}
