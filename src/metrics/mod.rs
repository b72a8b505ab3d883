//! Built-in metrics for config monitors.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Parse attempts/success/failures
//! - Parse duration
//! - Callback panics
//! - Registered callbacks
//!
//! # Examples
//!
//! ```rust,no_run
//! use hotswap_policy::core::{ConfigMonitor, FileManager, Format};
//! use hotswap_policy::metrics::MonitorMetrics;
//! use hotswap_policy::notify::FileWatcher;
//! use hotswap_policy::policy::ClientFileConfig;
//! use opentelemetry::global;
//! use std::sync::Arc;
//!
//! # fn example() -> hotswap_policy::error::Result<()> {
//! let watcher = Arc::new(FileWatcher::new("policies.json")?);
//! let monitor = ConfigMonitor::new("svcA", watcher)?
//!     .with_metrics(MonitorMetrics::new(global::meter("my-app")));
//! monitor.set_manager(FileManager::<ClientFileConfig>::new(Format::Json));
//! monitor.start()?;
//! # Ok(())
//! # }
//! ```

mod monitor_metrics;

pub use monitor_metrics::MonitorMetrics;
