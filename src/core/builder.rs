//! Builder wiring a file watcher and a config monitor together.

use crate::core::{ConfigManager, ConfigMonitor};
use crate::error::{ConfigError, Result};
use crate::notify::{FileWatcher, NotifyCallback};
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for a [`ConfigMonitor`] that owns its own [`FileWatcher`].
///
/// Covers the common case of one service watching one file. When several
/// monitors share a watcher, construct them with [`ConfigMonitor::new`]
/// instead.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_policy::core::{ConfigMonitorBuilder, FileManager};
/// use hotswap_policy::policy::ClientFileConfig;
/// use std::sync::Arc;
///
/// # async fn example() -> hotswap_policy::error::Result<()> {
/// let path = "/etc/app/policies.yaml";
/// let monitor = ConfigMonitorBuilder::new(path)
///     .with_key("svcA")
///     .with_manager(FileManager::<ClientFileConfig>::for_path(path)?)
///     .with_callback("logger", Arc::new(|| println!("svcA refreshed")))
///     .build()?;
///
/// assert!(monitor.watcher().is_watching());
/// # Ok(())
/// # }
/// ```
pub struct ConfigMonitorBuilder<M> {
    path: PathBuf,
    key: Option<String>,
    manager: Option<M>,
    callbacks: Vec<(String, NotifyCallback)>,
    watch: bool,
}

impl<M: ConfigManager> ConfigMonitorBuilder<M> {
    /// Start building a monitor for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: None,
            manager: None,
            callbacks: Vec::new(),
            watch: true,
        }
    }

    /// Set the key whose sub-config the monitor extracts.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the decoder.
    pub fn with_manager(mut self, manager: M) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Register a callback before the initial load, so it sees the first config.
    pub fn with_callback(mut self, key: impl Into<String>, callback: NotifyCallback) -> Self {
        self.callbacks.push((key.into(), callback));
        self
    }

    /// Whether to start the file watcher after the initial load (default: true).
    ///
    /// Without it the monitor only refreshes on [`ConfigMonitor::reload`] or
    /// manual watcher dispatch.
    pub fn with_file_watch(mut self, enabled: bool) -> Self {
        self.watch = enabled;
        self
    }

    /// Create the watcher and monitor, load the initial config, and start watching.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The key is missing or empty
    /// - No manager was set
    /// - A callback key is registered twice
    /// - The initial read fails
    /// - The file watcher cannot be started
    pub fn build(self) -> Result<ConfigMonitor<M>> {
        let watcher = Arc::new(FileWatcher::new(self.path)?);
        let key = self.key.ok_or(ConfigError::EmptyKey)?;
        let monitor = ConfigMonitor::new(key, Arc::clone(&watcher))?;

        let manager = self
            .manager
            .ok_or_else(|| ConfigError::ManagerNotSet(monitor.key().to_string()))?;
        monitor.set_manager(manager);

        for (key, callback) in self.callbacks {
            monitor.register_callback(callback, key)?;
        }

        monitor.start()?;
        if self.watch {
            watcher.start_watching()?;
        }
        Ok(monitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FileManager, Format};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    type Manager = FileManager<HashMap<String, u32>>;

    #[test]
    fn test_builder_defaults() {
        let builder: ConfigMonitorBuilder<Manager> = ConfigMonitorBuilder::new("config.json");
        assert!(builder.key.is_none());
        assert!(builder.manager.is_none());
        assert!(builder.watch);
    }

    #[test]
    fn test_builder_accumulates_callbacks() {
        let builder: ConfigMonitorBuilder<Manager> = ConfigMonitorBuilder::new("config.json")
            .with_callback("a", Arc::new(|| {}))
            .with_callback("b", Arc::new(|| {}));
        assert_eq!(builder.callbacks.len(), 2);
    }

    #[test]
    fn test_build_missing_file() {
        let result = ConfigMonitorBuilder::new("/nonexistent/config.json")
            .with_key("svc")
            .with_manager(Manager::new(Format::Json))
            .build();
        assert!(matches!(result, Err(ConfigError::PathNotFound(_))));
    }

    #[test]
    fn test_build_requires_key_and_manager() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{}").unwrap();

        let result = ConfigMonitorBuilder::new(&path)
            .with_manager(Manager::new(Format::Json))
            .build();
        assert!(matches!(result, Err(ConfigError::EmptyKey)));

        let result = ConfigMonitorBuilder::<Manager>::new(&path)
            .with_key("svc")
            .build();
        assert!(matches!(result, Err(ConfigError::ManagerNotSet(_))));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_build_without_watch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"svc": {"limit": 5}}"#).unwrap();

        let monitor = ConfigMonitorBuilder::new(&path)
            .with_key("svc")
            .with_manager(Manager::new(Format::Json))
            .with_file_watch(false)
            .build()
            .unwrap();

        assert_eq!(monitor.config().unwrap().get("limit"), Some(&5));
        assert!(!monitor.watcher().is_watching());
    }
}
