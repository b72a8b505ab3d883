//! Per-key view of a watched configuration file.

use crate::core::ConfigManager;
use crate::error::{ConfigError, Result};
use crate::notify::registry::invoke_guarded;
use crate::notify::{CallbackRegistry, FileWatcher, NotifyCallback};
use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::MonitorMetrics;

/// Monitors the sub-config for one key inside a watched file.
///
/// The monitor registers a parse handler on a shared [`FileWatcher`]. Every
/// time the file changes, the handler decodes it with the installed
/// [`ConfigManager`], extracts the entry for this monitor's key, stores it,
/// and notifies the monitor's own callbacks.
///
/// A parse that fails, or a document without this key, leaves the previous
/// config in place: the last good config always wins.
///
/// Cloning a `ConfigMonitor` is cheap and yields a handle to the same monitor.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_policy::core::{ConfigMonitor, FileManager, Format};
/// use hotswap_policy::notify::FileWatcher;
/// use hotswap_policy::policy::ClientFileConfig;
/// use std::sync::Arc;
///
/// # async fn example() -> hotswap_policy::error::Result<()> {
/// let watcher = Arc::new(FileWatcher::new("/etc/app/policies.json")?);
/// let monitor = ConfigMonitor::new("svcA", Arc::clone(&watcher))?;
/// monitor.set_manager(FileManager::<ClientFileConfig>::new(Format::Json));
///
/// monitor.register_callback(Arc::new(|| println!("svcA config refreshed")), "logger")?;
/// monitor.start()?;
/// watcher.start_watching()?;
///
/// if let Some(cfg) = monitor.config() {
///     println!("{} retry policies", cfg.retry.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConfigMonitor<M: ConfigManager> {
    inner: Arc<MonitorInner<M>>,
}

/// A non-owning handle to a [`ConfigMonitor`].
///
/// Callbacks registered on a monitor should hold this instead of a full
/// handle, otherwise the monitor keeps itself alive through its own registry.
pub struct WeakConfigMonitor<M: ConfigManager> {
    inner: Weak<MonitorInner<M>>,
}

struct MonitorInner<M: ConfigManager> {
    key: String,
    watcher: Arc<FileWatcher>,
    manager: RwLock<Option<Arc<M>>>,
    config: ArcSwapOption<M::Config>,
    callbacks: CallbackRegistry<NotifyCallback>,
    /// Serializes parse cycles so consumers see generations in order.
    parse_lock: Mutex<()>,
    started: AtomicBool,
    #[cfg(feature = "metrics")]
    metrics: RwLock<Option<MonitorMetrics>>,
}

impl<M: ConfigManager> ConfigMonitor<M> {
    /// Create a monitor for `key` on top of `watcher`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyKey`] if `key` is empty.
    pub fn new(key: impl Into<String>, watcher: Arc<FileWatcher>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(ConfigError::EmptyKey);
        }

        Ok(Self {
            inner: Arc::new(MonitorInner {
                key,
                watcher,
                manager: RwLock::new(None),
                config: ArcSwapOption::empty(),
                callbacks: CallbackRegistry::new("config_monitor"),
                parse_lock: Mutex::new(()),
                started: AtomicBool::new(false),
                #[cfg(feature = "metrics")]
                metrics: RwLock::new(None),
            }),
        })
    }

    /// The key this monitor extracts.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The watched file.
    pub fn file_path(&self) -> &Path {
        self.inner.watcher.path()
    }

    /// The underlying file watcher.
    pub fn watcher(&self) -> &Arc<FileWatcher> {
        &self.inner.watcher
    }

    /// Install the decoder. Must be called before [`start`](Self::start).
    pub fn set_manager(&self, manager: M) {
        *self.inner.manager.write() = Some(Arc::new(manager));
    }

    /// Record parse metrics for this monitor.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(self, metrics: MonitorMetrics) -> Self {
        metrics.update_callback_count(self.inner.callbacks.len() as i64);
        *self.inner.metrics.write() = Some(metrics);
        self
    }

    /// Load the current config, then follow changes through the file watcher.
    ///
    /// The initial read, decode and callback round happen before this
    /// returns. The watcher itself is not started here; it may be shared with
    /// other monitors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ManagerNotSet`] without a manager, an IO error
    /// if the file cannot be read, or [`ConfigError::DuplicateKey`] if the
    /// watcher already has a handler under this monitor's key.
    pub fn start(&self) -> Result<()> {
        if self.inner.manager.read().is_none() {
            return Err(ConfigError::ManagerNotSet(self.inner.key.clone()));
        }

        // A taken key would make the registration below fail after the
        // initial parse already ran the callbacks.
        if self.inner.watcher.has_callback(&self.inner.key) {
            return Err(ConfigError::DuplicateKey(self.inner.key.clone()));
        }

        let data = std::fs::read(self.inner.watcher.path()).map_err(|e| {
            error!(key = %self.inner.key, error = %e, "read config file failed");
            ConfigError::from(e)
        })?;
        self.inner.handle(&data);

        let weak = Arc::downgrade(&self.inner);
        self.inner.watcher.register_callback(
            Arc::new(move |data: &[u8]| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle(data);
                }
            }),
            self.inner.key.clone(),
        )?;
        self.inner.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Deregister every callback, then detach from the file watcher.
    ///
    /// The watcher keeps running. Calling this more than once is harmless.
    pub fn stop(&self) {
        for key in self.inner.callbacks.keys() {
            self.deregister_callback(&key);
        }

        if self.inner.started.swap(false, Ordering::SeqCst) {
            self.inner.watcher.deregister_callback(&self.inner.key);
        } else {
            debug!(key = %self.inner.key, "config monitor not started");
        }
    }

    /// Register a callback to run after every successful refresh.
    ///
    /// Callbacks run while the monitor holds its parse lock; they may read
    /// [`config`](Self::config) but must not call [`reload`](Self::reload).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateKey`] if `key` is already registered.
    pub fn register_callback(&self, callback: NotifyCallback, key: impl Into<String>) -> Result<()> {
        self.inner.callbacks.register(key, callback)?;
        self.inner.record_callback_count();
        Ok(())
    }

    /// Register a callback and run it once if a config is already stored.
    ///
    /// Registration and the first run happen under the parse lock, so the
    /// first run never interleaves with a concurrent refresh. Whichever of the
    /// two goes second sees the newer config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateKey`] if `key` is already registered.
    pub fn register_and_notify(
        &self,
        callback: NotifyCallback,
        key: impl Into<String>,
    ) -> Result<()> {
        let key = key.into();
        let _guard = self.inner.parse_lock.lock();
        self.inner.callbacks.register(key.clone(), Arc::clone(&callback))?;
        self.inner.record_callback_count();

        if self.inner.config.load().is_some() {
            self.inner.invoke(&key, &callback);
        }
        Ok(())
    }

    /// Remove the callback under `key`. Unknown keys are logged and ignored.
    pub fn deregister_callback(&self, key: &str) {
        self.inner.callbacks.deregister(key);
        self.inner.record_callback_count();
    }

    /// The most recent successfully extracted sub-config.
    ///
    /// Returns `None` until the first successful parse.
    pub fn config(&self) -> Option<Arc<M::Config>> {
        self.inner.config.load_full()
    }

    /// Re-read and re-parse the file now, reporting failures to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded, or if it has no
    /// entry for this monitor's key. The stored config is unchanged on error.
    pub fn reload(&self) -> Result<()> {
        let data = std::fs::read(self.inner.watcher.path())?;
        self.inner.apply(&data)
    }

    /// A handle that does not keep the monitor alive.
    pub fn downgrade(&self) -> WeakConfigMonitor<M> {
        WeakConfigMonitor {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<M: ConfigManager> Clone for ConfigMonitor<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ConfigManager> WeakConfigMonitor<M> {
    /// Get a full handle if the monitor is still alive.
    pub fn upgrade(&self) -> Option<ConfigMonitor<M>> {
        self.inner.upgrade().map(|inner| ConfigMonitor { inner })
    }
}

impl<M: ConfigManager> Clone for WeakConfigMonitor<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<M: ConfigManager> MonitorInner<M> {
    /// Parse handler: apply and log the outcome.
    fn handle(&self, data: &[u8]) {
        #[cfg(feature = "metrics")]
        let timer = self.metrics.read().as_ref().map(|m| m.start_parse());

        let result = self.apply(data);

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (self.metrics.read().as_ref(), timer) {
            match &result {
                Ok(()) => metrics.record_parse_success(timer),
                Err(_) => metrics.record_parse_failure(timer),
            }
        }

        match result {
            Ok(()) => info!(key = %self.key, "config parse and update complete"),
            Err(ConfigError::MissingConfig(_)) => {
                warn!(key = %self.key, "no matching key found, skip");
            }
            Err(e) => warn!(key = %self.key, error = %e, "failed to parse the config file"),
        }
    }

    fn apply(&self, data: &[u8]) -> Result<()> {
        let _guard = self.parse_lock.lock();

        let manager = self
            .manager
            .read()
            .clone()
            .ok_or_else(|| ConfigError::ManagerNotSet(self.key.clone()))?;

        let document = manager.decode(data)?;
        let config = manager
            .extract(document, &self.key)
            .ok_or_else(|| ConfigError::MissingConfig(self.key.clone()))?;

        self.config.store(Some(Arc::new(config)));

        for (key, callback) in self.callbacks.snapshot() {
            self.invoke(&key, &callback);
        }
        Ok(())
    }

    /// Run one callback; the caller holds the parse lock.
    fn invoke(&self, key: &str, callback: &NotifyCallback) {
        if !invoke_guarded(self.callbacks.owner(), key, || callback()) {
            self.record_callback_panic();
        }
    }

    fn record_callback_panic(&self) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.metrics.read().as_ref() {
            metrics.record_callback_panic();
        }
    }

    fn record_callback_count(&self) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.metrics.read().as_ref() {
            metrics.update_callback_count(self.callbacks.len() as i64);
        }
    }
}

impl<M: ConfigManager> Drop for MonitorInner<M> {
    fn drop(&mut self) {
        // The watcher handler only holds a weak reference; free its key.
        if *self.started.get_mut() {
            self.watcher.deregister_callback(&self.key);
        }
    }
}
