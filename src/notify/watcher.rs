//! File watching with keyed byte-payload callbacks.

use crate::error::{ConfigError, Result};
use crate::notify::registry::{ByteCallback, CallbackRegistry, invoke_guarded, panic_message};
use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What the dispatch loop does with a raw filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventAction {
    /// File content changed; re-read and dispatch.
    Dispatch,
    /// File was removed; stop watching.
    Terminate,
    Ignore,
}

impl EventAction {
    fn classify(kind: &EventKind) -> Self {
        match kind {
            EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Other) => EventAction::Dispatch,
            EventKind::Remove(_) => EventAction::Terminate,
            _ => EventAction::Ignore,
        }
    }
}

/// Watches a single file and hands its contents to registered callbacks.
///
/// Each callback is registered under an opaque key so independent consumers
/// can share one watcher. When the file is written, the watcher reads it and
/// invokes every callback with the fresh bytes. Removing the file stops the
/// watcher for good; watching a recreated file takes a new `FileWatcher`.
///
/// Dispatch runs on a background tokio task, so [`start_watching`] must be
/// called from within a tokio runtime.
///
/// [`start_watching`]: FileWatcher::start_watching
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_policy::notify::FileWatcher;
/// use std::sync::Arc;
///
/// # async fn example() -> hotswap_policy::error::Result<()> {
/// let watcher = FileWatcher::new("/etc/app/policies.json")?;
/// watcher.register_callback(
///     Arc::new(|data: &[u8]| println!("config is {} bytes", data.len())),
///     "size-logger",
/// )?;
///
/// // Initial snapshot, then follow changes
/// watcher.call_once_all()?;
/// watcher.start_watching()?;
///
/// // ...
/// watcher.stop_watching();
/// # Ok(())
/// # }
/// ```
pub struct FileWatcher {
    path: PathBuf,
    callbacks: Arc<CallbackRegistry<ByteCallback>>,
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FileWatcher {
    /// Create a watcher for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PathNotFound`] if the file does not exist.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(ConfigError::PathNotFound(path));
        }

        Ok(Self {
            path,
            callbacks: Arc::new(CallbackRegistry::new("file_watcher")),
            stop: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    /// The watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a callback to run with the file contents on every change.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateKey`] if `key` is already registered.
    pub fn register_callback(&self, callback: ByteCallback, key: impl Into<String>) -> Result<()> {
        self.callbacks.register(key, callback)
    }

    /// Remove the callback under `key`. Unknown keys are logged and ignored.
    pub fn deregister_callback(&self, key: &str) {
        if self.callbacks.deregister(key) {
            info!(path = %self.path.display(), key, "file watcher deregistered callback");
        }
    }

    /// Number of registered callbacks.
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether a callback is registered under `key`.
    pub fn has_callback(&self, key: &str) -> bool {
        self.callbacks.contains(key)
    }

    /// Subscribe to the file and spawn the dispatch task.
    ///
    /// Returns as soon as the task is launched.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher was already started or stopped, if no
    /// tokio runtime is running, or if the subscription cannot be established
    /// (e.g. the file was removed after construction).
    pub fn start_watching(&self) -> Result<()> {
        if self.stop.is_cancelled() {
            return Err(ConfigError::WatchError(format!(
                "watcher for {} has been stopped",
                self.path.display()
            )));
        }

        let mut task = self.task.lock();
        if task.is_some() {
            return Err(ConfigError::WatchError(format!(
                "already watching {}",
                self.path.display()
            )));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConfigError::WatchError(format!("no tokio runtime: {}", e)))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        let dispatcher = Dispatcher {
            path: self.path.clone(),
            callbacks: Arc::clone(&self.callbacks),
            stop: self.stop.clone(),
        };
        *task = Some(runtime.spawn(dispatcher.run(watcher, event_rx)));

        info!(path = %self.path.display(), "started watching file");
        Ok(())
    }

    /// Signal the dispatch task to stop. Calling this more than once is a no-op.
    pub fn stop_watching(&self) {
        if self.stop.is_cancelled() {
            debug!(path = %self.path.display(), "file watcher already stopped");
            return;
        }
        info!(path = %self.path.display(), "stop watching file");
        self.stop.cancel();
    }

    /// Whether the dispatch task is running and has not been told to stop.
    pub fn is_watching(&self) -> bool {
        !self.stop.is_cancelled() && self.task.lock().is_some()
    }

    /// Resolves once the watcher has been stopped, either by
    /// [`stop_watching`](Self::stop_watching) or by removal of the file.
    pub async fn stopped(&self) {
        self.stop.cancelled().await;
    }

    /// Read the file and invoke every registered callback with its contents.
    ///
    /// Blocks on the read and on each callback. Invocation order is
    /// unspecified.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn call_once_all(&self) -> Result<()> {
        dispatch_all(&self.path, &self.callbacks)
    }

    /// Read the file and invoke only the callback under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or
    /// [`ConfigError::KeyNotFound`] if `key` is not registered.
    pub fn call_once_specific(&self, key: &str) -> Result<()> {
        let callback = self
            .callbacks
            .get(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
        let data = std::fs::read(&self.path)?;
        invoke_guarded(self.callbacks.owner(), key, || callback(&data));
        Ok(())
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn dispatch_all(path: &Path, callbacks: &CallbackRegistry<ByteCallback>) -> Result<()> {
    let data = std::fs::read(path)?;
    for (key, callback) in callbacks.snapshot() {
        invoke_guarded(callbacks.owner(), &key, || callback(&data));
    }
    Ok(())
}

/// State owned by the background dispatch task.
struct Dispatcher {
    path: PathBuf,
    callbacks: Arc<CallbackRegistry<ByteCallback>>,
    stop: CancellationToken,
}

impl Dispatcher {
    async fn run(
        self,
        mut watcher: RecommendedWatcher,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                received = events.recv() => match received {
                    Some(Ok(event)) => {
                        if !self.handle_event(event).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!(path = %self.path.display(), error = %e, "file watcher error");
                    }
                    None => break,
                },
            }
        }

        // Closing the subscription is the last thing the task does.
        if let Err(e) = watcher.unwatch(&self.path) {
            debug!(path = %self.path.display(), error = %e, "unwatch after stop failed");
        }
        drop(watcher);
        debug!(path = %self.path.display(), "file watcher task exited");
    }

    /// Returns `false` once the loop should exit.
    async fn handle_event(&self, event: Event) -> bool {
        match EventAction::classify(&event.kind) {
            EventAction::Dispatch => {
                self.dispatch().await;
                true
            }
            EventAction::Terminate => {
                warn!(path = %self.path.display(), "file is removed, stop watching");
                self.stop.cancel();
                false
            }
            EventAction::Ignore => true,
        }
    }

    /// Runs one dispatch cycle on the blocking pool and waits for it, so
    /// cycles never overlap.
    async fn dispatch(&self) {
        let path = self.path.clone();
        let callbacks = Arc::clone(&self.callbacks);
        match tokio::task::spawn_blocking(move || dispatch_all(&path, &callbacks)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(path = %self.path.display(), error = %e, "read config file failed");
            }
            Err(e) if e.is_panic() => {
                error!(
                    path = %self.path.display(),
                    panic = %panic_message(e.into_panic().as_ref()),
                    "file watcher dispatch panicked"
                );
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "file watcher dispatch aborted");
            }
        }
    }
}
