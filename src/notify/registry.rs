//! Keyed callback registries for change notifications.

use crate::error::{ConfigError, Result};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Callback invoked with the full contents of the watched file.
pub type ByteCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Callback invoked after a monitor refreshed its config.
pub type NotifyCallback = Arc<dyn Fn() + Send + Sync>;

/// Registry mapping opaque string keys to callbacks.
///
/// Keys are unique: registering a key twice fails and leaves the first
/// callback installed. Deregistering an unknown key only logs a warning.
///
/// Dispatch never runs under the registry lock. Callers take a
/// [`snapshot`](Self::snapshot) and invoke the copied callbacks, so a callback
/// may register or deregister other callbacks without deadlocking.
///
/// # Examples
///
/// ```rust
/// use hotswap_policy::notify::{CallbackRegistry, NotifyCallback};
/// use std::sync::Arc;
///
/// let registry: CallbackRegistry<NotifyCallback> = CallbackRegistry::new("example");
/// registry.register("audit", Arc::new(|| println!("config changed"))).unwrap();
///
/// assert!(registry.register("audit", Arc::new(|| {})).is_err());
/// assert!(registry.deregister("audit"));
/// assert!(!registry.deregister("audit"));
/// ```
pub struct CallbackRegistry<F> {
    owner: &'static str,
    callbacks: Mutex<HashMap<String, F>>,
}

impl<F: Clone> CallbackRegistry<F> {
    /// Create an empty registry. `owner` labels log records.
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    /// Register `callback` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateKey`] if `key` is already registered.
    pub fn register(&self, key: impl Into<String>, callback: F) -> Result<()> {
        let key = key.into();
        let mut callbacks = self.callbacks.lock();
        if callbacks.contains_key(&key) {
            return Err(ConfigError::DuplicateKey(key));
        }
        debug!(owner = self.owner, key = %key, "callback registered");
        callbacks.insert(key, callback);
        Ok(())
    }

    /// Remove the callback under `key`. Returns whether one was removed.
    pub fn deregister(&self, key: &str) -> bool {
        let removed = self.callbacks.lock().remove(key).is_some();
        if removed {
            debug!(owner = self.owner, key, "callback deregistered");
        } else {
            warn!(owner = self.owner, key, "callback not registered");
        }
        removed
    }

    /// Get a copy of the callback under `key`.
    pub fn get(&self, key: &str) -> Option<F> {
        self.callbacks.lock().get(key).cloned()
    }

    /// Copy every registered callback out of the registry.
    pub fn snapshot(&self) -> Vec<(String, F)> {
        self.callbacks
            .lock()
            .iter()
            .map(|(key, callback)| (key.clone(), callback.clone()))
            .collect()
    }

    /// Keys currently registered.
    pub fn keys(&self) -> Vec<String> {
        self.callbacks.lock().keys().cloned().collect()
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.callbacks.lock().contains_key(key)
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }

    pub(crate) fn owner(&self) -> &'static str {
        self.owner
    }
}

/// Run a single callback, catching a panic so the remaining callbacks still run.
///
/// Returns `false` if the callback panicked.
pub(crate) fn invoke_guarded(owner: &'static str, key: &str, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                owner,
                key,
                panic = %panic_message(payload.as_ref()),
                "callback panicked; continuing"
            );
            false
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> NotifyCallback {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_register_and_snapshot() {
        let registry = CallbackRegistry::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        registry.register("a", counting(&counter)).unwrap();
        registry.register("b", counting(&counter)).unwrap();
        assert_eq!(registry.len(), 2);

        for (_key, callback) in registry.snapshot() {
            callback();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_duplicate_key_keeps_first() {
        let registry = CallbackRegistry::new("test");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        registry.register("dup", counting(&first)).unwrap();
        let err = registry.register("dup", counting(&second)).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateKey(key) if key == "dup"));

        registry.get("dup").unwrap()();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_deregister_is_idempotent() {
        let registry: CallbackRegistry<NotifyCallback> = CallbackRegistry::new("test");
        assert!(!registry.deregister("never"));

        registry.register("k", Arc::new(|| {})).unwrap();
        assert!(registry.deregister("k"));
        assert!(!registry.deregister("k"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_callback_can_reenter_registry() {
        let registry: Arc<CallbackRegistry<NotifyCallback>> =
            Arc::new(CallbackRegistry::new("test"));
        let inner = Arc::clone(&registry);
        registry
            .register(
                "self-removing",
                Arc::new(move || {
                    inner.deregister("self-removing");
                }),
            )
            .unwrap();

        for (_key, callback) in registry.snapshot() {
            callback();
        }
        assert!(!registry.contains("self-removing"));
    }

    #[test]
    fn test_invoke_guarded_catches_panic() {
        assert!(invoke_guarded("test", "ok", || {}));
        assert!(!invoke_guarded("test", "boom", || panic!("boom")));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
