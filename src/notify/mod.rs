//! File change notification.
//!
//! Provides the single-file watcher and the keyed callback registries that
//! fan a change out to independent consumers.

pub mod registry;
pub mod watcher;

pub use registry::{ByteCallback, CallbackRegistry, NotifyCallback};
pub use watcher::FileWatcher;
