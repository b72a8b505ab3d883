//! Core configuration monitoring types.

mod builder;
mod manager;
mod monitor;
mod reconciler;
mod validation;

pub use builder::ConfigMonitorBuilder;
pub use manager::{ConfigManager, FileManager, Format};
pub use monitor::{ConfigMonitor, WeakConfigMonitor};
pub use reconciler::KeySet;
pub use validation::Validate;
