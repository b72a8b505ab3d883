//! Error types for hotswap-policy.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for hotswap-policy operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while watching a file or monitoring its configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The watched file does not exist.
    #[error("File not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// A callback is already registered under this key.
    #[error("Callback key already registered: {0}")]
    DuplicateKey(String),

    /// No callback is registered under this key.
    #[error("No callback registered for key: {0}")]
    KeyNotFound(String),

    /// A monitor was constructed with an empty key.
    #[error("Config key must not be empty")]
    EmptyKey,

    /// A monitor was started before a config manager was set.
    #[error("No config manager set for key: {0}")]
    ManagerNotSet(String),

    /// The decoded document has no entry for the monitor's key.
    #[error("No config found for key: {0}")]
    MissingConfig(String),

    /// The file watcher could not be started or is in the wrong state.
    #[error("File watching error: {0}")]
    WatchError(String),

    /// Failed to deserialize the configuration file.
    #[error("Failed to deserialize configuration: {0}")]
    DeserializationError(String),

    /// Attempted to use a feature that is not enabled.
    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(&'static str),

    /// A configuration entry failed validation.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error reported by the underlying filesystem notifier.
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// Validation error for a single configuration entry.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}
