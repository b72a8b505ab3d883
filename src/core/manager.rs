//! Decoding configuration files into per-key sub-configs.

use crate::error::{ConfigError, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;

/// Turns raw file contents into the sub-config a monitor cares about.
///
/// A manager decodes the whole document first, then extracts the entry for a
/// single key. The monitor only ever sees the extracted value, so the wire
/// format and the document layout are entirely the manager's concern.
///
/// # Examples
///
/// ```rust
/// use hotswap_policy::core::ConfigManager;
/// use hotswap_policy::error::{ConfigError, Result};
///
/// /// One `key=value` pair per line.
/// struct LineManager;
///
/// impl ConfigManager for LineManager {
///     type Document = Vec<(String, String)>;
///     type Config = String;
///
///     fn decode(&self, data: &[u8]) -> Result<Self::Document> {
///         let text = std::str::from_utf8(data)
///             .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
///         Ok(text
///             .lines()
///             .filter_map(|line| line.split_once('='))
///             .map(|(k, v)| (k.to_string(), v.to_string()))
///             .collect())
///     }
///
///     fn extract(&self, document: Self::Document, key: &str) -> Option<String> {
///         document.into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
///     }
/// }
///
/// let manager = LineManager;
/// let doc = manager.decode(b"svc_a=fast\nsvc_b=slow").unwrap();
/// assert_eq!(manager.extract(doc, "svc_b").as_deref(), Some("slow"));
/// ```
pub trait ConfigManager: Send + Sync + 'static {
    /// The decoded file.
    type Document;

    /// The sub-config for one key.
    type Config: Send + Sync + 'static;

    /// Decode raw file contents.
    ///
    /// # Errors
    ///
    /// Should return [`ConfigError::DeserializationError`] for malformed input.
    fn decode(&self, data: &[u8]) -> Result<Self::Document>;

    /// Extract the sub-config for `key`, or `None` if the document has none.
    fn extract(&self, document: Self::Document, key: &str) -> Option<Self::Config>;
}

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON (`.json`), requires the `json` feature.
    Json,
    /// YAML (`.yaml`, `.yml`), requires the `yaml` feature.
    Yaml,
    /// TOML (`.toml`), requires the `toml` feature.
    Toml,
}

impl Format {
    /// Detect the format from a file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is missing or unsupported.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ConfigError::DeserializationError(format!(
                    "Unable to determine file format for: {}",
                    path.display()
                ))
            })?;

        match extension {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            _ => Err(ConfigError::DeserializationError(format!(
                "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
                extension
            ))),
        }
    }

    /// Deserialize `data` in this format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DeserializationError`] for malformed input and
    /// [`ConfigError::FeatureNotEnabled`] if the format's feature is off.
    pub fn decode<T: DeserializeOwned>(self, data: &[u8]) -> Result<T> {
        match self {
            Format::Json => {
                #[cfg(feature = "json")]
                {
                    serde_json::from_slice(data)
                        .map_err(|e| ConfigError::DeserializationError(e.to_string()))
                }
                #[cfg(not(feature = "json"))]
                {
                    let _ = data;
                    Err(ConfigError::FeatureNotEnabled("json"))
                }
            }
            Format::Yaml => {
                #[cfg(feature = "yaml")]
                {
                    serde_yaml::from_slice(data)
                        .map_err(|e| ConfigError::DeserializationError(e.to_string()))
                }
                #[cfg(not(feature = "yaml"))]
                {
                    let _ = data;
                    Err(ConfigError::FeatureNotEnabled("yaml"))
                }
            }
            Format::Toml => {
                #[cfg(feature = "toml")]
                {
                    let text = std::str::from_utf8(data)
                        .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
                    toml::from_str(text).map_err(|e| ConfigError::DeserializationError(e.to_string()))
                }
                #[cfg(not(feature = "toml"))]
                {
                    let _ = data;
                    Err(ConfigError::FeatureNotEnabled("toml"))
                }
            }
        }
    }
}

/// Manager for files holding one entry per service key.
///
/// The whole file decodes as a map from key to `C`; extraction takes the
/// entry for the monitor's key.
///
/// ```json
/// {
///   "svcA": { "retry": { "Echo": { "failure_policy": { "stop_policy": { "max_retry_times": 2 } } } } },
///   "svcB": { "retry": {} }
/// }
/// ```
pub struct FileManager<C> {
    format: Format,
    _config: PhantomData<fn() -> C>,
}

impl<C> FileManager<C> {
    /// Create a manager decoding `format`.
    pub fn new(format: Format) -> Self {
        Self {
            format,
            _config: PhantomData,
        }
    }

    /// Create a manager whose format matches the file extension of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is missing or unsupported.
    pub fn for_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Format::from_path(path)?))
    }

    /// The format this manager decodes.
    pub fn format(&self) -> Format {
        self.format
    }
}

impl<C> ConfigManager for FileManager<C>
where
    C: DeserializeOwned + Send + Sync + 'static,
{
    type Document = HashMap<String, C>;
    type Config = C;

    fn decode(&self, data: &[u8]) -> Result<Self::Document> {
        self.format.decode(data)
    }

    fn extract(&self, mut document: Self::Document, key: &str) -> Option<C> {
        document.remove(key)
    }
}
