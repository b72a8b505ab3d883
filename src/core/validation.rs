//! Per-entry validation support.

use crate::error::ValidationError;

/// Trait for validating a single configuration entry.
///
/// Policy consumers validate each per-method entry on its own and skip the
/// entries that fail, so one malformed method never blocks the rest.
///
/// # Examples
///
/// ```rust
/// use hotswap_policy::core::Validate;
/// use hotswap_policy::error::ValidationError;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize, Clone)]
/// struct RateLimit {
///     qps: u32,
/// }
///
/// impl Validate for RateLimit {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.qps == 0 {
///             return Err(ValidationError::invalid_field("qps", "must be greater than 0"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validate {
    /// Validate the entry.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
