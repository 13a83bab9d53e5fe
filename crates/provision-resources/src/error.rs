//! Validation errors for resource vectors.

use thiserror::Error;

/// Result type alias for resource validation.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// A resource vector that cannot describe a real quantity.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    #[error("{dimension} must not be negative, got {value}")]
    Negative { dimension: &'static str, value: f64 },

    #[error("{dimension} must be a finite number")]
    NotFinite { dimension: &'static str },
}
