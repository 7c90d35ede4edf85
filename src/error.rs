//! Errors delivered to image listeners.

use thiserror::Error;

/// Why an image could not be loaded.
///
/// Cloneable so a single failed fetch can be reported to every listener
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Transport failure (connection, timeout, body read)
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("HTTP {0}")]
    Status(u16),

    /// Bytes could not be decoded into an image
    #[error("decode error: {0}")]
    Decode(String),

    /// The payload is not a format the requested kind supports
    #[error("unsupported image: {0}")]
    Unsupported(String),
}

impl From<reqwest::Error> for LoadError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Status(status.as_u16()),
            None => Self::Network(e.to_string()),
        }
    }
}

impl From<image::ImageError> for LoadError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Unsupported(u) => Self::Unsupported(u.to_string()),
            other => Self::Decode(other.to_string()),
        }
    }
}

/// Result alias for image loading.
pub type Result<T> = std::result::Result<T, LoadError>;
