//! Error types shared by apprelay crates
//!
//! Errors carry the resource they relate to so startup failures point at the
//! offending entry of the resource configuration file.

use thiserror::Error;

/// Main error type for configuration and record handling
#[derive(Debug, Error)]
pub enum Error {
    /// Resource configuration failed validation
    #[error("invalid resource config at index {index}: {message}")]
    Validation {
        /// Position of the offending entry in `resources`
        index: usize,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "release.chart.sourceRef.kind")
        field: Option<String>,
    },

    /// Reading a configuration file failed
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that could not be read
        path: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being converted (if known)
        kind: Option<String>,
    },
}

impl Error {
    /// Create a validation error with the offending field path
    pub fn validation_for_field(
        index: usize,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            index,
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Get the invalid field path if this is a validation error
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}
