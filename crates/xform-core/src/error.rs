//! Error types for XForm Core

use crate::query::usage::UsageError;
use thiserror::Error;

/// Result type alias using XForm Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the query engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed query: unknown verb, wrong argument, unknown column/function/type
    #[error("{0}")]
    Usage(#[from] UsageError),

    /// An operator broke the bind/iterate contract. Never recoverable.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Column types disagree between tables being combined
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A value could not be converted to the requested type
    #[error("Cannot convert {value:?} from {from} to {to}")]
    Conversion {
        /// Rendered source value
        value: String,
        /// Source type name
        from: String,
        /// Target type name
        to: String,
    },

    /// Invalid selector slice or buffer shorter than its selector
    #[error("Range error: {0}")]
    Range(String),

    /// The cancellation token fired while a table was iterating
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a protocol violation error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    /// Create a range error
    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    /// Create a conversion error
    pub fn conversion(
        value: impl Into<String>,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::Conversion {
            value: value.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The usage error carried by this error, if any
    pub fn as_usage(&self) -> Option<&UsageError> {
        match self {
            Self::Usage(usage) => Some(usage),
            _ => None,
        }
    }
}
