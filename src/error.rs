//! Error taxonomy shared by every request-facing operation

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can terminate a request
///
/// Nothing in this crate retries; the transport maps [`ErrorKind`] to a
/// status code.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid full type `{full_type}`: {reason}")]
    InvalidFullType { full_type: String, reason: String },

    #[error("Handler not found: {0}")]
    HandlerNotFound(String),

    #[error("Namespace conflict: {0}")]
    NamespaceConflict(String),

    #[error("Handler conflict: {0} is registered more than once")]
    HandlerConflict(String),

    #[error("Feature not available: {0}")]
    FeatureNotAvailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Non-unique result: {0}")]
    NonUniqueResult(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Stable classification of a [`RestError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InvalidFullType,
    HandlerNotFound,
    NamespaceConflict,
    HandlerConflict,
    FeatureNotAvailable,
    NotFound,
    NonUniqueResult,
    InvalidOperation,
    Storage,
}

impl RestError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_available(msg: impl Into<String>) -> Self {
        Self::FeatureNotAvailable(msg.into())
    }

    pub fn invalid_full_type(full_type: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFullType {
            full_type: full_type.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidFullType { .. } => ErrorKind::InvalidFullType,
            Self::HandlerNotFound(_) => ErrorKind::HandlerNotFound,
            Self::NamespaceConflict(_) => ErrorKind::NamespaceConflict,
            Self::HandlerConflict(_) => ErrorKind::HandlerConflict,
            Self::FeatureNotAvailable(_) => ErrorKind::FeatureNotAvailable,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NonUniqueResult(_) => ErrorKind::NonUniqueResult,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            // Unknown fields in a query description are caller mistakes
            Self::Storage(StorageError::UnknownField(_)) => ErrorKind::Validation,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Result type for request-facing operations
pub type RestResult<T> = Result<T, RestError>;
