//! Error types shared across the compiler, the normalizer and the service.
//!
//! Errors are grouped into three classes so a caller can map them onto its
//! transport: bad requests (the view definition or the query envelope is
//! wrong), not-found conditions reported by a backend, and internal failures.

use crate::backend::BackendError;
use crate::condition::ConditionError;
use crate::config::SettingsError;

/// Result alias used throughout the crate.
pub type ViewResult<T> = Result<T, ViewError>;

/// Coarse classification of a [`ViewError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    NotFound,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// The data scope of a custom view is malformed.
    #[error("invalid data view{}: {message}", node_suffix(.node_id))]
    Validation {
        node_id: Option<String>,
        message: String,
    },

    /// The query envelope is malformed (pagination, sort, limits).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("binary field sort not supported: '{0}'")]
    BinaryFieldSort(String),

    #[error("filter field '{0}' does not exist in the view")]
    FilterFieldNotInView(String),

    /// A filter tree failed the legality checks.
    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] ConditionError),

    /// Query generation failed for a scope that passed validation.
    #[error("failed to compile view{}: {message}", node_suffix(.node_id))]
    Compile {
        node_id: Option<String>,
        message: String,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The backend payload could not be decoded.
    #[error("malformed backend payload: {0}")]
    Payload(String),

    #[error("failed to process {failed} of {total} rows: {first}")]
    RowProcessing {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("row pool unavailable: {0}")]
    Pool(String),

    #[error(transparent)]
    Config(#[from] SettingsError),
}

fn node_suffix(node_id: &Option<String>) -> String {
    match node_id {
        Some(id) => format!(" (node '{}')", id),
        None => String::new(),
    }
}

impl ViewError {
    pub fn validation(message: impl Into<String>) -> Self {
        ViewError::Validation {
            node_id: None,
            message: message.into(),
        }
    }

    pub fn node_validation(node_id: &str, message: impl Into<String>) -> Self {
        ViewError::Validation {
            node_id: Some(node_id.to_string()),
            message: message.into(),
        }
    }

    pub fn compile(message: impl Into<String>) -> Self {
        ViewError::Compile {
            node_id: None,
            message: message.into(),
        }
    }

    pub fn node_compile(node_id: &str, message: impl Into<String>) -> Self {
        ViewError::Compile {
            node_id: Some(node_id.to_string()),
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ViewError::Validation { .. }
            | ViewError::InvalidQuery(_)
            | ViewError::BinaryFieldSort(_)
            | ViewError::FilterFieldNotInView(_)
            | ViewError::InvalidFilter(_) => ErrorClass::BadRequest,
            ViewError::Backend(err) if err.is_not_found() => ErrorClass::NotFound,
            _ => ErrorClass::Internal,
        }
    }

    pub fn is_client_fault(&self) -> bool {
        self.class() == ErrorClass::BadRequest
    }

    /// The data-scope node an error is attributed to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ViewError::Validation { node_id, .. } | ViewError::Compile { node_id, .. } => {
                node_id.as_deref()
            }
            _ => None,
        }
    }
}
