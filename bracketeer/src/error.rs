//! Error taxonomy shared by every engine operation.

use std::time::Duration;
use thiserror::Error;

/// Engine errors
///
/// The first four variants are the caller-facing taxonomy; the rest are
/// storage failures that callers can only retry or report.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed seeding, payload or resolution input. Nothing was written.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The record changed underneath the caller (double finalize, double
    /// promotion, submission on a finalized match). Safe to retry after a
    /// fresh read.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Caller is not allowed to perform the operation.
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Unknown match, submission, bracket, registration or payment
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage call exceeded its time budget
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// A stored row could not be mapped back onto the domain model
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        CoreError::Permission(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Machine-readable error code returned to API clients
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation_error",
            CoreError::Conflict(_) => "conflict",
            CoreError::Permission(_) => "permission_denied",
            CoreError::NotFound { .. } => "not_found",
            CoreError::Database(_)
            | CoreError::Serialization(_)
            | CoreError::Timeout(_)
            | CoreError::Corrupt(_) => "internal_error",
        }
    }

    /// True for failures of the storage layer rather than of the request
    pub fn is_internal(&self) -> bool {
        self.code() == "internal_error"
    }

    /// Get a client-safe error message that doesn't leak storage details
    pub fn client_message(&self) -> String {
        match self {
            CoreError::Database(_)
            | CoreError::Serialization(_)
            | CoreError::Timeout(_)
            | CoreError::Corrupt(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for engine operations
pub type CoreResult<T> = Result<T, CoreError>;
