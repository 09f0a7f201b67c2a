//! Error types for the no-show risk and alerting core
//!
//! Only persistence failures and cancellation escape the two batch operations.
//! A missing active configuration is a no-op, and notification delivery
//! failures are logged per recipient and never abort a run.

use thiserror::Error;

/// Failure reported by a persistence collaborator (policy store, appointment
/// store, KPI aggregator, audit sink, user directory).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("Resource not found".to_string()),
            _ => StoreError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Notification transport failure for a single recipient
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("No subscriber is listening for recipient {0}")]
    NoSubscribers(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Admin-side validation failure for a risk policy or threshold configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyValidationError {
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("Thresholds out of order: {0}")]
    ThresholdOrder(String),

    #[error("Notes must be at most {max} characters")]
    NotesTooLong { max: usize },
}

/// Error returned by the scorer and evaluator entry points
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ServiceError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Store(inner) => inner.error_code(),
            ServiceError::Cancelled => "CANCELLED",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Cancelled)
    }
}

/// Result type alias using ServiceError
pub type ServiceResult<T> = Result<T, ServiceError>;
