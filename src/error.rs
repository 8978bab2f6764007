use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Errors that leave the data layer unusable until reconfigured
    Critical,
    /// Errors that fail the current operation
    Error,
    /// Expected conditions the caller is meant to handle
    Warning,
}

impl Default for ErrorSeverity {
    fn default() -> Self {
        Self::Error
    }
}

/// Error category for taxonomic classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Store failures: connectivity, constraints, timeouts
    Database,
    /// Optimistic-concurrency conflicts detected at save time
    Concurrency,
    /// Misuse of the API: transaction discipline, disposed units of work
    Usage,
    /// Configuration and service-resolution problems
    Configuration,
    /// Cooperative cancellation requested by the caller
    Cancellation,
}

impl Default for ErrorCategory {
    fn default() -> Self {
        Self::Database
    }
}

/// Errors surfaced by the data access layer.
///
/// A missing entity is never an error: lookups return `None` and deletes by id
/// return `false`.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Data access error in {entity}::{operation}: {source}")]
    DataAccess {
        entity: &'static str,
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("Concurrency conflict on {entity}{}", .key.map(|k| format!(" with key {k}")).unwrap_or_default())]
    Concurrency {
        entity: &'static str,
        key: Option<i64>,
    },
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Invalid argument: {0}")]
    Argument(String),
    #[error("Service not registered: {0}")]
    ServiceNotRegistered(&'static str),
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: &'static str },
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for DataError {
    fn from(source: sqlx::Error) -> Self {
        Self::DataAccess {
            entity: "database",
            operation: "query",
            source,
        }
    }
}

impl DataError {
    /// Create a new data access error for a failed store round-trip
    pub fn data_access(entity: &'static str, operation: &'static str, source: sqlx::Error) -> Self {
        Self::DataAccess {
            entity,
            operation,
            source,
        }
    }

    /// Create a new concurrency error
    pub fn concurrency(entity: &'static str, key: Option<i64>) -> Self {
        Self::Concurrency { entity, key }
    }

    /// Create a new invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Create a new argument error
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// Create the error returned by every operation on a disposed unit of work
    pub fn disposed(what: impl Display) -> Self {
        Self::InvalidOperation(format!("{what} has been disposed"))
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DataAccess { .. } | Self::Migration(_) | Self::Serialization(_) => ErrorCategory::Database,
            Self::Concurrency { .. } => ErrorCategory::Concurrency,
            Self::InvalidOperation(_) | Self::Argument(_) => ErrorCategory::Usage,
            Self::ServiceNotRegistered(_) => ErrorCategory::Configuration,
            Self::Cancelled { .. } => ErrorCategory::Cancellation,
        }
    }

    /// Get the error severity for this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Migration(_) | Self::ServiceNotRegistered(_) => ErrorSeverity::Critical,
            Self::Concurrency { .. } | Self::Cancelled { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Check if the caller may reasonably retry the failed operation.
    ///
    /// This layer never retries on its own.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Concurrency { .. } => true,
            Self::DataAccess { source, .. } => matches!(
                source,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            ) || is_busy(source),
            _ => false,
        }
    }

    /// Log this error with structured logging
    pub fn log(&self) {
        match self {
            Self::DataAccess { entity, operation, .. } => {
                tracing::error!(
                    entity = %entity,
                    operation = %operation,
                    severity = ?self.severity(),
                    category = ?self.category(),
                    retriable = %self.is_retriable(),
                    "{}", self
                );
            }
            Self::Concurrency { entity, key } => {
                tracing::warn!(
                    entity = %entity,
                    key = ?key,
                    category = ?self.category(),
                    "{}", self
                );
            }
            _ => {
                tracing::error!(
                    severity = ?self.severity(),
                    category = ?self.category(),
                    retriable = %self.is_retriable(),
                    "{}", self
                );
            }
        }
    }

    /// Log this error and hand it back, for use at the point of detection
    pub fn logged(self) -> Self {
        self.log();
        self
    }
}

// SQLITE_BUSY and SQLITE_LOCKED surface as database errors with these codes
fn is_busy(source: &sqlx::Error) -> bool {
    match source {
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("5") | Some("6")),
        _ => false,
    }
}

pub type Result<T, E = DataError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_the_taxonomy() {
        assert_eq!(DataError::concurrency("Truck", Some(1)).category(), ErrorCategory::Concurrency);
        assert_eq!(DataError::invalid_operation("x").category(), ErrorCategory::Usage);
        assert_eq!(DataError::argument("x").category(), ErrorCategory::Usage);
        assert_eq!(DataError::ServiceNotRegistered("Foo").category(), ErrorCategory::Configuration);
        assert_eq!(
            DataError::Cancelled { operation: "save_changes" }.category(),
            ErrorCategory::Cancellation
        );
        assert_eq!(
            DataError::data_access("Truck", "find", sqlx::Error::RowNotFound).category(),
            ErrorCategory::Database
        );
    }

    #[test]
    fn only_conflicts_and_transient_failures_are_retriable() {
        assert!(DataError::concurrency("Truck", None).is_retriable());
        assert!(DataError::data_access("Truck", "find", sqlx::Error::PoolTimedOut).is_retriable());
        assert!(!DataError::data_access("Truck", "find", sqlx::Error::RowNotFound).is_retriable());
        assert!(!DataError::invalid_operation("double begin").is_retriable());
    }

    #[test]
    fn concurrency_message_names_the_key() {
        let err = DataError::concurrency("Invoice", Some(42));
        assert_eq!(err.to_string(), "Concurrency conflict on Invoice with key 42");
        let err = DataError::concurrency("Invoice", None);
        assert_eq!(err.to_string(), "Concurrency conflict on Invoice");
    }
}
