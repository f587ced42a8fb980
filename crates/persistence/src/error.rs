//! Error types for the persistence layer.
//!
//! This module defines all error types used throughout the persistence layer,
//! following a hierarchy that separates validation failures, missing rows,
//! configuration mistakes, transaction errors and backend (driver) failures.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
///
/// This enum encompasses all possible errors that can occur during persistence
/// operations, organized by category.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Row lookup errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Model validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Programmer/configuration errors, never retried
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Transaction errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns true if this is a validation failure raised before any write.
    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation(_))
    }

    /// Returns true if this error reports a missing row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Resource(ResourceError::NotFound { .. }))
    }

    /// Returns true if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, StorageError::Configuration(_))
    }
}

/// Errors related to row state.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// No row matched the requested key.
    #[error("row not found: {table}/{id}")]
    NotFound { table: String, id: String },
}

/// Errors related to model validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Missing required property.
    #[error("missing required property: {property}")]
    MissingRequiredProperty { property: String },

    /// A value was set for a property the model does not declare.
    #[error("unknown property: {property}")]
    UnknownProperty { property: String },
}

/// Errors caused by invalid setup or invalid input names.
///
/// These fail fast and are never retried.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// An identifier did not pass the `[A-Za-z0-9_]+` check.
    #[error("invalid identifier: '{identifier}'")]
    InvalidIdentifier { identifier: String },

    /// A dotted attribute used more than one nesting level.
    #[error("attribute '{attribute}' nests deeper than one level")]
    NestingTooDeep { attribute: String },

    /// A dotted attribute named a join filter that is not registered.
    #[error("no join filter registered under '{name}' (attribute '{attribute}')")]
    UnknownJoinFilter { name: String, attribute: String },

    /// The attribute is not part of the entity's property set.
    #[error("unknown attribute '{attribute}' for table {table}")]
    UnknownAttribute { attribute: String, table: String },

    /// A join filter was registered twice under the same name.
    #[error("join filter '{name}' is already registered")]
    DuplicateJoinFilter { name: String },

    /// Paging parameters are out of range.
    #[error("invalid paging: {message}")]
    InvalidPaging { message: String },

    /// The operator does not accept the given value.
    #[error("operator '{operator}' cannot be applied to {attribute}: {message}")]
    InvalidOperand {
        attribute: String,
        operator: String,
        message: String,
    },

    /// A property was declared twice in one property set.
    #[error("property '{name}' is declared twice")]
    DuplicateProperty { name: String },

    /// A property set was declared without a primary key.
    #[error("property set for {table} declares no primary key")]
    MissingPrimaryKey { table: String },

    /// Exclusive locks force an implicit commit and cannot be taken inside a transaction.
    #[error("cannot lock {target} while a transaction is open")]
    LockWhileTransactional { target: String },

    /// A unit of work was routed to a connection transaction without a connection.
    #[error("unit of work has no connection")]
    MissingConnection,

    /// The transaction factory registry does not cover every capability.
    #[error("transaction factory has no constructor for capability '{capability}'")]
    UnregisteredCapability { capability: String },
}

/// Errors related to transactions.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// Transaction was rolled back.
    #[error("transaction rolled back: {reason}")]
    RolledBack { reason: String },

    /// The save lifecycle was asked to move backwards.
    #[error("invalid save state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// A later commit failed after earlier commits of the same chain succeeded.
    ///
    /// The earlier commits cannot be undone; everything still open was rolled back.
    #[error("commit {failed_at} of {total} failed after {committed} transaction(s) were committed")]
    PartialChainFailure {
        committed: usize,
        failed_at: usize,
        total: usize,
        #[source]
        source: Box<StorageError>,
    },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// Implement conversions from common error types

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Resource(ResourceError::NotFound {
            table: "products".to_string(),
            id: "123".to_string(),
        });
        assert_eq!(err.to_string(), "row not found: products/123");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::InvalidIdentifier {
            identifier: "id; DROP".to_string(),
        };
        assert_eq!(err.to_string(), "invalid identifier: 'id; DROP'");

        let err: StorageError = ConfigurationError::NestingTooDeep {
            attribute: "a.b.c".to_string(),
        }
        .into();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("a.b.c"));
    }

    #[test]
    fn test_partial_chain_failure_keeps_source() {
        let inner = StorageError::Backend(BackendError::QueryError {
            message: "disk full".to_string(),
        });
        let err = TransactionError::PartialChainFailure {
            committed: 1,
            failed_at: 2,
            total: 3,
            source: Box::new(inner),
        };
        assert_eq!(err.to_string(), "commit 2 of 3 failed after 1 transaction(s) were committed");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("query execution failed: disk full"));
    }

    #[test]
    fn test_validation_is_flagged() {
        let err: StorageError = ValidationError::MissingRequiredProperty {
            property: "sku".to_string(),
        }
        .into();
        assert!(err.is_validation());
        assert!(!err.is_not_found());
    }
}
