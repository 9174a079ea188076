//! Error types and result types for collection client operations.
//!
//! Every fallible operation returns [`DocumentStoreResult<T>`]. The variants separate
//! caller mistakes (bad page numbers, bad index specs, bad configuration) from failures
//! that originate in the store, so callers can pick between fail-fast and retry without
//! inspecting error text.

use bson::{Bson, error::Error as BsonError};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when talking to a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The store could not be reached or refused the credentials.
    #[error("Connection error: {0}")]
    Connection(String),
    /// A page number below 1 was requested.
    #[error("Invalid page {0}: pages are numbered from 1")]
    InvalidPage(i64),
    /// The index field list was empty or contained a name the store cannot index.
    #[error("Index creation error: {0}")]
    IndexCreation(String),
    /// A batch write aborted partway.
    ///
    /// `inserted_ids` holds the identifiers that were stored before the abort, in input order.
    #[error("Bulk write error after {} inserted documents: {message}", .inserted_ids.len())]
    BulkWrite {
        /// Description of the failure reported by the store.
        message: String,
        /// Identifiers assigned before the batch stopped.
        inserted_ids: Vec<Bson>,
    },
    /// Any other failure raised by the underlying store (malformed filter, type mismatch, limits).
    #[error("Store error: {0}")]
    Store(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The client configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DocumentStoreError {
    /// Returns `true` for errors caused by how the client was called or configured.
    ///
    /// Retrying these without changing the input will fail the same way.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            DocumentStoreError::InvalidPage(_)
                | DocumentStoreError::IndexCreation(_)
                | DocumentStoreError::Configuration(_)
        )
    }

    /// Returns `true` for errors where a later retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DocumentStoreError::Connection(_))
    }
}

/// A specialized `Result` type for collection client operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_are_not_retryable() {
        let errors = [
            DocumentStoreError::InvalidPage(0),
            DocumentStoreError::IndexCreation("empty".into()),
            DocumentStoreError::Configuration("no host".into()),
        ];

        for err in errors {
            assert!(err.is_usage_error());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_connection_error_is_retryable() {
        let err = DocumentStoreError::Connection("refused".into());

        assert!(err.is_retryable());
        assert!(!err.is_usage_error());
    }

    #[test]
    fn test_bulk_write_message_reports_partial_count() {
        let err = DocumentStoreError::BulkWrite {
            message: "duplicate key".into(),
            inserted_ids: vec![Bson::Int32(1), Bson::Int32(2)],
        };

        assert_eq!(
            err.to_string(),
            "Bulk write error after 2 inserted documents: duplicate key"
        );
    }
}
