//! Translation of driver errors into [`DocumentStoreError`].

use bson::Bson;
use mongodb::error::{Error as MongoError, ErrorKind};

use doccol_core::error::DocumentStoreError;

/// Maps a driver error, sending connectivity problems to `Connection` and everything else
/// to `Store`.
pub(crate) fn store_error(err: MongoError) -> DocumentStoreError {
    if is_connection_error(&err) {
        return DocumentStoreError::Connection(err.to_string());
    }

    DocumentStoreError::Store(err.to_string())
}

/// Like [`store_error`], but a rejected index definition becomes `IndexCreation`.
pub(crate) fn index_error(err: MongoError) -> DocumentStoreError {
    if is_connection_error(&err) {
        return DocumentStoreError::Connection(err.to_string());
    }

    DocumentStoreError::IndexCreation(err.to_string())
}

/// Maps an ordered insert-many failure.
///
/// The driver stops an ordered batch at the first failing document, so the documents in
/// front of the lowest failing index were stored. A failure with no per-document errors
/// (a write concern error) still stored the whole batch.
pub(crate) fn insert_many_error(err: MongoError, ids: &[Bson]) -> DocumentStoreError {
    match err.kind.as_ref() {
        ErrorKind::InsertMany(failure) => {
            let stored = failure.write_errors
                .iter()
                .flatten()
                .map(|write_error| write_error.index)
                .min()
                .unwrap_or(ids.len())
                .min(ids.len());

            DocumentStoreError::BulkWrite {
                message: err.to_string(),
                inserted_ids: ids[..stored].to_vec(),
            }
        },
        _ => store_error(err),
    }
}

/// The collection (namespace) a command addressed does not exist.
pub(crate) fn is_namespace_not_found(err: &MongoError) -> bool {
    const NAMESPACE_NOT_FOUND: i32 = 26;

    matches!(err.kind.as_ref(), ErrorKind::Command(command) if command.code == NAMESPACE_NOT_FOUND)
}

fn is_connection_error(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::ServerSelection { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::Io(_)
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_connection_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = store_error(MongoError::from(io));

        assert!(matches!(err, DocumentStoreError::Connection(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_errors_are_store_errors() {
        let err = store_error(MongoError::custom("bad reply"));

        assert!(matches!(err, DocumentStoreError::Store(_)));
    }

    #[test]
    fn test_index_rejections_are_index_errors() {
        let err = index_error(MongoError::custom("bad key"));

        assert!(matches!(err, DocumentStoreError::IndexCreation(_)));
    }

    #[test]
    fn test_non_batch_insert_failure_is_store_error() {
        let ids = vec![Bson::Int32(1), Bson::Int32(2)];
        let err = insert_many_error(MongoError::custom("x"), &ids);

        assert!(matches!(err, DocumentStoreError::Store(_)));
    }
}
