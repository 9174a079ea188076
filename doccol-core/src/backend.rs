//! Store driver abstraction.
//!
//! [`CollectionBackend`] is the seam between the collection client and a concrete document
//! database. It exposes the primitives the client builds on: counting, distinct values,
//! index introspection and creation, find with projection/skip/limit/collation, and
//! insert/update/delete. Backends forward these to their store; the client applies the
//! pagination, null-filtering and collation policy on top.
//!
//! # Examples
//!
//! ```ignore
//! use doccol::backend::{CollectionBackend, FindRequest};
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! let ids = backend
//!     .insert_many("users", vec![doc! { "name": "Alice", "age": 30 }])
//!     .await?;
//! let found = backend
//!     .find("users", doc! { "name": "Alice" }, FindRequest::default())
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::DocumentStoreResult,
    index::{Collation, IndexDescription, IndexSpec},
};

/// Options for a single find round trip.
///
/// `limit == None` returns every match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindRequest {
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Number of matching documents to skip.
    pub skip: u64,
    /// Projection document, e.g. `{ "_id": 0 }`.
    pub projection: Option<Document>,
    /// Collation for string comparisons in the filter.
    pub collation: Option<Collation>,
}

/// Counts reported by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents the filter matched.
    pub matched: u64,
    /// Documents whose contents actually changed.
    pub modified: u64,
}

/// Abstract interface for document store drivers.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the client calls them concurrently from many
/// tasks and holds no lock of its own.
///
/// # Error Handling
///
/// Implementations translate driver failures into
/// [`DocumentStoreError`](crate::error::DocumentStoreError): unreachable store as
/// `Connection`, a batch aborted partway as `BulkWrite`, rejected index definitions as
/// `IndexCreation`, and anything else as `Store`. No operation retries.
#[async_trait]
pub trait CollectionBackend: Send + Sync + Debug {
    /// Counts documents matching `filter`, comparing strings under `collation` when one is
    /// given.
    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        collation: Option<Collation>,
    ) -> DocumentStoreResult<u64>;

    /// Returns the distinct values of `field` among documents matching `filter`.
    ///
    /// Array values are unwound. A null value is reported like any other; documents
    /// missing the field contribute nothing.
    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Lists the indexes of a collection, including the implicit `_id` index.
    ///
    /// A collection that does not exist has no indexes.
    async fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<IndexDescription>>;

    /// Creates an ascending compound index and returns its name.
    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> DocumentStoreResult<String>;

    /// Returns matching documents in the store's natural order.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        request: FindRequest,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Inserts documents as one ordered batch and returns their identifiers in input order.
    ///
    /// Every document must already carry an `_id`.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>>;

    /// Inserts a single document (which must carry an `_id`) and returns its identifier.
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson>;

    /// Applies `update` to every matching document.
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Applies `update` to the first matching document.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Deletes every matching document and returns how many were removed.
    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Deletes the first matching document and returns how many were removed (0 or 1).
    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Drops a collection with its documents and indexes. Dropping a missing collection is not an error.
    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()>;

    /// Lists the names of all collections in the database.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Releases connections and other resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

// Pointer-like wrappers forward every call to the backend they hold.
macro_rules! forward_backend {
    ($wrapper:ty) => {
        #[async_trait]
        impl<B> CollectionBackend for $wrapper
        where
            B: CollectionBackend + ?Sized,
        {
            async fn count_documents(
                &self,
                collection: &str,
                filter: Document,
                collation: Option<Collation>,
            ) -> DocumentStoreResult<u64> {
                (**self).count_documents(collection, filter, collation).await
            }

            async fn distinct(
                &self,
                collection: &str,
                field: &str,
                filter: Document,
            ) -> DocumentStoreResult<Vec<Bson>> {
                (**self).distinct(collection, field, filter).await
            }

            async fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<IndexDescription>> {
                (**self).list_indexes(collection).await
            }

            async fn create_index(&self, collection: &str, spec: &IndexSpec) -> DocumentStoreResult<String> {
                (**self).create_index(collection, spec).await
            }

            async fn find(
                &self,
                collection: &str,
                filter: Document,
                request: FindRequest,
            ) -> DocumentStoreResult<Vec<Document>> {
                (**self).find(collection, filter, request).await
            }

            async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>> {
                (**self).insert_many(collection, documents).await
            }

            async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
                (**self).insert_one(collection, document).await
            }

            async fn update_many(
                &self,
                collection: &str,
                filter: Document,
                update: Document,
            ) -> DocumentStoreResult<UpdateOutcome> {
                (**self).update_many(collection, filter, update).await
            }

            async fn update_one(
                &self,
                collection: &str,
                filter: Document,
                update: Document,
            ) -> DocumentStoreResult<UpdateOutcome> {
                (**self).update_one(collection, filter, update).await
            }

            async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
                (**self).delete_many(collection, filter).await
            }

            async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
                (**self).delete_one(collection, filter).await
            }

            async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
                (**self).drop_collection(collection).await
            }

            async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
                (**self).list_collections().await
            }

            async fn shutdown(&self) -> DocumentStoreResult<()> {
                (**self).shutdown().await
            }
        }
    };
}

forward_backend!(&B);
forward_backend!(Box<B>);
forward_backend!(Arc<B>);

/// Factory for backends that need asynchronous setup, such as opening a connection.
#[async_trait]
pub trait BackendBuilder {
    type Backend: CollectionBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
