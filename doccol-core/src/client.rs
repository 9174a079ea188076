//! The collection client.
//!
//! [`DocumentCollectionClient`] turns high-level collection intents (a page of results, the
//! distinct values of a field, a case-insensitive index, a bulk insert) into calls against a
//! [`CollectionBackend`], applying the same policies every time:
//!
//! - pages are 1-indexed and `skip = (page - 1) * limit`, where `limit` is the request's
//!   override or the configured page size;
//! - distinct values never contain null;
//! - case-insensitive indexes and queries share one collation ([`Collation::case_insensitive`]);
//! - query results never carry the synthetic `_id` field.
//!
//! The client holds only its immutable configuration and the backend, so it can be shared
//! across tasks and called concurrently. It keeps no cursor or session between calls and
//! never retries.
//!
//! # Example
//!
//! ```ignore
//! use doccol::{prelude::*, memory::InMemoryBackend};
//! use bson::doc;
//!
//! let client = DocumentCollectionClient::new(ClientConfig::default(), InMemoryBackend::new());
//!
//! client.insert_many("people", vec![
//!     doc! { "name": "John", "age": 30, "city": "New York" },
//!     doc! { "name": "Jane", "age": 25, "city": "Paris" },
//! ]).await?;
//!
//! client.create_index("people", ["name"], true).await?;
//! let johns = client
//!     .paginated_query("people", doc! { "name": "john" }, PageRequest::new(1).case_insensitive(true))
//!     .await?;
//! ```

use bson::{Bson, Document, oid::ObjectId};
use log::{debug, warn};
use serde_json::Value;

use crate::{
    backend::{CollectionBackend, FindRequest},
    config::ClientConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    index::{Collation, IndexSpec},
    page::{Page, PageRequest},
};

/// Name of the identifier field the store assigns to every document.
pub const ID_FIELD: &str = "_id";

/// A client bound to one database through a [`CollectionBackend`].
///
/// Result ordering is the store's natural (insertion) order and is not guaranteed to be
/// stable across calls; no sort is applied.
#[derive(Debug)]
pub struct DocumentCollectionClient<B: CollectionBackend> {
    config: ClientConfig,
    backend: B,
}

/// A client whose backend is chosen at runtime.
pub type DynDocumentCollectionClient = DocumentCollectionClient<Box<dyn CollectionBackend>>;

impl<B: CollectionBackend> DocumentCollectionClient<B> {
    /// Creates a client over `backend` with the given configuration.
    pub fn new(config: ClientConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Boxes the backend so clients over different stores share one type.
    pub fn into_dyn(self) -> DynDocumentCollectionClient
    where
        B: 'static,
    {
        let backend: Box<dyn CollectionBackend> = Box::new(self.backend);

        DocumentCollectionClient::new(self.config, backend)
    }

    /// Returns the number of documents in `collection` matching `filter`.
    pub async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.count_matching(collection, filter, None).await
    }

    async fn count_matching(
        &self,
        collection: &str,
        filter: Document,
        collation: Option<Collation>,
    ) -> DocumentStoreResult<u64> {
        check_collection_name(collection)?;
        debug!("count {}.{}", self.config.database(), collection);

        self.backend
            .count_documents(collection, filter, collation)
            .await
    }

    /// Returns the distinct values of `field` across the collection.
    ///
    /// Null and undefined values are removed, even though the store reports them as
    /// legitimate distinct values. An empty collection yields an empty vec.
    pub async fn distinct_values(&self, collection: &str, field: &str) -> DocumentStoreResult<Vec<Bson>> {
        check_collection_name(collection)?;
        debug!("distinct {} in {}.{}", field, self.config.database(), collection);

        let mut values = self.backend
            .distinct(collection, field, Document::new())
            .await?;
        values.retain(|value| !matches!(value, Bson::Null | Bson::Undefined));

        Ok(values)
    }

    /// Returns every field that participates in any index of the collection.
    ///
    /// Fields appear in index order and then key order. A field covered by several indexes
    /// appears once per index.
    pub async fn list_indexed_fields(&self, collection: &str) -> DocumentStoreResult<Vec<String>> {
        check_collection_name(collection)?;

        Ok(self.backend
            .list_indexes(collection)
            .await?
            .iter()
            .flat_map(|index| index.fields().map(str::to_string).collect::<Vec<_>>())
            .collect())
    }

    /// Builds an ascending compound index over `fields`, in order, and returns its name.
    ///
    /// With `case_insensitive`, the index uses [`Collation::case_insensitive`] so that
    /// case-insensitive queries on the same fields can use it.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::IndexCreation`] if `fields` is empty or a name is not
    /// indexable. Nothing is sent to the store in that case.
    pub async fn create_index<I, S>(
        &self,
        collection: &str,
        fields: I,
        case_insensitive: bool,
    ) -> DocumentStoreResult<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        check_collection_name(collection)?;
        let spec = IndexSpec::new(fields, case_insensitive)?;
        debug!(
            "create index {} on {}.{} (case insensitive: {})",
            spec.name(), self.config.database(), collection, case_insensitive
        );

        self.backend
            .create_index(collection, &spec)
            .await
    }

    /// Returns up to `limit` documents matching `filter`, skipping the first `skip`.
    ///
    /// The `_id` field is suppressed in every returned document. With `case_insensitive`,
    /// string comparisons in `filter` use [`Collation::case_insensitive`]. A `limit` of 0
    /// returns nothing.
    pub async fn query(
        &self,
        collection: &str,
        filter: Document,
        limit: u64,
        skip: u64,
        case_insensitive: bool,
    ) -> DocumentStoreResult<Vec<Document>> {
        check_collection_name(collection)?;
        debug!(
            "find in {}.{} limit {} skip {} (case insensitive: {})",
            self.config.database(), collection, limit, skip, case_insensitive
        );

        // The store reads a zero limit as "no limit".
        if limit == 0 {
            return Ok(Vec::new());
        }

        let request = FindRequest {
            limit: Some(limit),
            skip,
            projection: Some(bson::doc! { ID_FIELD: 0 }),
            collation: Collation::for_flag(case_insensitive),
        };

        let mut documents = self.backend
            .find(collection, filter, request)
            .await?;
        for document in documents.iter_mut() {
            document.remove(ID_FIELD);
        }

        Ok(documents)
    }

    /// Returns one page of documents matching `filter`.
    ///
    /// The effective limit is the request's override or the configured page size, and
    /// `skip = (page - 1) * limit`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidPage`] if `request.page < 1`.
    pub async fn paginated_query(
        &self,
        collection: &str,
        filter: Document,
        request: PageRequest,
    ) -> DocumentStoreResult<Vec<Document>> {
        let window = request.resolve(self.config.page_size())?;

        self.query(collection, filter, window.limit, window.skip, request.case_insensitive)
            .await
    }

    /// Like [`paginated_query`](Self::paginated_query), but also counts the matches and
    /// fills in navigation metadata.
    pub async fn page(
        &self,
        collection: &str,
        filter: Document,
        request: PageRequest,
    ) -> DocumentStoreResult<Page<Document>> {
        let window = request.resolve(self.config.page_size())?;
        let count = self
            .count_matching(collection, filter.clone(), Collation::for_flag(request.case_insensitive))
            .await?;
        let items = self
            .query(collection, filter, window.limit, window.skip, request.case_insensitive)
            .await?;

        Ok(window.into_page(items, count))
    }

    /// [`query`](Self::query) with results rendered as extended JSON.
    pub async fn query_json(
        &self,
        collection: &str,
        filter: Document,
        limit: u64,
        skip: u64,
        case_insensitive: bool,
    ) -> DocumentStoreResult<Vec<Value>> {
        Ok(to_json(self.query(collection, filter, limit, skip, case_insensitive).await?))
    }

    /// [`paginated_query`](Self::paginated_query) with results rendered as extended JSON.
    pub async fn paginated_query_json(
        &self,
        collection: &str,
        filter: Document,
        request: PageRequest,
    ) -> DocumentStoreResult<Vec<Value>> {
        Ok(to_json(self.paginated_query(collection, filter, request).await?))
    }

    /// Inserts `documents` as one ordered batch and returns their identifiers in input order.
    ///
    /// Documents without an `_id` get a fresh object id first.
    ///
    /// # Errors
    ///
    /// If the store aborts the batch partway (a duplicate key, for instance), the error is
    /// [`DocumentStoreError::BulkWrite`] carrying the identifiers stored before the abort.
    /// Callers must not assume all-or-nothing.
    pub async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>> {
        check_collection_name(collection)?;
        debug!("insert {} documents into {}.{}", documents.len(), self.config.database(), collection);

        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let documents = documents
            .into_iter()
            .map(with_id)
            .collect::<Vec<_>>();

        self.backend
            .insert_many(collection, documents)
            .await
            .inspect_err(|err| {
                if let DocumentStoreError::BulkWrite { inserted_ids, .. } = err {
                    warn!(
                        "bulk insert into {}.{} stopped after {} documents: {}",
                        self.config.database(), collection, inserted_ids.len(), err
                    );
                }
            })
    }

    /// Inserts a single document and returns its identifier.
    pub async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        check_collection_name(collection)?;
        debug!("insert one document into {}.{}", self.config.database(), collection);

        self.backend
            .insert_one(collection, with_id(document))
            .await
    }

    /// Applies `update` to every matching document and returns how many actually changed.
    pub async fn update_many(&self, collection: &str, filter: Document, update: Document) -> DocumentStoreResult<u64> {
        check_collection_name(collection)?;
        debug!("update many in {}.{}", self.config.database(), collection);

        Ok(self.backend
            .update_many(collection, filter, update)
            .await?
            .modified)
    }

    /// Applies `update` to the first matching document and returns 1 if it changed.
    pub async fn update_one(&self, collection: &str, filter: Document, update: Document) -> DocumentStoreResult<u64> {
        check_collection_name(collection)?;
        debug!("update one in {}.{}", self.config.database(), collection);

        Ok(self.backend
            .update_one(collection, filter, update)
            .await?
            .modified)
    }

    /// Deletes every matching document and returns how many were removed.
    pub async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        check_collection_name(collection)?;
        debug!("delete many in {}.{}", self.config.database(), collection);

        self.backend
            .delete_many(collection, filter)
            .await
    }

    /// Deletes the first matching document and returns how many were removed.
    pub async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        check_collection_name(collection)?;
        debug!("delete one in {}.{}", self.config.database(), collection);

        self.backend
            .delete_one(collection, filter)
            .await
    }

    /// Drops a collection with all of its documents and indexes.
    pub async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        check_collection_name(collection)?;
        debug!("drop {}.{}", self.config.database(), collection);

        self.backend
            .drop_collection(collection)
            .await
    }

    /// Lists all collections in the configured database.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts down the backend and releases its resources.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}

fn check_collection_name(collection: &str) -> DocumentStoreResult<()> {
    if collection.is_empty() {
        return Err(DocumentStoreError::Store("collection name must not be empty".into()));
    }

    Ok(())
}

/// Puts a fresh object id in front of a document that has none.
fn with_id(document: Document) -> Document {
    if document.contains_key(ID_FIELD) {
        return document;
    }

    Document::from_iter(
        std::iter::once((ID_FIELD.to_string(), Bson::ObjectId(ObjectId::new())))
            .chain(document),
    )
}

/// Renders documents as relaxed extended JSON: plain JSON numbers where they fit, with
/// `$oid` and `$date` wrappers for identifiers and timestamps.
fn to_json(documents: Vec<Document>) -> Vec<Value> {
    documents
        .into_iter()
        .map(|document| Bson::Document(document).into_relaxed_extjson())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::UpdateOutcome,
        index::{CollationStrength, IndexDescription},
    };
    use async_trait::async_trait;
    use bson::doc;
    use std::sync::Mutex;

    /// Records every find and count request and answers from canned data.
    #[derive(Debug, Default)]
    struct RecordingBackend {
        finds: Mutex<Vec<FindRequest>>,
        counts: Mutex<Vec<Option<Collation>>>,
        inserted: Mutex<Vec<Document>>,
        distinct: Vec<Bson>,
        indexes: Vec<IndexDescription>,
        documents: Vec<Document>,
    }

    #[async_trait]
    impl CollectionBackend for RecordingBackend {
        async fn count_documents(
            &self,
            _collection: &str,
            _filter: Document,
            collation: Option<Collation>,
        ) -> DocumentStoreResult<u64> {
            self.counts.lock().unwrap().push(collation);

            Ok(self.documents.len() as u64)
        }

        async fn distinct(&self, _collection: &str, _field: &str, _filter: Document) -> DocumentStoreResult<Vec<Bson>> {
            Ok(self.distinct.clone())
        }

        async fn list_indexes(&self, _collection: &str) -> DocumentStoreResult<Vec<IndexDescription>> {
            Ok(self.indexes.clone())
        }

        async fn create_index(&self, _collection: &str, spec: &IndexSpec) -> DocumentStoreResult<String> {
            Ok(spec.name())
        }

        async fn find(&self, _collection: &str, _filter: Document, request: FindRequest) -> DocumentStoreResult<Vec<Document>> {
            let skip = request.skip as usize;
            let limit = request.limit.unwrap_or(u64::MAX) as usize;
            self.finds.lock().unwrap().push(request);

            Ok(self.documents.iter().skip(skip).take(limit).cloned().collect())
        }

        async fn insert_many(&self, _collection: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>> {
            let ids = documents.iter().map(|d| d.get(ID_FIELD).cloned().unwrap()).collect();
            self.inserted.lock().unwrap().extend(documents);

            Ok(ids)
        }

        async fn insert_one(&self, _collection: &str, document: Document) -> DocumentStoreResult<Bson> {
            let id = document.get(ID_FIELD).cloned().unwrap();
            self.inserted.lock().unwrap().push(document);

            Ok(id)
        }

        async fn update_many(&self, _collection: &str, _filter: Document, _update: Document) -> DocumentStoreResult<UpdateOutcome> {
            Ok(UpdateOutcome { matched: 3, modified: 2 })
        }

        async fn update_one(&self, _collection: &str, _filter: Document, _update: Document) -> DocumentStoreResult<UpdateOutcome> {
            Ok(UpdateOutcome { matched: 1, modified: 0 })
        }

        async fn delete_many(&self, _collection: &str, _filter: Document) -> DocumentStoreResult<u64> {
            Ok(4)
        }

        async fn delete_one(&self, _collection: &str, _filter: Document) -> DocumentStoreResult<u64> {
            Ok(1)
        }

        async fn drop_collection(&self, _collection: &str) -> DocumentStoreResult<()> {
            Ok(())
        }

        async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
            Ok(vec![])
        }
    }

    fn client(backend: RecordingBackend, page_size: u64) -> DocumentCollectionClient<RecordingBackend> {
        let config = ClientConfig::builder()
            .with_page_size(page_size)
            .build()
            .unwrap();

        DocumentCollectionClient::new(config, backend)
    }

    fn numbered(count: i32) -> Vec<Document> {
        (0..count).map(|n| doc! { "_id": n, "n": n }).collect()
    }

    #[tokio::test]
    async fn test_paginated_query_uses_configured_page_size() {
        let client = client(RecordingBackend { documents: numbered(50), ..Default::default() }, 20);

        let page = client
            .paginated_query("items", doc! {}, PageRequest::new(2))
            .await
            .unwrap();

        let finds = client.backend().finds.lock().unwrap().clone();
        assert_eq!(finds[0].limit, Some(20));
        assert_eq!(finds[0].skip, 20);
        assert_eq!(page.len(), 20);
        assert_eq!(page[0], doc! { "n": 20 });
    }

    #[tokio::test]
    async fn test_paginated_query_skip_uses_limit_override() {
        let client = client(RecordingBackend { documents: numbered(50), ..Default::default() }, 20);

        client
            .paginated_query("items", doc! {}, PageRequest::new(3).with_limit(5))
            .await
            .unwrap();

        let finds = client.backend().finds.lock().unwrap().clone();
        assert_eq!(finds[0].limit, Some(5));
        assert_eq!(finds[0].skip, 10);
    }

    #[tokio::test]
    async fn test_paginated_query_rejects_page_zero_without_calling_store() {
        let client = client(RecordingBackend::default(), 20);

        for page in [0, -3] {
            let err = client
                .paginated_query("items", doc! {}, PageRequest::new(page))
                .await
                .unwrap_err();
            assert!(matches!(err, DocumentStoreError::InvalidPage(p) if p == page));
        }
        assert!(client.backend().finds.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_suppresses_id_and_selects_collation() {
        let client = client(RecordingBackend { documents: numbered(3), ..Default::default() }, 20);

        let documents = client.query("items", doc! {}, 10, 0, true).await.unwrap();

        assert!(documents.iter().all(|d| !d.contains_key(ID_FIELD)));
        let finds = client.backend().finds.lock().unwrap().clone();
        assert_eq!(finds[0].projection, Some(doc! { "_id": 0 }));
        let collation = finds[0].collation.clone().unwrap();
        assert_eq!(collation.locale, "en");
        assert_eq!(collation.strength, CollationStrength::Primary);
    }

    #[tokio::test]
    async fn test_query_default_collation_when_case_sensitive() {
        let client = client(RecordingBackend::default(), 20);

        client.query("items", doc! {}, 10, 0, false).await.unwrap();

        let finds = client.backend().finds.lock().unwrap().clone();
        assert!(finds[0].collation.is_none());
    }

    #[tokio::test]
    async fn test_zero_limit_returns_nothing() {
        let client = client(RecordingBackend { documents: numbered(3), ..Default::default() }, 20);

        let documents = client.query("items", doc! {}, 0, 0, false).await.unwrap();

        assert!(documents.is_empty());
        assert!(client.backend().finds.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_distinct_values_drops_null() {
        let backend = RecordingBackend {
            distinct: vec![Bson::Null, "Paris".into(), Bson::Undefined, "London".into()],
            ..Default::default()
        };
        let client = client(backend, 20);

        let values = client.distinct_values("people", "city").await.unwrap();

        assert_eq!(values, vec![Bson::from("Paris"), Bson::from("London")]);
    }

    #[tokio::test]
    async fn test_list_indexed_fields_flattens_and_keeps_duplicates() {
        let backend = RecordingBackend {
            indexes: vec![
                IndexDescription::primary(),
                IndexDescription::from(&IndexSpec::new(["name", "city"], true).unwrap()),
                IndexDescription::from(&IndexSpec::new(["city"], false).unwrap()),
            ],
            ..Default::default()
        };
        let client = client(backend, 20);

        let fields = client.list_indexed_fields("people").await.unwrap();

        assert_eq!(fields, vec!["_id", "name", "city", "city"]);
    }

    #[tokio::test]
    async fn test_create_index_rejects_empty_fields() {
        let client = client(RecordingBackend::default(), 20);

        let err = client
            .create_index("people", Vec::<String>::new(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::IndexCreation(_)));
    }

    #[tokio::test]
    async fn test_inserts_assign_missing_ids_first() {
        let client = client(RecordingBackend::default(), 20);
        let existing = ObjectId::new();

        let ids = client
            .insert_many("people", vec![doc! { "name": "John" }, doc! { "_id": existing, "name": "Jane" }])
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert!(matches!(ids[0], Bson::ObjectId(_)));
        assert_eq!(ids[1], Bson::ObjectId(existing));

        let inserted = client.backend().inserted.lock().unwrap().clone();
        assert_eq!(inserted[0].keys().next().map(String::as_str), Some("_id"));
    }

    #[tokio::test]
    async fn test_empty_insert_is_a_no_op() {
        let client = client(RecordingBackend::default(), 20);

        let ids = client.insert_many("people", vec![]).await.unwrap();

        assert!(ids.is_empty());
        assert!(client.backend().inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_updates_report_modified_not_matched() {
        let client = client(RecordingBackend::default(), 20);

        assert_eq!(client.update_many("people", doc! {}, doc! { "$set": { "a": 1 } }).await.unwrap(), 2);
        assert_eq!(client.update_one("people", doc! {}, doc! { "$set": { "a": 1 } }).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_page_fills_navigation() {
        let client = client(RecordingBackend { documents: numbered(25), ..Default::default() }, 10);

        let page = client.page("items", doc! {}, PageRequest::new(2)).await.unwrap();

        assert_eq!(page.items.len(), 10);
        assert_eq!(page.count, 25);
        assert_eq!(page.next_page, Some(3));
        assert_eq!(page.previous_page, Some(1));
    }

    #[tokio::test]
    async fn test_page_counts_under_query_collation() {
        let client = client(RecordingBackend { documents: numbered(3), ..Default::default() }, 10);

        client
            .page("items", doc! {}, PageRequest::new(1).case_insensitive(true))
            .await
            .unwrap();
        client.page("items", doc! {}, PageRequest::new(1)).await.unwrap();
        client.count("items", doc! {}).await.unwrap();

        let counts = client.backend().counts.lock().unwrap().clone();
        let finds = client.backend().finds.lock().unwrap().clone();
        assert_eq!(counts, vec![Some(Collation::case_insensitive()), None, None]);
        assert_eq!(counts[0], finds[0].collation);
    }

    #[tokio::test]
    async fn test_query_json_renders_values() {
        let client = client(RecordingBackend { documents: numbered(1), ..Default::default() }, 10);

        let values = client.query_json("items", doc! {}, 10, 0, false).await.unwrap();

        assert_eq!(values, vec![serde_json::json!({ "n": 0 })]);
    }

    #[tokio::test]
    async fn test_query_json_uses_relaxed_extended_json() {
        let owner = ObjectId::new();
        let backend = RecordingBackend {
            documents: vec![doc! {
                "_id": 1,
                "owner": owner,
                "created": bson::DateTime::from_millis(0),
                "big": 9_007_199_254_740_993_i64,
                "ratio": 0.5,
            }],
            ..Default::default()
        };
        let client = client(backend, 10);

        let values = client.query_json("items", doc! {}, 10, 0, false).await.unwrap();

        assert_eq!(values, vec![serde_json::json!({
            "owner": { "$oid": owner.to_hex() },
            "created": { "$date": "1970-01-01T00:00:00Z" },
            "big": 9_007_199_254_740_993_i64,
            "ratio": 0.5,
        })]);
    }

    #[tokio::test]
    async fn test_empty_collection_name_is_rejected() {
        let client = client(RecordingBackend::default(), 10);

        let err = client.count("", doc! {}).await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::Store(_)));
    }

    #[tokio::test]
    async fn test_dyn_client_forwards() {
        let client = client(RecordingBackend { documents: numbered(4), ..Default::default() }, 10).into_dyn();

        assert_eq!(client.count("items", doc! {}).await.unwrap(), 4);
    }
}
