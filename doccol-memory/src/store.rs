//! In-memory collection backend.
//!
//! Documents live in insertion order behind an async-aware read-write lock. Every
//! collection carries an index catalogue so that index creation and introspection behave
//! like the real store, even though queries always scan.

use std::{collections::BTreeMap, sync::Arc};
use async_trait::async_trait;
use bson::{Bson, Document};
use icu_collator::CollatorBorrowed;
use log::info;
use mea::rwlock::RwLock;

use doccol_core::{
    backend::{BackendBuilder, CollectionBackend, FindRequest, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    index::{Collation, IndexDescription, IndexSpec},
    query::Expr,
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, collator_for, resolve_path},
    filter::parse_filter,
    update::{apply_update, parse_update},
};

#[derive(Debug, Clone)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexDescription>,
}

impl Default for CollectionState {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![IndexDescription::primary()],
        }
    }
}

impl CollectionState {
    fn contains_id(&self, id: &Bson) -> bool {
        let id = Comparable::from(id);

        self.documents
            .iter()
            .filter_map(|document| document.get("_id"))
            .any(|existing| Comparable::from(existing).equals(&id, None))
    }

    /// Positions of the matching documents, in natural order.
    fn matching(&self, expr: &Expr, collator: Option<&CollatorBorrowed<'static>>) -> DocumentStoreResult<Vec<usize>> {
        let mut positions = Vec::new();

        for (position, document) in self.documents.iter().enumerate() {
            if DocumentEvaluator::new(document, collator).evaluate(expr)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }
}

type StoreMap = BTreeMap<String, CollectionState>;

/// Thread-safe in-memory collection backend.
///
/// Clones share the same underlying data, so a backend can be handed to several clients.
/// Queries scan every document of a collection; indexes are recorded but never used.
///
/// # Example
///
/// ```ignore
/// use doccol_memory::InMemoryBackend;
/// use doccol::{client::DocumentCollectionClient, config::ClientConfig};
///
/// let client = DocumentCollectionClient::new(ClientConfig::default(), InMemoryBackend::new());
/// client.insert_one("users", doc! { "name": "Alice" }).await?;
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryBackend {
    /// collection name -> documents and index catalogue
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryBackend {
    /// Creates an empty backend with no collections.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    pub fn builder() -> InMemoryBackendBuilder {
        InMemoryBackendBuilder::default()
    }

    /// Inserts in order, stopping at the first duplicate `_id`.
    async fn insert_ordered(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>> {
        let mut store = self.store.write().await;
        let state = store
            .entry(collection.to_string())
            .or_default();

        let mut inserted_ids = Vec::with_capacity(documents.len());

        for document in documents {
            let id = match document.get("_id") {
                Some(id) => id.clone(),
                None => return Err(DocumentStoreError::BulkWrite {
                    message: "document is missing an _id".into(),
                    inserted_ids,
                }),
            };

            if state.contains_id(&id) {
                return Err(DocumentStoreError::BulkWrite {
                    message: format!("E11000 duplicate key error collection: {collection} index: _id_ dup key: {{ _id: {id} }}"),
                    inserted_ids,
                });
            }

            state.documents.push(document);
            inserted_ids.push(id);
        }

        Ok(inserted_ids)
    }

    async fn update(&self, collection: &str, filter: Document, update: Document, multi: bool) -> DocumentStoreResult<UpdateOutcome> {
        let expr = parse_filter(&filter)?;
        let ops = parse_update(&update)?;

        let mut store = self.store.write().await;
        let state = match store.get_mut(collection) {
            Some(state) => state,
            None => return Ok(UpdateOutcome::default()),
        };

        let mut positions = state.matching(&expr, None)?;
        if !multi {
            positions.truncate(1);
        }

        let mut outcome = UpdateOutcome {
            matched: positions.len() as u64,
            modified: 0,
        };

        for position in positions {
            if apply_update(&mut state.documents[position], &ops)? {
                outcome.modified += 1;
            }
        }

        Ok(outcome)
    }

    async fn delete(&self, collection: &str, filter: Document, multi: bool) -> DocumentStoreResult<u64> {
        let expr = parse_filter(&filter)?;

        let mut store = self.store.write().await;
        let state = match store.get_mut(collection) {
            Some(state) => state,
            None => return Ok(0),
        };

        let mut positions = state.matching(&expr, None)?;
        if !multi {
            positions.truncate(1);
        }

        for position in positions.iter().rev() {
            state.documents.remove(*position);
        }

        Ok(positions.len() as u64)
    }
}

#[async_trait]
impl CollectionBackend for InMemoryBackend {
    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        collation: Option<Collation>,
    ) -> DocumentStoreResult<u64> {
        let expr = parse_filter(&filter)?;

        let store = self.store.read().await;
        let state = match store.get(collection) {
            Some(state) => state,
            None => return Ok(0),
        };
        let collator = collation.as_ref().map(collator_for).transpose()?;

        Ok(state.matching(&expr, collator.as_ref())?.len() as u64)
    }

    async fn distinct(&self, collection: &str, field: &str, filter: Document) -> DocumentStoreResult<Vec<Bson>> {
        let expr = parse_filter(&filter)?;

        let store = self.store.read().await;
        let state = match store.get(collection) {
            Some(state) => state,
            None => return Ok(vec![]),
        };

        let mut values: Vec<Bson> = Vec::new();

        for position in state.matching(&expr, None)? {
            for value in resolve_path(&state.documents[position], field) {
                let unwound = match value {
                    Bson::Array(items) => items.iter().collect::<Vec<_>>(),
                    other => vec![other],
                };

                for value in unwound {
                    let candidate = Comparable::from(value);
                    let seen = values
                        .iter()
                        .any(|existing| Comparable::from(existing).equals(&candidate, None));

                    if !seen {
                        values.push(value.clone());
                    }
                }
            }
        }

        Ok(values)
    }

    async fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<IndexDescription>> {
        Ok(
            self.store
                .read()
                .await
                .get(collection)
                .map(|state| state.indexes.clone())
                .unwrap_or_default()
        )
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> DocumentStoreResult<String> {
        let description = IndexDescription::from(spec);

        let mut store = self.store.write().await;
        let state = store
            .entry(collection.to_string())
            .or_default();

        match state.indexes.iter().find(|index| index.name == description.name) {
            Some(existing) if *existing == description => Ok(existing.name.clone()),
            Some(existing) => Err(DocumentStoreError::IndexCreation(format!(
                "an index named {} already exists with different options",
                existing.name
            ))),
            None => {
                let name = description.name.clone();
                state.indexes.push(description);
                Ok(name)
            },
        }
    }

    async fn find(&self, collection: &str, filter: Document, request: FindRequest) -> DocumentStoreResult<Vec<Document>> {
        let expr = parse_filter(&filter)?;
        let projection = request.projection
            .as_ref()
            .map(Projection::parse)
            .transpose()?;

        let store = self.store.read().await;
        let state = match store.get(collection) {
            Some(state) => state,
            None => return Ok(vec![]),
        };

        let collator = request.collation
            .as_ref()
            .map(collator_for)
            .transpose()?;

        let limit = match request.limit {
            Some(0) | None => usize::MAX,
            Some(limit) => usize::try_from(limit).unwrap_or(usize::MAX),
        };
        let skip = usize::try_from(request.skip).unwrap_or(usize::MAX);

        Ok(
            state
                .matching(&expr, collator.as_ref())?
                .into_iter()
                .skip(skip)
                .take(limit)
                .map(|position| {
                    let document = &state.documents[position];
                    match &projection {
                        Some(projection) => projection.apply(document),
                        None => document.clone(),
                    }
                })
                .collect()
        )
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>> {
        self.insert_ordered(collection, documents).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        match self.insert_ordered(collection, vec![document]).await {
            Ok(mut ids) => ids.pop().ok_or_else(|| DocumentStoreError::Store("no document inserted".into())),
            Err(DocumentStoreError::BulkWrite { message, .. }) => Err(DocumentStoreError::Store(message)),
            Err(err) => Err(err),
        }
    }

    async fn update_many(&self, collection: &str, filter: Document, update: Document) -> DocumentStoreResult<UpdateOutcome> {
        self.update(collection, filter, update, true).await
    }

    async fn update_one(&self, collection: &str, filter: Document, update: Document) -> DocumentStoreResult<UpdateOutcome> {
        self.update(collection, filter, update, false).await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.delete(collection, filter, true).await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.delete(collection, filter, false).await
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        self.store
            .write()
            .await
            .remove(collection);

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(
            self.store
                .read()
                .await
                .keys()
                .cloned()
                .collect()
        )
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        info!("shutting down in-memory backend");
        Ok(())
    }
}

/// A projection document: either inclusive (`{ field: 1 }`) or exclusive (`{ field: 0 }`).
///
/// `_id` may be excluded from an inclusive projection; it is kept otherwise.
#[derive(Debug)]
struct Projection {
    fields: Vec<String>,
    inclusive: bool,
    keep_id: bool,
}

impl Projection {
    fn parse(projection: &Document) -> DocumentStoreResult<Self> {
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut keep_id = true;

        for (field, flag) in projection {
            let include = match flag {
                Bson::Boolean(value) => *value,
                Bson::Int32(value) => *value != 0,
                Bson::Int64(value) => *value != 0,
                Bson::Double(value) => *value != 0.0,
                _ => return Err(DocumentStoreError::Store(format!(
                    "unsupported projection for {field:?}"
                ))),
            };

            match (field.as_str(), include) {
                ("_id", include) => keep_id = include,
                (_, true) => included.push(field.clone()),
                (_, false) => excluded.push(field.clone()),
            }
        }

        if !included.is_empty() && !excluded.is_empty() {
            return Err(DocumentStoreError::Store(
                "cannot mix inclusion and exclusion in a projection".into(),
            ));
        }

        Ok(match included.is_empty() {
            true => Self { fields: excluded, inclusive: false, keep_id },
            false => Self { fields: included, inclusive: true, keep_id },
        })
    }

    fn apply(&self, document: &Document) -> Document {
        document
            .iter()
            .filter(|(key, _)| match key.as_str() {
                "_id" => self.keep_id,
                key => self.fields.iter().any(|field| field == key) == self.inclusive,
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Builder for constructing [`InMemoryBackend`] instances.
///
/// Optionally seeds collections with documents, which is handy for fixtures.
#[derive(Default)]
pub struct InMemoryBackendBuilder {
    seed: Vec<(String, Vec<Document>)>,
}

impl InMemoryBackendBuilder {
    pub fn with_documents(mut self, collection: impl Into<String>, documents: Vec<Document>) -> Self {
        self.seed.push((collection.into(), documents));
        self
    }
}

#[async_trait]
impl BackendBuilder for InMemoryBackendBuilder {
    type Backend = InMemoryBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let backend = InMemoryBackend::new();

        for (collection, documents) in self.seed {
            backend.insert_ordered(&collection, documents).await?;
        }

        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    async fn people() -> InMemoryBackend {
        InMemoryBackend::builder()
            .with_documents("people", vec![
                doc! { "_id": 1, "name": "John", "age": 30, "city": "New York" },
                doc! { "_id": 2, "name": "Jane", "age": 25, "city": "Paris" },
                doc! { "_id": 3, "name": "john", "age": 41, "city": Bson::Null },
                doc! { "_id": 4, "name": "Ann", "tags": ["a", "b"] },
            ])
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_count_with_filter() {
        let backend = people().await;

        assert_eq!(backend.count_documents("people", doc! {}, None).await.unwrap(), 4);
        assert_eq!(backend.count_documents("people", doc! { "age": { "$gte": 30 } }, None).await.unwrap(), 2);
        assert_eq!(backend.count_documents("nobody", doc! {}, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_with_collation_matches_find() {
        let backend = people().await;
        let collation = Some(Collation::case_insensitive());
        let request = FindRequest { collation: collation.clone(), ..Default::default() };

        let counted = backend.count_documents("people", doc! { "name": "JOHN" }, collation).await.unwrap();
        let found = backend.find("people", doc! { "name": "JOHN" }, request).await.unwrap();

        assert_eq!(counted, 2);
        assert_eq!(found.len(), 2);
        assert_eq!(backend.count_documents("people", doc! { "name": "JOHN" }, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_preserves_insertion_order_with_skip_and_limit() {
        let backend = people().await;
        let request = FindRequest { limit: Some(2), skip: 1, ..Default::default() };

        let found = backend.find("people", doc! {}, request).await.unwrap();

        let ids = found.iter().map(|d| d.get("_id").cloned().unwrap()).collect::<Vec<_>>();
        assert_eq!(ids, vec![Bson::Int32(2), Bson::Int32(3)]);
    }

    #[tokio::test]
    async fn test_find_with_collation() {
        let backend = people().await;
        let request = FindRequest {
            collation: Some(Collation::case_insensitive()),
            ..Default::default()
        };

        let exact = backend.find("people", doc! { "name": "john" }, FindRequest::default()).await.unwrap();
        let folded = backend.find("people", doc! { "name": "john" }, request).await.unwrap();

        assert_eq!(exact.len(), 1);
        assert_eq!(folded.len(), 2);
    }

    #[tokio::test]
    async fn test_find_projection() {
        let backend = people().await;
        let exclude = FindRequest { projection: Some(doc! { "_id": 0, "age": 0 }), ..Default::default() };
        let include = FindRequest { projection: Some(doc! { "name": 1 }), ..Default::default() };

        let excluded = backend.find("people", doc! { "_id": 1 }, exclude).await.unwrap();
        let included = backend.find("people", doc! { "_id": 1 }, include).await.unwrap();

        assert_eq!(excluded, vec![doc! { "name": "John", "city": "New York" }]);
        assert_eq!(included, vec![doc! { "_id": 1, "name": "John" }]);
    }

    #[tokio::test]
    async fn test_distinct_unwinds_and_reports_null() {
        let backend = people().await;
        backend.insert_many("people", vec![doc! { "_id": 5, "city": "Paris", "tags": ["b", "c"] }]).await.unwrap();

        let cities = backend.distinct("people", "city", doc! {}).await.unwrap();
        let tags = backend.distinct("people", "tags", doc! {}).await.unwrap();

        assert_eq!(cities, vec![Bson::from("New York"), Bson::from("Paris"), Bson::Null]);
        assert_eq!(tags, vec![Bson::from("a"), Bson::from("b"), Bson::from("c")]);
    }

    #[tokio::test]
    async fn test_duplicate_id_aborts_batch_with_partial_ids() {
        let backend = people().await;

        let err = backend
            .insert_many("people", vec![doc! { "_id": 10 }, doc! { "_id": 2 }, doc! { "_id": 11 }])
            .await
            .unwrap_err();

        match err {
            DocumentStoreError::BulkWrite { inserted_ids, .. } => assert_eq!(inserted_ids, vec![Bson::Int32(10)]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.count_documents("people", doc! {}, None).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_duplicate_id_matches_across_numeric_types() {
        let backend = people().await;

        let err = backend.insert_one("people", doc! { "_id": 1_i64 }).await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::Store(_)));
    }

    #[tokio::test]
    async fn test_adjacent_large_integer_ids_are_distinct() {
        let backend = InMemoryBackend::new();
        let ids = vec![Bson::Int64(9_007_199_254_740_992), Bson::Int64(9_007_199_254_740_993)];

        let inserted = backend
            .insert_many("ledger", ids.iter().map(|id| doc! { "_id": id.clone() }).collect())
            .await
            .unwrap();

        assert_eq!(inserted, ids);
        let lookup = doc! { "_id": 9_007_199_254_740_993_i64 };
        assert_eq!(backend.count_documents("ledger", lookup, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_index_catalogue() {
        let backend = people().await;
        let spec = IndexSpec::new(["name", "city"], true).unwrap();

        assert_eq!(backend.create_index("people", &spec).await.unwrap(), "name_1_city_1");
        assert_eq!(backend.create_index("people", &spec).await.unwrap(), "name_1_city_1");

        let conflicting = IndexSpec::new(["name", "city"], false).unwrap();
        let err = backend.create_index("people", &conflicting).await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::IndexCreation(_)));

        let indexes = backend.list_indexes("people").await.unwrap();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].name, "_id_");
        assert!(indexes[1].collation.is_some());
    }

    #[tokio::test]
    async fn test_update_counts_only_changed_documents() {
        let backend = people().await;

        let outcome = backend
            .update_many("people", doc! { "name": { "$in": ["John", "Jane"] } }, doc! { "$set": { "city": "Paris" } })
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome { matched: 2, modified: 1 });

        let outcome = backend
            .update_one("people", doc! { "city": "Paris" }, doc! { "$inc": { "age": 1 } })
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });
        assert_eq!(backend.count_documents("people", doc! { "age": 31 }, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = people().await;

        assert_eq!(backend.delete_one("people", doc! { "age": { "$exists": true } }).await.unwrap(), 1);
        assert_eq!(backend.delete_many("people", doc! { "age": { "$exists": true } }).await.unwrap(), 2);
        assert_eq!(backend.delete_many("people", doc! {}).await.unwrap(), 1);
        assert_eq!(backend.delete_many("missing", doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_collections_lifecycle() {
        let backend = people().await;
        backend.insert_one("cities", doc! { "_id": 1 }).await.unwrap();

        assert_eq!(backend.list_collections().await.unwrap(), vec!["cities", "people"]);

        backend.drop_collection("people").await.unwrap();
        backend.drop_collection("people").await.unwrap();

        assert_eq!(backend.list_collections().await.unwrap(), vec!["cities"]);
        assert!(backend.list_indexes("people").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_filter_is_store_error() {
        let backend = people().await;

        let err = backend.count_documents("people", doc! { "$bogus": 1 }, None).await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::Store(_)));
    }
}
