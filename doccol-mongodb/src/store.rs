use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document, doc};
use log::{debug, info};
use mongodb::{
    Client, Collection as MongoCollection, Database, IndexModel,
    options::{
        ClientOptions, Collation as MongoCollation, CollationStrength as MongoCollationStrength,
        CountOptions, FindOptions, IndexOptions,
    },
};
use doccol_core::{
    backend::{BackendBuilder, CollectionBackend, FindRequest, UpdateOutcome},
    config::ClientConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    index::{Collation, CollationStrength, IndexDescription, IndexSpec},
};

use crate::error::{index_error, insert_many_error, is_namespace_not_found, store_error};


#[derive(Debug, Clone)]
pub struct MongoDbBackend {
    client: Client,
    database: String,
}

impl MongoDbBackend {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(config: &ClientConfig) -> MongoDbBackendBuilder {
        MongoDbBackendBuilder::new(config)
    }

    /// Connects to the server described by `config` and verifies it answers.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] for an invalid config and
    /// [`DocumentStoreError::Connection`] if the server cannot be reached.
    pub async fn connect(config: &ClientConfig) -> DocumentStoreResult<Self> {
        config.validate()?;

        Self::builder(config).build().await
    }

    fn database(&self) -> Database {
        self.client.database(&self.database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.database().collection(collection_name)
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        self.database()
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| match store_error(e) {
                DocumentStoreError::Store(message) => DocumentStoreError::Connection(message),
                other => other,
            })?;

        Ok(())
    }
}

fn to_driver_collation(collation: &Collation) -> MongoCollation {
    MongoCollation::builder()
        .locale(collation.locale.clone())
        .strength(match collation.strength {
            CollationStrength::Primary => MongoCollationStrength::Primary,
            CollationStrength::Secondary => MongoCollationStrength::Secondary,
            CollationStrength::Tertiary => MongoCollationStrength::Tertiary,
        })
        .build()
}

fn from_driver_collation(collation: &MongoCollation) -> Collation {
    let strength = match collation.strength {
        Some(MongoCollationStrength::Primary) => CollationStrength::Primary,
        Some(MongoCollationStrength::Secondary) => CollationStrength::Secondary,
        // Unset means the server default (tertiary); stronger levels are not modelled.
        _ => CollationStrength::Tertiary,
    };

    Collation {
        locale: collation.locale.clone(),
        strength,
    }
}

fn describe_index(model: IndexModel) -> IndexDescription {
    let options = model.options.unwrap_or_default();
    // Servers always report a name; this only covers a model built without one.
    let name = options.name.unwrap_or_else(|| {
        model.keys
            .iter()
            .map(|(field, direction)| match direction {
                Bson::Int32(n) => format!("{field}_{n}"),
                Bson::Int64(n) => format!("{field}_{n}"),
                Bson::Double(n) => format!("{field}_{n}"),
                Bson::String(kind) => format!("{field}_{kind}"),
                other => format!("{field}_{other}"),
            })
            .collect::<Vec<_>>()
            .join("_")
    });

    IndexDescription {
        name,
        keys: model.keys,
        collation: options.collation.as_ref().map(from_driver_collation),
    }
}

#[async_trait]
impl CollectionBackend for MongoDbBackend {
    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        collation: Option<Collation>,
    ) -> DocumentStoreResult<u64> {
        let mut options = CountOptions::default();
        options.collation = collation.as_ref().map(to_driver_collation);

        self.get_collection(collection)
            .count_documents(filter)
            .with_options(options)
            .await
            .map_err(store_error)
    }

    async fn distinct(&self, collection: &str, field: &str, filter: Document) -> DocumentStoreResult<Vec<Bson>> {
        self.get_collection(collection)
            .distinct(field, filter)
            .await
            .map_err(store_error)
    }

    async fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<IndexDescription>> {
        let cursor = match self.get_collection(collection).list_indexes().await {
            Ok(cursor) => cursor,
            Err(e) if is_namespace_not_found(&e) => return Ok(vec![]),
            Err(e) => return Err(store_error(e)),
        };

        Ok(
            cursor
                .try_collect::<Vec<IndexModel>>()
                .await
                .map_err(store_error)?
                .into_iter()
                .map(describe_index)
                .collect()
        )
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> DocumentStoreResult<String> {
        let mut options = IndexOptions::default();
        options.name = Some(spec.name());
        options.collation = spec.collation().as_ref().map(to_driver_collation);

        let model = IndexModel::builder()
            .keys(spec.keys())
            .options(options)
            .build();

        Ok(
            self.get_collection(collection)
                .create_index(model)
                .await
                .map_err(index_error)?
                .index_name
        )
    }

    async fn find(&self, collection: &str, filter: Document, request: FindRequest) -> DocumentStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = request.limit {
            options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if request.skip > 0 {
            options.skip = Some(request.skip);
        }
        options.projection = request.projection;
        options.collation = request.collation.as_ref().map(to_driver_collation);

        self.get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(store_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(store_error)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>> {
        let ids = documents
            .iter()
            .map(|document| document.get("_id").cloned().unwrap_or(Bson::Null))
            .collect::<Vec<_>>();

        self.get_collection(collection)
            .insert_many(documents)
            .await
            .map_err(|e| insert_many_error(e, &ids))?;

        Ok(ids)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        Ok(
            self.get_collection(collection)
                .insert_one(document)
                .await
                .map_err(store_error)?
                .inserted_id
        )
    }

    async fn update_many(&self, collection: &str, filter: Document, update: Document) -> DocumentStoreResult<UpdateOutcome> {
        let result = self.get_collection(collection)
            .update_many(filter, update)
            .await
            .map_err(store_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn update_one(&self, collection: &str, filter: Document, update: Document) -> DocumentStoreResult<UpdateOutcome> {
        let result = self.get_collection(collection)
            .update_one(filter, update)
            .await
            .map_err(store_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        Ok(
            self.get_collection(collection)
                .delete_many(filter)
                .await
                .map_err(store_error)?
                .deleted_count
        )
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        Ok(
            self.get_collection(collection)
                .delete_one(filter)
                .await
                .map_err(store_error)?
                .deleted_count
        )
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .drop()
            .await
            .map_err(store_error)
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.database()
            .list_collection_names()
            .await
            .map_err(store_error)
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        info!("closing connection to database {}", self.database);
        self.client.clone().shutdown().await;

        Ok(())
    }
}


/// Builds a [`MongoDbBackend`] from a [`ClientConfig`].
///
/// Building pings the server, so an unreachable host fails here rather than on the first
/// query.
pub struct MongoDbBackendBuilder {
    uri: String,
    database: String,
}

impl MongoDbBackendBuilder {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            uri: config.connection_string(),
            database: config.database().to_string(),
        }
    }

    /// Replaces the connection string derived from the configuration, for example to add
    /// credentials or a replica set name.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }
}

#[async_trait]
impl BackendBuilder for MongoDbBackendBuilder {
    type Backend = MongoDbBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        debug!("connecting to {} (database {})", self.uri, self.database);

        let backend = MongoDbBackend::new(
            Client::with_options(
                ClientOptions::parse(&self.uri)
                    .await
                    .map_err(|e| DocumentStoreError::Configuration(e.to_string()))?,
            )
            .map_err(|e| DocumentStoreError::Configuration(e.to_string()))?,
            self.database,
        );

        backend.ping().await?;
        info!("connected to database {}", backend.database);

        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collation_conversion() {
        let driver = to_driver_collation(&Collation::case_insensitive());

        assert_eq!(driver.locale, "en");
        assert!(matches!(driver.strength, Some(MongoCollationStrength::Primary)));
        assert_eq!(from_driver_collation(&driver), Collation::case_insensitive());
    }

    #[test]
    fn test_describe_index_keeps_key_order_and_collation() {
        let spec = IndexSpec::new(["name", "city"], true).unwrap();
        let mut options = IndexOptions::default();
        options.name = Some(spec.name());
        options.collation = spec.collation().as_ref().map(to_driver_collation);

        let description = describe_index(
            IndexModel::builder().keys(spec.keys()).options(options).build(),
        );

        assert_eq!(description, IndexDescription::from(&spec));
    }

    #[test]
    fn test_describe_index_without_name() {
        let description = describe_index(IndexModel::builder().keys(doc! { "_id": 1 }).build());

        assert_eq!(description.name, "_id_1");
        assert!(description.collation.is_none());
    }

    #[test]
    fn test_describe_index_without_name_renders_plain_directions() {
        let keys = doc! { "name": Bson::Int64(1), "age": -1, "bio": "text" };

        let description = describe_index(IndexModel::builder().keys(keys).build());

        assert_eq!(description.name, "name_1_age_-1_bio_text");
    }

    #[test]
    fn test_builder_uses_config_connection_string() {
        let config = ClientConfig::builder()
            .with_host("db.internal")
            .with_port(27018)
            .with_database("catalog")
            .build()
            .unwrap();

        let builder = MongoDbBackend::builder(&config);

        assert_eq!(builder.uri, "mongodb://db.internal:27018");
        assert_eq!(builder.database, "catalog");
    }
}
