//! Main doccol crate: a small client for document collections.
//!
//! This crate is the primary entry point. It re-exports the core client and types and
//! provides access to the available backends.
//!
//! # Features
//!
//! - **Pagination** - 1-indexed pages with a configurable default page size
//! - **Distinct values** - Null values are removed from the result
//! - **Case-insensitive search** - Indexes and queries share one collation policy
//! - **Bulk writes** - Partial inserts are reported with the identifiers that made it in
//!
//! # Quick Start
//!
//! ```ignore
//! use doccol::{prelude::*, memory::InMemoryBackend};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let config = ClientConfig::builder().with_page_size(20).build()?;
//!     let client = DocumentCollectionClient::new(config, InMemoryBackend::new());
//!
//!     client.insert_many("people", vec![
//!         doc! { "name": "John", "age": 30, "city": "New York" },
//!         doc! { "name": "Jane", "age": 25, "city": "Paris" },
//!     ]).await?;
//!
//!     client.create_index("people", ["name"], true).await?;
//!
//!     let page = client
//!         .paginated_query("people", doc! { "name": "john" }, PageRequest::new(1).case_insensitive(true))
//!         .await?;
//!     println!("{page:?}");
//!
//!     client.shutdown().await
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! When the backend is chosen at runtime, box it with
//! [`DocumentCollectionClient::into_dyn`](client::DocumentCollectionClient::into_dyn):
//!
//! ```ignore
//! let client: DynDocumentCollectionClient = if use_mongo {
//!     DocumentCollectionClient::new(config.clone(), MongoDbBackend::connect(&config).await?).into_dyn()
//! } else {
//!     DocumentCollectionClient::new(config, InMemoryBackend::new()).into_dyn()
//! };
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process backend for development and testing
//! - `mongodb` - MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use doccol_core::{backend, client, config, error, index, page, query};

// Re-export BSON types for convenience
pub use bson;

/// In-memory backend implementations.
pub mod memory {
    pub use doccol_memory::{InMemoryBackend, InMemoryBackendBuilder};
}

/// MongoDB backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use doccol_mongodb::{MongoDbBackend, MongoDbBackendBuilder};
}
