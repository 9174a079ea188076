//! In-memory collection backend for doccol.
//!
//! This crate provides a thread-safe, in-process implementation of the `CollectionBackend`
//! trait. It evaluates filter documents itself and is meant for development, tests and
//! small embedded datasets.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Filter evaluation** - Comparison, membership, existence and logical operators over dotted paths
//! - **Collation** - Case-insensitive string matching through ICU collation
//! - **Update operators** - `$set`, `$unset` and `$inc`, with accurate modified counts
//! - **Index catalogue** - Index creation and listing behave like the real store
//!
//! # Quick Start
//!
//! ```ignore
//! use doccol::{prelude::*, memory::InMemoryBackend};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryBackend::builder().build().await?;
//!     let client = DocumentCollectionClient::new(ClientConfig::default(), backend);
//!
//!     client.insert_one("users", doc! { "name": "Alice" }).await?;
//!     assert_eq!(client.count("users", doc! {}).await?, 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doccol_memory;

pub mod store;
mod evaluator;
mod filter;
mod update;

pub use store::{InMemoryBackend, InMemoryBackendBuilder};
