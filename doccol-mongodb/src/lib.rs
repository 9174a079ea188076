//! MongoDB backend implementation for doccol.
//!
//! This crate provides a MongoDB-based implementation of the `CollectionBackend` trait.
//! Filters, projections and collations are passed to the server untouched, so the full
//! MongoDB query language is available.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! doccol = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! The backend is built from a `ClientConfig` (`mongodb://host:port`). Building pings the
//! server, so an unreachable host is reported as a `Connection` error at construction.
//!
//! # Errors
//!
//! Driver errors are translated as follows: server selection, authentication, I/O, DNS and
//! pool errors become `Connection`; an ordered insert that stops partway becomes
//! `BulkWrite` with the identifiers stored before the failure; a rejected index becomes
//! `IndexCreation`; everything else is `Store`.
//!
//! # Example
//!
//! ```ignore
//! use doccol::{prelude::*, mongodb::MongoDbBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder().with_database("catalog").build()?;
//!     let backend = MongoDbBackend::connect(&config).await?;
//!     let client = DocumentCollectionClient::new(config, backend);
//!
//!     client.create_index("products", ["name"], true).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doccol_mongodb;

mod error;
pub mod store;

pub use store::{MongoDbBackend, MongoDbBackendBuilder};
