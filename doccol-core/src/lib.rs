//! A small collection client over a document database.
//!
//! This crate is the core of the doccol project and provides:
//!
//! - **Collection client** ([`client`]) - Counting, distinct values, index management, paginated queries and writes
//! - **Store backend abstraction** ([`backend`]) - The trait concrete document databases implement
//! - **Configuration** ([`config`]) - Connection parameters and the default page size
//! - **Pagination** ([`page`]) - Page requests, limit/skip windows and result pages
//! - **Indexes** ([`index`]) - Index specifications and the case-insensitive collation policy
//! - **Filter construction** ([`query`]) - Typed filter expressions compiled to filter documents
//! - **Error handling** ([`error`]) - The error taxonomy shared by every backend
//!
//! # Example
//!
//! ```ignore
//! use doccol_core::{client::DocumentCollectionClient, config::ClientConfig, page::PageRequest};
//! use bson::doc;
//!
//! let client = DocumentCollectionClient::new(ClientConfig::default(), backend);
//!
//! let total = client.count("people", doc! {}).await?;
//! let first = client
//!     .paginated_query("people", doc! { "city": "Paris" }, PageRequest::new(1))
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as doccol_core;

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod index;
pub mod page;
pub mod query;
