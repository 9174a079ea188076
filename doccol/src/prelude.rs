//! Convenient re-exports of commonly used types from doccol.
//!
//! ```ignore
//! use doccol::prelude::*;
//! ```

pub use doccol_core::{
    backend::{BackendBuilder, CollectionBackend, FindRequest, UpdateOutcome},
    client::{DocumentCollectionClient, DynDocumentCollectionClient},
    config::{ClientConfig, ClientConfigBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    index::{Collation, CollationStrength, IndexDescription, IndexSpec},
    page::{Page, PageRequest, PageWindow},
    query::{Expr, FieldOp, Filter, QueryVisitor},
};
