//! Main docquery crate: lazy queries and schema-validated records over document stores.
//!
//! This crate is the primary entry point for users of docquery. It re-exports the
//! core types from the sub-crates and gives access to the storage backends.
//!
//! # Features
//!
//! - **Deferred queries** - Build a find once, invoke it against any collection, iterate lazily
//! - **Result transforms** - Materialize documents as serde types or through functions
//! - **Schema-validated records** - Every violation reported at once, identifiers assigned on first save
//! - **Lifecycle hooks** - Per record type and per collection
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docquery::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let test = store.collection("test");
//!
//!     test.insert_or_replace(doc! { "a": 1, "b": 2, "c": 1 }).await?;
//!     test.insert_or_replace(doc! { "a": 2, "b": 3, "c": 1 }).await?;
//!
//!     let result = Query::matching(doc! { "c": 1 })
//!         .sort("a", SortDirection::Desc)
//!         .invoke_on(&test)
//!         .await?;
//!
//!     assert_eq!(result.get(0).await?.unwrap().get_i32("a")?, 2);
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Records
//!
//! ```ignore
//! use docquery::{prelude::*, memory::InMemoryStore};
//! use std::sync::LazyLock;
//!
//! struct FileSet;
//!
//! static FILESET_SCHEMA: LazyLock<FieldSchema> = LazyLock::new(|| {
//!     FieldSchema::new().field(SchemaField::string("password").validate(Validator::min_length(5)))
//! });
//!
//! impl RecordType for FileSet {
//!     fn collection_name() -> &'static str { "filesets" }
//!     fn schema() -> &'static dyn Schema { &*FILESET_SCHEMA }
//! }
//!
//! let filesets = store.records::<FileSet>();
//! let mut fileset = Record::new(doc! { "password": "12345" });
//! filesets.put(&mut fileset).await?;
//!
//! let loaded = filesets.get(fileset.identifier().unwrap()).await?;
//! assert_eq!(loaded.data().attr_as::<String>("password")?, "12345");
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docquery_core::{
    backend, collection, document, error, filter, query, record, result, schema, store,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docquery_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docquery_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
