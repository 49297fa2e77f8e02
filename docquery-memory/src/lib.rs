//! In-memory document storage backend for docquery.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development,
//! testing, and small datasets.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **MongoDB-like matching** - Dotted paths, array equality, cross-type sort order
//! - **Full find support** - Filtering, multi-key sorting, skip, limit and projection
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
//!
//!     let mut result = Query::matching(doc! { "c": 1 }).invoke_on(&test).await?;
//!     assert_eq!(result.count().await?, 1);
//!
//!     Ok(())
//! }
//! ```

pub mod store;
pub mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
