//! A thin object-document mapping layer over document stores.
//!
//! This crate is the core of the docquery project and provides:
//!
//! - **Deferred queries** ([`query`]) - Composable find descriptions that only touch the store when invoked
//! - **Lazy results** ([`result`]) - Cursors that materialize and transform documents on demand
//! - **Filters** ([`filter`]) - Backend-neutral filter expressions
//! - **Field data** ([`document`]) - The attribute bag holding record data
//! - **Schemas** ([`schema`]) - Validation and normalization of record data
//! - **Records** ([`record`]) - Schema-governed documents with lifecycle hooks
//! - **Collections** ([`collection`]) - Persistence of one record type
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Document store** ([`store`]) - Entry point handing out collections
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docquery_core::{query::Query, filter::Filter};
//!
//! let mut result = Query::matching(doc! { "c": 1 })
//!     .sort("a", 1)
//!     .invoke_on(&store.collection("test"))
//!     .await?;
//!
//! assert_eq!(result.count().await?, 2);
//! let first = result.get(0).await?;
//! ```

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod filter;
pub mod query;
pub mod record;
pub mod result;
pub mod schema;
pub mod store;
