//! Convenient re-exports of commonly used types from docquery.
//!
//! ```ignore
//! use docquery::prelude::*;
//! ```
//!
//! This provides access to:
//! - Queries, filters and results
//! - Records, schemas and collections
//! - Store backends and builders
//! - Error types

pub use bson::doc;

pub use docquery_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::{Collection, CollectionConfig, CollectionHooks, DefaultHooks},
    document::{AttributeBag, FromDocument, ID_FIELD},
    error::{DocumentStoreError, DocumentStoreResult, NO_COLLECTION, ValidationErrors},
    filter::{Expr, FieldOp, Filter, QueryVisitor},
    query::{FindSpec, Query, Sort, SortDirection},
    record::{Record, RecordType},
    result::QueryResult,
    schema::{FieldKind, FieldSchema, Schema, SchemaField, UnknownFields, Validator},
    store::{CollectionHandle, DocumentStore},
};
