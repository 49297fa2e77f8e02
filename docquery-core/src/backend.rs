//! Storage backend abstraction.
//!
//! A [`StoreBackend`] is the driver this layer sits on. It offers a handful of
//! primitives over named collections of documents keyed by `_id`:
//!
//! - [`find`](StoreBackend::find) returning a lazy, forward-only [`DocumentCursor`]
//! - [`count`](StoreBackend::count) of the documents matching a filter
//! - [`find_one`](StoreBackend::find_one)
//! - [`insert_or_replace`](StoreBackend::insert_or_replace), an upsert keyed by `_id`
//! - [`remove`](StoreBackend::remove)
//!
//! Filters are opaque [`Expr`] trees; backends either evaluate or translate them.
//! Driver failures should be returned as [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend)
//! so they reach callers untranslated.

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;
use std::{fmt::Debug, sync::Arc};

use crate::{error::DocumentStoreResult, filter::Expr, query::FindSpec};

/// A lazy stream of documents produced by [`StoreBackend::find`].
///
/// Errors raised while reading are yielded as `Err` items; the stream ends only
/// when the underlying cursor is exhausted.
pub type DocumentCursor = BoxStream<'static, DocumentStoreResult<Document>>;

/// Abstract interface for document storage backends.
///
/// Implementations must be thread-safe. Every method maps to one driver call;
/// nothing here retries or spawns background work.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Opens a cursor over the documents in `collection` that match `spec`.
    ///
    /// The sort is applied first, then the skip, then the limit. When a
    /// projection is present, returned documents hold only the projected fields
    /// plus `_id`.
    async fn find(&self, collection: &str, spec: &FindSpec) -> DocumentStoreResult<DocumentCursor>;

    /// Counts the documents matching `filter`, ignoring any skip or limit.
    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64>;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Expr,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Stores `document`, replacing any document with the same `_id`.
    ///
    /// Documents without an `_id` receive a freshly generated one. Returns the
    /// document exactly as persisted.
    async fn insert_or_replace(
        &self,
        collection: &str,
        document: Document,
    ) -> DocumentStoreResult<Document>;

    /// Removes every document matching `filter`. Matching nothing is not an error.
    async fn remove(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Drops a collection and all its documents. Dropping a missing collection is a no-op.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Releases driver resources.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend + ?Sized,
{
    async fn find(&self, collection: &str, spec: &FindSpec) -> DocumentStoreResult<DocumentCursor> {
        (**self).find(collection, spec).await
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        (**self).count(collection, filter).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Expr,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).find_one(collection, filter).await
    }

    async fn insert_or_replace(
        &self,
        collection: &str,
        document: Document,
    ) -> DocumentStoreResult<Document> {
        (**self).insert_or_replace(collection, document).await
    }

    async fn remove(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<()> {
        (**self).remove(collection, filter).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        (**self).list_collections().await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        (**self).drop_collection(name).await
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        (**self).shutdown().await
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
