//! The lazy outcome of invoking a [`Query`].

use futures::{StreamExt, TryStreamExt, stream::{self, BoxStream}};

use crate::{
    backend::DocumentCursor,
    error::DocumentStoreResult,
    query::Query,
    store::CollectionHandle,
};

/// A live cursor plus the query that opened it.
///
/// Iteration is forward-only and single-pass: once the cursor is exhausted,
/// [`next`](QueryResult::next) keeps returning `None`. Invoke the query again
/// for a fresh result.
pub struct QueryResult<T> {
    cursor: Option<DocumentCursor>,
    complete: bool,
    query: Query<T>,
    collection: CollectionHandle,
}

impl<T: Send + 'static> QueryResult<T> {
    pub(crate) fn new(cursor: DocumentCursor, query: Query<T>, collection: CollectionHandle) -> Self {
        Self {
            cursor: Some(cursor),
            complete: query.is_complete(),
            query,
            collection,
        }
    }

    /// `false` when the query projected fields, meaning results are partial
    /// documents and must not overwrite full records.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The query that produced this result.
    pub fn query(&self) -> &Query<T> {
        &self.query
    }

    /// The collection this result reads from.
    pub fn collection(&self) -> &CollectionHandle {
        &self.collection
    }

    /// Pulls and transforms the next document.
    pub async fn next(&mut self) -> Option<DocumentStoreResult<T>> {
        let item = self.cursor.as_mut()?.next().await;

        match item {
            Some(Ok(document)) => Some(self.query.materialize(document)),
            Some(Err(err)) => Some(Err(err)),
            None => {
                self.cursor = None;
                None
            }
        }
    }

    /// Converts the remaining documents into a stream of transformed items.
    pub fn into_stream(self) -> BoxStream<'static, DocumentStoreResult<T>> {
        let query = self.query;
        let cursor = match self.cursor {
            Some(cursor) => cursor,
            None => stream::empty().boxed(),
        };

        cursor
            .map(move |item| item.and_then(|document| query.materialize(document)))
            .boxed()
    }

    /// Drains the remaining documents, stopping at the first error.
    pub async fn try_collect(self) -> DocumentStoreResult<Vec<T>> {
        self.into_stream().try_collect().await
    }

    /// Materializes document `index` of this result window (after skip and
    /// within limit). Returns `Ok(None)` past the end.
    ///
    /// This issues its own find and does not move the iteration cursor.
    pub async fn get(&self, index: u64) -> DocumentStoreResult<Option<T>> {
        if self.query.limit_count().is_some_and(|limit| index >= limit) {
            return Ok(None);
        }

        let mut spec = self.query.find_spec();
        let Some(skip) = spec.skip.unwrap_or(0).checked_add(index) else {
            return Ok(None);
        };
        spec.skip = Some(skip);
        spec.limit = Some(1);

        let mut cursor = self.collection.find(&spec).await?;

        match cursor.next().await {
            Some(document) => Ok(Some(self.query.materialize(document?)?)),
            None => Ok(None),
        }
    }

    /// Number of documents matching the filter, regardless of skip and limit.
    pub async fn count(&self) -> DocumentStoreResult<u64> {
        self.collection
            .count(self.query.filter_expr())
            .await
    }

    /// Number of documents in the skip/limit window.
    pub async fn returned(&self) -> DocumentStoreResult<u64> {
        let remaining = self
            .count()
            .await?
            .saturating_sub(self.query.skip_count().unwrap_or(0));

        Ok(match self.query.limit_count() {
            Some(limit) => remaining.min(limit),
            None => remaining,
        })
    }
}

impl<T> std::fmt::Debug for QueryResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("complete", &self.complete)
            .field("exhausted", &self.cursor.is_none())
            .field("collection", &self.collection.name())
            .field("query", &self.query)
            .finish()
    }
}
