//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory backend that keeps documents as
//! BSON in insertion-ordered maps behind async-safe read-write locks.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use indexmap::IndexMap;
use log::debug;
use mea::rwlock::RwLock;
use bson::Document;
use uuid::Uuid;

use docquery_core::{
    backend::{DocumentCursor, StoreBackend, StoreBackendBuilder},
    document::{ID_FIELD, identifier_of},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Expr,
    query::{FindSpec, project_document},
};

use crate::evaluator::{DocumentEvaluator, compare_documents};

/// identifier -> document, in insertion order
type CollectionMap = IndexMap<String, Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// Clones share the same data, so one instance can back several
/// [`DocumentStore`](docquery_core::store::DocumentStore)s and tasks.
///
/// Finds scan the whole collection. Documents without a sort come back in
/// insertion order, and replacing a document keeps its position.
///
/// # Example
///
/// ```ignore
/// use docquery_memory::InMemoryStore;
/// use docquery::store::DocumentStore;
///
/// let store = DocumentStore::new(InMemoryStore::new());
/// let test = store.collection("test");
/// test.insert_or_replace(doc! { "a": 1, "b": 2, "c": 1 }).await?;
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// ```ignore
    /// let store = InMemoryStore::builder().build().await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Every document of `collection` matching `filter`, in storage order.
    async fn matching(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut documents = Vec::new();
        for document in collection_map.values() {
            if DocumentEvaluator::matches(document, filter)? {
                documents.push(document.clone());
            }
        }

        Ok(documents)
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find(&self, collection: &str, spec: &FindSpec) -> DocumentStoreResult<DocumentCursor> {
        let mut documents = self.matching(collection, spec.filter.as_ref()).await?;

        if !spec.sort.is_empty() {
            // stable, so ties keep insertion order
            documents.sort_by(|a, b| compare_documents(a, b, &spec.sort));
        }

        let window = documents
            .into_iter()
            .skip(spec.skip.map_or(0, |skip| usize::try_from(skip).unwrap_or(usize::MAX)))
            .take(spec.limit.map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX)));

        let documents = match &spec.projection {
            Some(fields) => window
                .map(|document| project_document(&document, fields))
                .collect::<Vec<_>>(),
            None => window.collect::<Vec<_>>(),
        };

        debug!("find on {} returned {} documents", collection, documents.len());

        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        Ok(self.matching(collection, filter).await?.len() as u64)
    }

    async fn find_one(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<Option<Document>> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(None);
        };

        for document in collection_map.values() {
            if DocumentEvaluator::matches(document, Some(filter))? {
                return Ok(Some(document.clone()));
            }
        }

        Ok(None)
    }

    async fn insert_or_replace(&self, collection: &str, mut document: Document) -> DocumentStoreResult<Document> {
        let key = match identifier_of(&document) {
            Some(key) => key,
            None => {
                let key = Uuid::new_v4().to_string();
                document.insert(ID_FIELD, key.clone());
                key
            }
        };

        let mut store = self.store.write().await;
        store
            .entry(collection.to_string())
            .or_default()
            .insert(key, document.clone());

        Ok(document)
    }

    async fn remove(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(());
        };

        let mut doomed = Vec::new();
        for (key, document) in collection_map.iter() {
            if DocumentEvaluator::matches(document, Some(filter))? {
                doomed.push(key.clone());
            }
        }

        for key in doomed {
            collection_map.shift_remove(&key);
        }

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(
            self.store
                .read()
                .await
                .keys()
                .cloned()
                .collect()
        )
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store.write().await.remove(name);

        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// Optionally seeds the store with documents, which is handy for fixtures.
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    seed: Vec<(String, Document)>,
}

impl InMemoryStoreBuilder {
    /// Stores `document` in `collection` when the store is built.
    pub fn with_document(mut self, collection: &str, document: Document) -> Self {
        self.seed.push((collection.to_string(), document));
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let store = InMemoryStore::new();

        for (collection, document) in self.seed {
            if document.is_empty() {
                return Err(DocumentStoreError::Initialization(format!(
                    "empty seed document for collection {collection}"
                )));
            }

            store.insert_or_replace(&collection, document).await?;
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures::TryStreamExt;
    use docquery_core::{
        filter::Filter,
        query::{Sort, SortDirection},
    };

    async fn seeded() -> InMemoryStore {
        InMemoryStore::builder()
            .with_document("test", doc! { "_id": "1", "a": 1, "b": 2, "c": 1 })
            .with_document("test", doc! { "_id": "2", "a": 2, "b": 3, "c": 1 })
            .with_document("test", doc! { "_id": "3", "a": 3, "b": 1, "c": 2 })
            .build()
            .await
            .unwrap()
    }

    async fn find(store: &InMemoryStore, spec: FindSpec) -> Vec<Document> {
        store
            .find("test", &spec)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn find_sorts_then_skips_then_limits() {
        let store = seeded().await;

        let documents = find(&store, FindSpec {
            sort: vec![Sort { field: "a".into(), direction: SortDirection::Desc }],
            skip: Some(1),
            limit: Some(1),
            ..Default::default()
        })
        .await;

        assert_eq!(documents, vec![doc! { "_id": "2", "a": 2, "b": 3, "c": 1 }]);
    }

    #[tokio::test]
    async fn projection_keeps_only_listed_fields_and_identifier() {
        let store = seeded().await;

        let documents = find(&store, FindSpec {
            filter: Some(Filter::eq("a", 1)),
            projection: Some(vec!["b".into()]),
            ..Default::default()
        })
        .await;

        assert_eq!(documents, vec![doc! { "_id": "1", "b": 2 }]);
    }

    #[tokio::test]
    async fn count_ignores_window() {
        let store = seeded().await;

        assert_eq!(store.count("test", Some(&Filter::eq("c", 1))).await.unwrap(), 2);
        assert_eq!(store.count("test", None).await.unwrap(), 3);
        assert_eq!(store.count("missing", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insert_or_replace_keeps_position_and_generates_ids() {
        let store = seeded().await;

        store
            .insert_or_replace("test", doc! { "_id": "1", "a": 10 })
            .await
            .unwrap();
        let generated = store
            .insert_or_replace("test", doc! { "a": 4 })
            .await
            .unwrap();

        assert!(!generated.get_str(ID_FIELD).unwrap().is_empty());

        let documents = find(&store, FindSpec::default()).await;
        assert_eq!(documents.len(), 4);
        assert_eq!(documents[0], doc! { "_id": "1", "a": 10 });
        assert_eq!(documents[3], generated);
    }

    #[tokio::test]
    async fn remove_missing_is_a_no_op() {
        let store = seeded().await;

        store.remove("test", &Filter::eq("_id", "nope")).await.unwrap();
        store.remove("missing", &Filter::eq("_id", "1")).await.unwrap();
        store.remove("test", &Filter::eq("c", 1)).await.unwrap();

        assert_eq!(store.count("test", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn collections_can_be_listed_and_dropped() {
        let store = seeded().await;

        assert_eq!(store.list_collections().await.unwrap(), vec!["test".to_string()]);

        store.drop_collection("test").await.unwrap();
        store.drop_collection("test").await.unwrap();

        assert!(store.list_collections().await.unwrap().is_empty());
    }
}
