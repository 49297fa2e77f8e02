//! Entry points for working with a backend.
//!
//! - [`DocumentStore`] owns a backend and hands out collection handles and
//!   record collections.
//! - [`CollectionHandle`] is one physical collection on that backend. It is
//!   cheap to clone and is what queries bind to.
//!
//! ```ignore
//! let store = DocumentStore::new(InMemoryStore::new());
//! let raw = store.collection("test");
//! let filesets = store.records::<FileSet>();
//! ```

use bson::Document;
use std::sync::Arc;

use crate::{
    backend::{DocumentCursor, StoreBackend},
    collection::{Collection, CollectionConfig},
    error::DocumentStoreResult,
    filter::Expr,
    query::FindSpec,
    record::RecordType,
};

/// A named collection on a shared backend.
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    name: String,
    backend: Arc<dyn StoreBackend>,
}

impl CollectionHandle {
    pub fn new(name: impl Into<String>, backend: Arc<dyn StoreBackend>) -> Self {
        Self { name: name.into(), backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the backend this collection lives on.
    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }

    pub async fn find(&self, spec: &FindSpec) -> DocumentStoreResult<DocumentCursor> {
        self.backend.find(&self.name, spec).await
    }

    pub async fn count(&self, filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        self.backend.count(&self.name, filter).await
    }

    pub async fn find_one(&self, filter: &Expr) -> DocumentStoreResult<Option<Document>> {
        self.backend.find_one(&self.name, filter).await
    }

    /// Upserts `document` keyed by its `_id` and returns it as persisted.
    pub async fn insert_or_replace(&self, document: Document) -> DocumentStoreResult<Document> {
        self.backend
            .insert_or_replace(&self.name, document)
            .await
    }

    pub async fn remove(&self, filter: &Expr) -> DocumentStoreResult<()> {
        self.backend.remove(&self.name, filter).await
    }
}

/// A document store bound to one backend.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    backend: Arc<dyn StoreBackend>,
}

impl DocumentStore {
    /// Creates a new document store with the given backend.
    pub fn new(backend: impl StoreBackend + 'static) -> Self {
        Self { backend: Arc::new(backend) }
    }

    /// Creates a store over an already shared backend.
    pub fn from_shared(backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend }
    }

    /// Returns a handle to the collection called `name`.
    pub fn collection(&self, name: &str) -> CollectionHandle {
        CollectionHandle::new(name, Arc::clone(&self.backend))
    }

    /// Returns the record collection for `K`, named by [`RecordType::collection_name`].
    pub fn records<K: RecordType>(&self) -> Collection<K> {
        Collection::new(self.collection(K::collection_name()))
    }

    /// Like [`records`](Self::records), with an explicit configuration.
    pub fn records_with_config<K: RecordType>(&self, config: CollectionConfig) -> Collection<K> {
        Collection::new(self.collection(K::collection_name())).with_config(config)
    }

    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}
