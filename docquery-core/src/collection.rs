//! Record collections.
//!
//! A [`Collection`] is the persistence boundary for one [`RecordType`]: it
//! validates records on the way in, rebuilds them on the way out, and hands
//! out queries that are already bound to its physical collection and already
//! turn every result into a [`Record`].
//!
//! ```ignore
//! let filesets = store.records::<FileSet>();
//!
//! let mut fileset = Record::new(doc! { "password": "12345" });
//! filesets.put(&mut fileset).await?;
//!
//! let same = filesets.get(fileset.identifier().unwrap()).await?;
//! let recent = filesets
//!     .query(Filter::gt("size", 100))
//!     .sort("expires_on", -1)
//!     .run()
//!     .await?
//!     .try_collect()
//!     .await?;
//! ```
//!
//! Cross-document checks and cascading cleanup go into a [`CollectionHooks`]
//! implementation attached with [`Collection::with_hooks`].

use async_trait::async_trait;
use bson::{Bson, Document};
use log::debug;
use std::{fmt, sync::Arc};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{Expr, Filter},
    query::Query,
    record::{Record, RecordType},
    store::CollectionHandle,
};

/// Per-collection settings.
#[derive(Debug, Clone, Default)]
pub struct CollectionConfig {
    normalize_on_read: bool,
    settings: Document,
}

impl CollectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-validate stored documents through the schema when reading them,
    /// so loosely typed legacy data comes back normalized.
    pub fn with_normalize_on_read(mut self, normalize: bool) -> Self {
        self.normalize_on_read = normalize;
        self
    }

    /// Adds a free-form setting for hooks to read.
    pub fn with_setting(mut self, key: &str, value: impl Into<Bson>) -> Self {
        self.settings.insert(key, value);
        self
    }

    pub fn normalize_on_read(&self) -> bool {
        self.normalize_on_read
    }

    pub fn settings(&self) -> &Document {
        &self.settings
    }

    pub fn setting(&self, key: &str) -> Option<&Bson> {
        self.settings.get(key)
    }
}

/// Extension points around writes and deletes of a collection.
#[async_trait]
pub trait CollectionHooks<K: RecordType>: Send + Sync {
    /// Runs after `record` validated and before `data` is stored. The returned
    /// document is what gets stored; an error aborts the put.
    async fn on_put(
        &self,
        _collection: &Collection<K>,
        _record: &Record<K>,
        data: Document,
    ) -> DocumentStoreResult<Document> {
        Ok(data)
    }

    /// Runs before the document with `identifier` is removed. An error aborts
    /// the delete.
    async fn on_delete(&self, _collection: &Collection<K>, _identifier: &str) -> DocumentStoreResult<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl<K: RecordType> CollectionHooks<K> for DefaultHooks {}

/// The records of type `K` stored in one physical collection.
pub struct Collection<K: RecordType> {
    handle: CollectionHandle,
    config: Arc<CollectionConfig>,
    hooks: Arc<dyn CollectionHooks<K>>,
}

impl<K: RecordType> Collection<K> {
    pub fn new(handle: CollectionHandle) -> Self {
        Self {
            handle,
            config: Arc::new(CollectionConfig::default()),
            hooks: Arc::new(DefaultHooks),
        }
    }

    pub fn with_config(mut self, config: CollectionConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_hooks(mut self, hooks: impl CollectionHooks<K> + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Returns the physical collection.
    pub fn handle(&self) -> &CollectionHandle {
        &self.handle
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Validates and stores `record`, replacing any stored document with the
    /// same identifier.
    ///
    /// On success the record holds the persisted document, is bound to this
    /// collection and counts as loaded from the store.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidData`] when the schema rejects the record,
    /// in which case nothing is stored. Hook and backend errors are returned
    /// unchanged.
    pub async fn put<'r>(&self, record: &'r mut Record<K>) -> DocumentStoreResult<&'r mut Record<K>> {
        let data = record.serialize()?;
        let data = self.hooks.on_put(self, record, data).await?;
        let persisted = self.handle.insert_or_replace(data).await?;

        debug!(
            "put {} into {}",
            record.identifier().unwrap_or("<store-assigned>"),
            self.handle.name()
        );

        record.persisted(persisted, self.clone());

        Ok(record)
    }

    /// Loads the record with `identifier`, whatever BSON form its stored
    /// `_id` has.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::ObjectNotFound`] when no document has that identifier.
    pub async fn get(&self, identifier: &str) -> DocumentStoreResult<Record<K>> {
        debug!("get {} from {}", identifier, self.handle.name());

        let document = self
            .handle
            .find_one(&Filter::identifier(identifier))
            .await?
            .ok_or_else(|| DocumentStoreError::ObjectNotFound(identifier.to_string()))?;

        Record::deserialize(document, Some(self))
    }

    /// Removes the record with `identifier`. Unknown identifiers are ignored.
    pub async fn delete(&self, identifier: &str) -> DocumentStoreResult<()> {
        self.hooks.on_delete(self, identifier).await?;

        debug!("delete {} from {}", identifier, self.handle.name());

        self.handle
            .remove(&Filter::identifier(identifier))
            .await
    }

    /// A query over every record of this collection.
    pub fn all(&self) -> Query<Record<K>> {
        self.bind(Query::new())
    }

    /// A query over the records matching `filter`.
    pub fn query(&self, filter: Expr) -> Query<Record<K>> {
        self.bind(Query::filter(filter))
    }

    /// Number of stored records.
    pub async fn count(&self) -> DocumentStoreResult<u64> {
        self.handle.count(None).await
    }

    fn bind(&self, query: Query) -> Query<Record<K>> {
        query
            .call_with(
                |document, collection: &Collection<K>| Record::deserialize(document, Some(collection)),
                self.clone(),
            )
            .bind_collection(self.handle.clone())
    }
}

impl<K: RecordType> Clone for Collection<K> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            config: Arc::clone(&self.config),
            hooks: Arc::clone(&self.hooks),
        }
    }
}

impl<K: RecordType> fmt::Debug for Collection<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.handle.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
