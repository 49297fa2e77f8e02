//! Schema-governed records.
//!
//! A [`Record`] is one document plus its lifecycle state. The behavior that
//! varies per kind of record (schema, collection name, identifier policy and
//! the construction and (de)serialization hooks) lives in a [`RecordType`]
//! implemented on a marker type:
//!
//! ```ignore
//! struct FileSet;
//!
//! static FILESET_SCHEMA: LazyLock<FieldSchema> = LazyLock::new(|| {
//!     FieldSchema::new()
//!         .field(SchemaField::string("password"))
//!         .field(SchemaField::datetime("expires_on"))
//! });
//!
//! impl RecordType for FileSet {
//!     fn collection_name() -> &'static str { "filesets" }
//!     fn schema() -> &'static dyn Schema { &*FILESET_SCHEMA }
//!     fn initialize(data: &mut AttributeBag) {
//!         data.set_attr("expires_on", bson::DateTime::now());
//!     }
//! }
//!
//! let mut fileset = Record::<FileSet>::new(doc! { "password": "12345" });
//! filesets.put(&mut fileset).await?;
//! ```
//!
//! A record moves from new, to validated with an identifier (inside
//! [`Record::serialize`]), to persisted (when [`Collection::put`] completes).

use bson::Document;
use log::warn;
use serde::de::DeserializeOwned;
use std::fmt;
use uuid::Uuid;

use crate::{
    collection::Collection,
    document::{AttributeBag, ID_FIELD, identifier_of},
    error::{DocumentStoreError, DocumentStoreResult, NO_COLLECTION},
    schema::Schema,
};

/// Per-type configuration and hooks of a record.
pub trait RecordType: Send + Sync + Sized + 'static {
    /// Whether [`Record::serialize`] generates identifiers. When disabled, the
    /// store assigns one on first insert.
    const CREATE_ID: bool = true;

    /// Name of the physical collection records of this type are stored in.
    fn collection_name() -> &'static str;

    fn schema() -> &'static dyn Schema;

    /// Runs once when a record is constructed from caller data, never for
    /// records read from the store.
    fn initialize(_data: &mut AttributeBag) {}

    /// Last step of [`Record::serialize`], after validation.
    fn on_serialize(data: Document) -> DocumentStoreResult<Document> {
        Ok(data)
    }

    /// First step of [`Record::deserialize`], before normalization.
    fn on_deserialize(raw: Document) -> DocumentStoreResult<Document> {
        Ok(raw)
    }
}

/// One document of record type `K`.
pub struct Record<K: RecordType> {
    data: AttributeBag,
    identifier: Option<String>,
    collection: Option<Collection<K>>,
    loaded_from_store: bool,
}

impl<K: RecordType> Record<K> {
    /// Creates a new, unbound record from caller data.
    pub fn new(data: impl Into<AttributeBag>) -> Self {
        Self::construct(data, false, None)
    }

    /// Wraps `data` in a record. An `_id` already in the data becomes the
    /// identifier. [`RecordType::initialize`] runs unless the data came from
    /// the store.
    pub fn construct(
        data: impl Into<AttributeBag>,
        loaded_from_store: bool,
        collection: Option<Collection<K>>,
    ) -> Self {
        let mut data = data.into();
        let identifier = identifier_of(&data);

        if !loaded_from_store {
            K::initialize(&mut data);
        }

        Self { data, identifier, collection, loaded_from_store }
    }

    /// Validates the record and returns the document to store.
    ///
    /// A record without identifier gets a fresh UUID first when
    /// [`RecordType::CREATE_ID`] is set. If the schema rejects the data, every
    /// violation is returned and neither the identifier nor the data change.
    pub fn serialize(&mut self) -> DocumentStoreResult<Document> {
        let identifier = match &self.identifier {
            Some(identifier) => Some(identifier.clone()),
            None if K::CREATE_ID => Some(Uuid::new_v4().to_string()),
            None => None,
        };

        let mut working = self.data.as_document().clone();
        if let Some(identifier) = &identifier {
            // the identifier never changes once assigned, whatever the bag holds
            if identifier_of(&working).as_ref() != Some(identifier) {
                working.insert(ID_FIELD, identifier.clone());
            }
        }

        let mut validated = K::schema().validate(&working).map_err(|errors| {
            warn!(
                "rejected {} record {}: {}",
                K::collection_name(),
                identifier.as_deref().unwrap_or("<new>"),
                errors
            );
            DocumentStoreError::InvalidData(errors)
        })?;

        if let Some(id) = working.get(ID_FIELD).filter(|_| identifier.is_some()) {
            validated.insert(ID_FIELD, id.clone());
            self.data.insert(ID_FIELD, id.clone());
        }
        self.identifier = identifier;

        K::on_serialize(validated)
    }

    /// Builds a record from a stored document.
    ///
    /// Runs [`RecordType::on_deserialize`], then re-validates through the
    /// schema if `collection` normalizes on read.
    pub fn deserialize(raw: Document, collection: Option<&Collection<K>>) -> DocumentStoreResult<Self> {
        let mut document = K::on_deserialize(raw)?;

        if collection.is_some_and(|collection| collection.config().normalize_on_read()) {
            let id = document.get(ID_FIELD).cloned();
            document = K::schema().validate(&document)?;

            if let Some(id) = id {
                document.insert(ID_FIELD, id);
            }
        }

        Ok(Self::construct(document, true, collection.cloned()))
    }

    /// Stores the record through its bound collection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] with code `"no_collection"`
    /// when the record is not bound to a collection.
    pub async fn put(&mut self) -> DocumentStoreResult<()> {
        let collection = self
            .collection
            .clone()
            .ok_or(DocumentStoreError::Configuration(NO_COLLECTION))?;

        collection.put(self).await?;

        Ok(())
    }

    /// Alias for [`put`](Self::put).
    pub async fn save(&mut self) -> DocumentStoreResult<()> {
        self.put().await
    }

    pub fn data(&self) -> &AttributeBag {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut AttributeBag {
        &mut self.data
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Whether this record has been persisted or was read from the store.
    pub fn exists(&self) -> bool {
        self.loaded_from_store
    }

    pub fn is_loaded_from_store(&self) -> bool {
        self.loaded_from_store
    }

    pub fn collection(&self) -> Option<&Collection<K>> {
        self.collection.as_ref()
    }

    /// Decodes the record data into a typed struct.
    pub fn decode<T: DeserializeOwned>(&self) -> DocumentStoreResult<T> {
        self.data.decode()
    }

    /// Replaces the state of this record with what the store persisted.
    pub(crate) fn persisted(&mut self, document: Document, collection: Collection<K>) {
        if self.identifier.is_none() {
            self.identifier = identifier_of(&document);
        }

        self.data = document.into();
        self.collection = Some(collection);
        self.loaded_from_store = true;
    }
}

impl<K: RecordType> Clone for Record<K> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            identifier: self.identifier.clone(),
            collection: self.collection.clone(),
            loaded_from_store: self.loaded_from_store,
        }
    }
}

impl<K: RecordType> fmt::Debug for Record<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &K::collection_name())
            .field("identifier", &self.identifier)
            .field("loaded_from_store", &self.loaded_from_store)
            .field("collection", &self.collection.as_ref().map(|collection| collection.handle().name()))
            .field("data", &self.data)
            .finish()
    }
}
