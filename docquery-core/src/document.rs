//! Field data containers and document conversion.
//!
//! [`AttributeBag`] is the value holder behind every record: an ordered BSON
//! document that can be read by key (through `Deref<Target = Document>`) or by
//! attribute name, where a missing attribute is an error rather than a default.
//!
//! [`FromDocument`] is the conversion used by typed query results. It is
//! implemented for every `serde` deserializable type, so plain structs can be
//! used as query result types without extra code.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::ops::{Deref, DerefMut};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the reserved identifier field every stored document carries.
pub const ID_FIELD: &str = "_id";

/// Conversion from a raw stored document into a domain value.
///
/// # Example
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct Point { x: i32, y: i32 }
///
/// let point = Point::from_document(doc! { "x": 1, "y": 2 })?;
/// ```
pub trait FromDocument: Sized + Send + 'static {
    fn from_document(document: Document) -> DocumentStoreResult<Self>;
}

impl<T: DeserializeOwned + Send + 'static> FromDocument for T {
    fn from_document(document: Document) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }
}

/// Ordered field data with both key-based and attribute-based access.
///
/// Key access comes from the wrapped [`bson::Document`]; attribute access goes
/// through [`AttributeBag::attr`] and friends. Both views always agree since they
/// read the same map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeBag(Document);

impl AttributeBag {
    pub fn new() -> Self {
        Self(Document::new())
    }

    /// Returns the value stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::AttributeNotFound`] when the field is absent.
    pub fn attr(&self, name: &str) -> DocumentStoreResult<&Bson> {
        self.0
            .get(name)
            .ok_or_else(|| DocumentStoreError::AttributeNotFound(name.to_string()))
    }

    /// Returns the value stored under `name`, decoded into `T`.
    pub fn attr_as<T: DeserializeOwned>(&self, name: &str) -> DocumentStoreResult<T> {
        Ok(deserialize_from_bson(self.attr(name)?.clone())?)
    }

    /// Stores `value` under `name`, returning the previous value if there was one.
    pub fn set_attr(&mut self, name: &str, value: impl Into<Bson>) -> Option<Bson> {
        self.0.insert(name, value)
    }

    /// Removes `name` from the bag.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::AttributeNotFound`] when the field is absent.
    pub fn remove_attr(&mut self, name: &str) -> DocumentStoreResult<Bson> {
        self.0
            .remove(name)
            .ok_or_else(|| DocumentStoreError::AttributeNotFound(name.to_string()))
    }

    /// Builds a bag from any serializable struct.
    pub fn encode<T: Serialize>(value: &T) -> DocumentStoreResult<Self> {
        match serialize_to_bson(value)? {
            Bson::Document(document) => Ok(Self(document)),
            other => Err(DocumentStoreError::Serialization(format!(
                "expected a document, got {:?}",
                other.element_type()
            ))),
        }
    }

    /// Decodes the whole bag into a typed struct.
    pub fn decode<T: DeserializeOwned>(&self) -> DocumentStoreResult<T> {
        Ok(deserialize_from_bson(Bson::Document(self.0.clone()))?)
    }

    /// Renders the bag as JSON.
    pub fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(serde_json::to_value(&self.0)?)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

impl Deref for AttributeBag {
    type Target = Document;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AttributeBag {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Document> for AttributeBag {
    fn from(document: Document) -> Self {
        Self(document)
    }
}

impl From<AttributeBag> for Document {
    fn from(bag: AttributeBag) -> Self {
        bag.0
    }
}

/// Reads the identifier out of a document as an opaque string.
///
/// String identifiers are returned verbatim, object ids as their hex form,
/// integers in decimal and anything else through its BSON display form.
/// [`Filter::identifier`](crate::filter::Filter::identifier) maps such a
/// string back onto every stored form it can stand for.
pub fn identifier_of(document: &Document) -> Option<String> {
    match document.get(ID_FIELD)? {
        Bson::Null => None,
        Bson::String(id) => Some(id.clone()),
        Bson::ObjectId(id) => Some(id.to_hex()),
        Bson::Int32(id) => Some(id.to_string()),
        Bson::Int64(id) => Some(id.to_string()),
        other => Some(other.to_string()),
    }
}
