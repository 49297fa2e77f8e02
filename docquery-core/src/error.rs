//! Error types and result types for document store operations.
//!
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//! Driver failures are carried through [`DocumentStoreError::Backend`] without
//! translation so callers can downcast to the driver's own error type.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use std::{error::Error as StdError, fmt};
use thiserror::Error;

/// Code reported when a query is invoked without any collection to run against.
pub const NO_COLLECTION: &str = "no_collection";

/// A single schema violation: the dotted path of the offending field and a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

/// Every violation found while validating one document, in the order the
/// schema reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(path, message));
    }

    /// Appends all violations of `other`, prefixing their paths with `prefix`.
    pub fn extend_nested(&mut self, prefix: &str, other: ValidationErrors) {
        self.0.extend(other.0.into_iter().map(|err| FieldError {
            path: format!("{prefix}.{}", err.path),
            message: err.message,
        }));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Returns the message reported for `path`, if any.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|err| err.path == path)
            .map(|err| err.message.as_str())
    }

    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|err| format!("{}: {}", err.path, err.message))
            .collect::<Vec<_>>()
            .join(", ");

        write!(f, "{joined}")
    }
}

impl IntoIterator for ValidationErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The operation could not be resolved against any collection. The payload is a
    /// stable code such as [`NO_COLLECTION`].
    #[error("Configuration error: {0}")]
    Configuration(&'static str),
    /// Schema validation rejected the data. Carries every violation, not just the first.
    #[error("Invalid data: {0}")]
    InvalidData(ValidationErrors),
    /// No document with the given identifier exists in the collection.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),
    /// Attribute-style access to a field that is not present.
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A filter could not be built or translated, for example an unknown
    /// `$` operator or an operator applied to a value it does not accept.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error raised by the underlying storage driver, passed through unchanged.
    #[error(transparent)]
    Backend(Box<dyn StdError + Send + Sync>),
}

impl DocumentStoreError {
    /// Wraps a driver error without translating it.
    pub fn backend(err: impl StdError + Send + Sync + 'static) -> Self {
        DocumentStoreError::Backend(Box::new(err))
    }

    /// Returns the validation failures if this is an [`DocumentStoreError::InvalidData`] error.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            DocumentStoreError::InvalidData(errors) => Some(errors),
            _ => None,
        }
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<ValidationErrors> for DocumentStoreError {
    fn from(errors: ValidationErrors) -> Self {
        DocumentStoreError::InvalidData(errors)
    }
}
