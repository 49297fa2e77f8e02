//! Schema validation for record data.
//!
//! A [`Schema`] takes a document and either returns the normalized document
//! or every violation it found. [`FieldSchema`] is the built-in implementation:
//! a list of typed fields with presence rules and validators, plus a policy
//! for keys the schema does not declare.
//!
//! ```ignore
//! let schema = FieldSchema::new()
//!     .field(SchemaField::string("password").validate(Validator::min_length(5)))
//!     .field(SchemaField::int("size").validate(Validator::min(0.0)))
//!     .field(SchemaField::datetime("expires_on").optional());
//! ```
//!
//! The reserved `_id` field is never validated; records re-attach it after
//! validation.

use bson::{Bson, Document};
use std::{fmt, sync::Arc};

use crate::{document::ID_FIELD, error::ValidationErrors};

/// Validates and normalizes a document.
pub trait Schema: Send + Sync + fmt::Debug {
    fn validate(&self, data: &Document) -> Result<Document, ValidationErrors>;
}

/// The type a field must have.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Any,
    String,
    /// 32 or 64 bit integers. Whole doubles are narrowed.
    Int,
    /// Doubles. Integers are widened.
    Float,
    Bool,
    DateTime,
    /// An embedded document validated by its own schema.
    Mapping(FieldSchema),
    /// An array whose elements all have the given kind.
    Sequence(Box<FieldKind>),
}

type CustomCheck = Arc<dyn Fn(&Bson) -> Result<(), String> + Send + Sync>;

/// A constraint checked after a value has the right kind.
#[derive(Clone)]
pub enum Validator {
    /// String length in characters, or array length.
    Length { min: Option<usize>, max: Option<usize> },
    /// Numeric bounds, inclusive.
    Range { min: Option<f64>, max: Option<f64> },
    OneOf(Vec<Bson>),
    Custom(CustomCheck),
}

impl Validator {
    /// Between `min` and `max` characters or elements, inclusive.
    pub fn length(min: usize, max: usize) -> Self {
        Validator::Length { min: Some(min), max: Some(max) }
    }

    pub fn min_length(min: usize) -> Self {
        Validator::Length { min: Some(min), max: None }
    }

    pub fn max_length(max: usize) -> Self {
        Validator::Length { min: None, max: Some(max) }
    }

    /// Between `min` and `max`, inclusive.
    pub fn range(min: f64, max: f64) -> Self {
        Validator::Range { min: Some(min), max: Some(max) }
    }

    pub fn min(min: f64) -> Self {
        Validator::Range { min: Some(min), max: None }
    }

    pub fn max(max: f64) -> Self {
        Validator::Range { min: None, max: Some(max) }
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Validator::OneOf(values.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&Bson) -> Result<(), String> + Send + Sync + 'static,
    {
        Validator::Custom(Arc::new(check))
    }

    fn check(&self, value: &Bson) -> Result<(), String> {
        match self {
            Validator::Length { min, max } => {
                let len = match value {
                    Bson::String(s) => s.chars().count(),
                    Bson::Array(items) => items.len(),
                    _ => return Ok(()),
                };

                if let Some(min) = min.filter(|min| len < *min) {
                    return Err(format!("Shorter than minimum length {min}"));
                }
                if let Some(max) = max.filter(|max| len > *max) {
                    return Err(format!("Longer than maximum length {max}"));
                }

                Ok(())
            }
            Validator::Range { min, max } => {
                let Some(number) = as_f64(value) else {
                    return Ok(());
                };

                if let Some(min) = min.filter(|min| number < *min) {
                    return Err(format!("{number} is less than minimum value {min}"));
                }
                if let Some(max) = max.filter(|max| number > *max) {
                    return Err(format!("{number} is greater than maximum value {max}"));
                }

                Ok(())
            }
            Validator::OneOf(choices) => {
                if choices.contains(value) {
                    return Ok(());
                }

                let choices = choices
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");

                Err(format!("{value} is not one of {choices}"))
            }
            Validator::Custom(check) => check(value),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Length { min, max } => f
                .debug_struct("Length")
                .field("min", min)
                .field("max", max)
                .finish(),
            Validator::Range { min, max } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .finish(),
            Validator::OneOf(choices) => f.debug_tuple("OneOf").field(choices).finish(),
            Validator::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
enum Presence {
    Required,
    Optional,
    Default(Bson),
}

/// One declared field. Fields are required unless marked otherwise; `null`
/// counts as missing.
#[derive(Debug, Clone)]
pub struct SchemaField {
    name: String,
    kind: FieldKind,
    presence: Presence,
    validators: Vec<Validator>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            presence: Presence::Required,
            validators: Vec::new(),
        }
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Any)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub fn mapping(name: impl Into<String>, schema: FieldSchema) -> Self {
        Self::new(name, FieldKind::Mapping(schema))
    }

    pub fn sequence(name: impl Into<String>, items: FieldKind) -> Self {
        Self::new(name, FieldKind::Sequence(Box::new(items)))
    }

    /// Missing values are left out of the validated document.
    pub fn optional(mut self) -> Self {
        self.presence = Presence::Optional;
        self
    }

    /// Missing values are replaced by `value`, which is not validated.
    pub fn default(mut self, value: impl Into<Bson>) -> Self {
        self.presence = Presence::Default(value.into());
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What to do with keys the schema does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownFields {
    /// Drop them from the validated document.
    #[default]
    Ignore,
    /// Copy them through unchanged.
    Preserve,
    /// Report each one as a violation.
    Raise,
}

/// A schema made of declared fields.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    fields: Vec<SchemaField>,
    unknown: UnknownFields,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn unknown(mut self, policy: UnknownFields) -> Self {
        self.unknown = policy;
        self
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    fn declares(&self, key: &str) -> bool {
        self.fields.iter().any(|field| field.name == key)
    }
}

impl Schema for FieldSchema {
    fn validate(&self, data: &Document) -> Result<Document, ValidationErrors> {
        let mut validated = Document::new();
        let mut errors = ValidationErrors::new();

        for field in &self.fields {
            let value = data
                .get(&field.name)
                .filter(|value| !matches!(value, Bson::Null));

            match (value, &field.presence) {
                (None, Presence::Required) => errors.push(&field.name, "Required"),
                (None, Presence::Optional) => {}
                (None, Presence::Default(default)) => {
                    validated.insert(&field.name, default.clone());
                }
                (Some(value), _) => {
                    if let Some(value) = check_field(field, value, &mut errors) {
                        validated.insert(&field.name, value);
                    }
                }
            }
        }

        for (key, value) in data {
            if key == ID_FIELD || self.declares(key) {
                continue;
            }

            match self.unknown {
                UnknownFields::Ignore => {}
                UnknownFields::Preserve => {
                    validated.insert(key, value.clone());
                }
                UnknownFields::Raise => errors.push(key, "Unrecognized key"),
            }
        }

        if errors.is_empty() { Ok(validated) } else { Err(errors) }
    }
}

fn check_field(field: &SchemaField, value: &Bson, errors: &mut ValidationErrors) -> Option<Bson> {
    let value = check_kind(&field.kind, &field.name, value, errors)?;

    let messages = field
        .validators
        .iter()
        .filter_map(|validator| validator.check(&value).err())
        .collect::<Vec<_>>();

    if !messages.is_empty() {
        errors.push(&field.name, messages.join("; "));
        return None;
    }

    Some(value)
}

fn check_kind(kind: &FieldKind, path: &str, value: &Bson, errors: &mut ValidationErrors) -> Option<Bson> {
    let normalized = match (kind, value) {
        (FieldKind::Any, _) => Some(value.clone()),
        (FieldKind::String, Bson::String(_)) => Some(value.clone()),
        (FieldKind::Int, Bson::Int32(_) | Bson::Int64(_)) => Some(value.clone()),
        // i64::MAX rounds up to 2^63 as a double, so the upper bound is exclusive
        (FieldKind::Int, Bson::Double(d)) if d.fract() == 0.0 && *d >= i64::MIN as f64 && *d < i64::MAX as f64 => {
            Some(Bson::Int64(*d as i64))
        }
        (FieldKind::Float, Bson::Double(_)) => Some(value.clone()),
        (FieldKind::Float, Bson::Int32(i)) => Some(Bson::Double(f64::from(*i))),
        (FieldKind::Float, Bson::Int64(i)) => Some(Bson::Double(*i as f64)),
        (FieldKind::Bool, Bson::Boolean(_)) => Some(value.clone()),
        (FieldKind::DateTime, Bson::DateTime(_)) => Some(value.clone()),
        (FieldKind::Mapping(schema), Bson::Document(document)) => {
            return match schema.validate(document) {
                Ok(validated) => Some(Bson::Document(validated)),
                Err(nested) => {
                    errors.extend_nested(path, nested);
                    None
                }
            };
        }
        (FieldKind::Sequence(items), Bson::Array(values)) => {
            let before = errors.len();
            let checked = values
                .iter()
                .enumerate()
                .filter_map(|(index, item)| check_kind(items, &format!("{path}.{index}"), item, errors))
                .collect::<Vec<_>>();

            return (errors.len() == before).then_some(Bson::Array(checked));
        }
        _ => None,
    };

    if normalized.is_none() {
        errors.push(path, kind_mismatch(kind, value));
    }

    normalized
}

fn kind_mismatch(kind: &FieldKind, value: &Bson) -> String {
    match kind {
        FieldKind::Any => String::new(),
        FieldKind::String => format!("{value} is not a string"),
        FieldKind::Int => format!("{value} is not an integer"),
        FieldKind::Float => format!("{value} is not a number"),
        FieldKind::Bool => format!("{value} is not a boolean"),
        FieldKind::DateTime => "Invalid date".to_string(),
        FieldKind::Mapping(_) => format!("{value} is not a mapping type"),
        FieldKind::Sequence(_) => format!("{value} is not iterable"),
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}
