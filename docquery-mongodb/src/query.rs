//! Filter translation from docquery expressions to MongoDB query syntax.

use bson::{Document, Bson, doc};

use docquery_core::{
    filter::{QueryVisitor, Expr, FieldOp},
    error::DocumentStoreError,
};

/// Translates filter expressions into MongoDB query documents.
///
/// String operators are case-sensitive and match the value literally, as the
/// in-memory backend does.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an optional filter. No filter matches everything.
    pub fn translate(filter: Option<&Expr>) -> Result<Document, DocumentStoreError> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }

    fn visit_all(&mut self, exprs: &[Expr]) -> Result<Vec<Document>, DocumentStoreError> {
        exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect()
    }
}

fn escape_regex(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        if "\\^$.|?*+()[]{}/-".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

/// `Contains` operand: substring for strings, every element for arrays,
/// one element otherwise.
fn contains(value: &Bson) -> Document {
    match value {
        Bson::String(s) => doc! { "$regex": escape_regex(s) },
        Bson::Array(arr) => doc! { "$all": arr },
        other => doc! { "$elemMatch": { "$eq": other } },
    }
}

fn operator_error(message: &str) -> DocumentStoreError {
    DocumentStoreError::InvalidFilter(message.to_string())
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! { "$and": self.visit_all(exprs)? })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            // matches nothing
            return Ok(doc! { "$nor": [{}] });
        }

        Ok(doc! { "$or": self.visit_all(exprs)? })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => contains(value),
                FieldOp::NotContains => doc! { "$not": contains(value) },
                FieldOp::StartsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("^{}", escape_regex(s)) },
                    _ => return Err(operator_error("StartsWith operator requires a string value")),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("{}$", escape_regex(s)) },
                    _ => return Err(operator_error("EndsWith operator requires a string value")),
                },
                FieldOp::AnyOf => match value {
                    Bson::Array(arr) => doc! { "$in": arr },
                    other => doc! { "$in": [other] },
                },
                FieldOp::NoneOf => match value {
                    Bson::Array(arr) => doc! { "$nin": arr },
                    other => doc! { "$nin": [other] },
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docquery_core::filter::Filter;

    fn translate(expr: Expr) -> Document {
        MongoQueryTranslator::translate(Some(&expr)).unwrap()
    }

    #[test]
    fn matching_documents_become_and_of_equalities() {
        assert_eq!(
            translate(Filter::matching(doc! { "c": 1, "a": 2 }).unwrap()),
            doc! { "$and": [{ "c": { "$eq": 1 } }, { "a": { "$eq": 2 } }] }
        );
        assert_eq!(translate(Filter::and([])), doc! {});
        assert_eq!(MongoQueryTranslator::translate(None).unwrap(), doc! {});
    }

    #[test]
    fn negation_uses_nor() {
        assert_eq!(
            translate(Filter::eq("a", 1).not()),
            doc! { "$nor": [{ "a": { "$eq": 1 } }] }
        );
    }

    #[test]
    fn string_operators_are_escaped() {
        assert_eq!(
            translate(Filter::starts_with("name", "a.b")),
            doc! { "name": { "$regex": "^a\\.b" } }
        );
        assert!(matches!(
            MongoQueryTranslator::translate(Some(&Filter::ends_with("size", 3))),
            Err(DocumentStoreError::InvalidFilter(_))
        ));
    }

    #[test]
    fn not_contains_negates_contains() {
        assert_eq!(
            translate(Filter::contains("tags", vec!["a", "b"])),
            doc! { "tags": { "$all": ["a", "b"] } }
        );
        assert_eq!(
            translate(Filter::not_contains("tags", vec!["a", "b"])),
            doc! { "tags": { "$not": { "$all": ["a", "b"] } } }
        );
        assert_eq!(
            translate(Filter::not_contains("tags", 3)),
            doc! { "tags": { "$not": { "$elemMatch": { "$eq": 3 } } } }
        );
    }

    #[test]
    fn membership_accepts_single_values() {
        assert_eq!(
            translate(Filter::any_of("state", "open")),
            doc! { "state": { "$in": ["open"] } }
        );
    }
}
