//! Filter expressions passed through to the store.
//!
//! This layer does not interpret filters. An [`Expr`] tree is handed to the
//! backend as-is and each backend walks it with a [`QueryVisitor`], either
//! evaluating it (in memory) or translating it to the driver's query syntax.
//!
//! Field names may use dotted paths (`"sender.email"`) to reach into embedded
//! documents.
//!
//! ```ignore
//! use docquery::filter::Filter;
//!
//! let expr = Filter::eq("c", 1).and(Filter::gte("a", 2));
//! let same = Filter::matching(doc! { "c": 1, "a": { "$gte": 2 } })?;
//! ```

use bson::{Bson, Document, oid::ObjectId};

use crate::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Field comparison operators.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// String contains substring, or array contains the element (every
    /// element when the operand is itself an array).
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    /// Field value (or any of its elements) is one of the given values.
    AnyOf,
    /// Field value (and each of its elements) is none of the given values.
    NoneOf,
}

/// A filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// All sub-expressions must match. An empty list matches everything.
    And(Vec<Expr>),
    /// Any sub-expression must match.
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// The field is present (`true`) or absent (`false`).
    Exists(String, bool),
    Field {
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Expr {
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines with `other` under AND, flattening into an existing AND list.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines with `other` under OR, flattening into an existing OR list.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// Constructors for filter expressions.
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }

    /// Matches the document whose identifier reads as `identifier`.
    ///
    /// Identifiers are opaque strings, but a stored `_id` may be an object id
    /// or an integer. Every stored form the string can stand for matches.
    pub fn identifier(identifier: &str) -> Expr {
        let mut forms = vec![Bson::String(identifier.to_string())];

        if let Ok(oid) = ObjectId::parse_str(identifier) {
            forms.push(Bson::ObjectId(oid));
        }
        if let Ok(number) = identifier.parse::<i64>() {
            forms.push(Bson::Int64(number));
        }

        match forms.len() {
            1 => Filter::eq(ID_FIELD, identifier),
            _ => Filter::any_of(ID_FIELD, forms),
        }
    }

    /// Turns a MongoDB-style constraint document into an AND of constraints,
    /// preserving field order.
    ///
    /// A plain `field: value` pair is an equality. A value that is a document
    /// of `$` operators (`$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
    /// `$nin`, `$exists`, `$not`) constrains the field with each of them.
    /// Top-level `$and`, `$or` and `$nor` take lists of constraint documents.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidFilter`] for unknown operators, operator
    /// documents mixed with plain keys, and operands of the wrong shape.
    pub fn matching(document: Document) -> DocumentStoreResult<Expr> {
        document
            .into_iter()
            .map(|(key, value)| match key.as_str() {
                "$and" => Ok(Expr::And(constraint_list(&key, value)?)),
                "$or" => Ok(Expr::Or(constraint_list(&key, value)?)),
                "$nor" => Ok(Expr::Or(constraint_list(&key, value)?).not()),
                op if op.starts_with('$') => Err(invalid_filter(format!("unknown top-level operator {op}"))),
                _ => field_constraint(key, value),
            })
            .collect::<DocumentStoreResult<Vec<_>>>()
            .map(Expr::And)
    }
}

fn invalid_filter(message: String) -> DocumentStoreError {
    DocumentStoreError::InvalidFilter(message)
}

fn constraint_list(op: &str, value: Bson) -> DocumentStoreResult<Vec<Expr>> {
    let Bson::Array(items) = value else {
        return Err(invalid_filter(format!("{op} needs a list of documents")));
    };

    items
        .into_iter()
        .map(|item| match item {
            Bson::Document(document) => Filter::matching(document),
            other => Err(invalid_filter(format!("{op} needs a list of documents, got {other}"))),
        })
        .collect()
}

fn starts_with_operator(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn field_constraint(field: String, value: Bson) -> DocumentStoreResult<Expr> {
    let operators = match value {
        Bson::Document(operators) if starts_with_operator(&operators) => operators,
        value => return Ok(Expr::field(field, FieldOp::Eq, value)),
    };

    let mut constraints = operators
        .into_iter()
        .map(|(op, operand)| operator_constraint(&field, &op, operand))
        .collect::<DocumentStoreResult<Vec<_>>>()?;

    Ok(match constraints.len() {
        1 => constraints.remove(0),
        _ => Expr::And(constraints),
    })
}

fn operator_constraint(field: &str, op: &str, operand: Bson) -> DocumentStoreResult<Expr> {
    let field_op = match op {
        "$eq" => FieldOp::Eq,
        "$ne" => FieldOp::Ne,
        "$gt" => FieldOp::Gt,
        "$gte" => FieldOp::Gte,
        "$lt" => FieldOp::Lt,
        "$lte" => FieldOp::Lte,
        "$in" | "$nin" => {
            if !matches!(operand, Bson::Array(_)) {
                return Err(invalid_filter(format!("{op} on {field} needs a list, got {operand}")));
            }
            if op == "$in" { FieldOp::AnyOf } else { FieldOp::NoneOf }
        }
        "$exists" => {
            let should_exist = match operand {
                Bson::Boolean(flag) => flag,
                Bson::Int32(n) => n != 0,
                Bson::Int64(n) => n != 0,
                Bson::Double(n) => n != 0.0,
                other => return Err(invalid_filter(format!("$exists on {field} needs a boolean, got {other}"))),
            };
            return Ok(Expr::Exists(field.to_string(), should_exist));
        }
        "$not" => {
            if !matches!(&operand, Bson::Document(document) if starts_with_operator(document)) {
                return Err(invalid_filter(format!("$not on {field} needs an operator document")));
            }
            return Ok(field_constraint(field.to_string(), operand)?.not());
        }
        other if other.starts_with('$') => {
            return Err(invalid_filter(format!("unknown operator {other} on {field}")));
        }
        other => {
            return Err(invalid_filter(format!("{field} mixes operators with the plain key {other}")));
        }
    };

    Ok(Expr::field(field.to_string(), field_op, operand))
}

/// Walks an [`Expr`] tree. Backends implement this to evaluate or translate filters.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn and_flattens_into_existing_list() {
        let expr = Filter::eq("a", 1).and(Filter::eq("b", 2)).and(Filter::eq("c", 3));

        match expr {
            Expr::And(list) => assert_eq!(list.len(), 3),
            other => panic!("unexpected expression {other:?}"),
        }
    }

    #[test]
    fn matching_keeps_field_order() {
        let expr = Filter::matching(doc! { "c": 1, "a": 2 }).unwrap();

        assert_eq!(expr, Filter::and([Filter::eq("c", 1), Filter::eq("a", 2)]));
    }

    #[test]
    fn matching_maps_operator_documents() {
        let expr = Filter::matching(doc! {
            "a": { "$gt": 1, "$lte": 5 },
            "tags": { "$in": ["x", "y"] },
            "b": { "$exists": false },
            "c": { "$not": { "$eq": 3 } },
        })
        .unwrap();

        assert_eq!(
            expr,
            Filter::and([
                Filter::and([Filter::gt("a", 1), Filter::lte("a", 5)]),
                Filter::any_of("tags", vec!["x", "y"]),
                Filter::not_exists("b"),
                Filter::eq("c", 3).not(),
            ])
        );
    }

    #[test]
    fn matching_treats_plain_subdocuments_as_values() {
        let expr = Filter::matching(doc! { "sender": { "email": "foo@example.org" } }).unwrap();

        assert_eq!(expr, Filter::and([Filter::eq("sender", doc! { "email": "foo@example.org" })]));
    }

    #[test]
    fn matching_combines_top_level_lists() {
        let expr = Filter::matching(doc! { "$or": [{ "a": 1 }, { "b": { "$ne": 2 } }] }).unwrap();

        assert_eq!(
            expr,
            Filter::and([Filter::or([
                Filter::and([Filter::eq("a", 1)]),
                Filter::and([Filter::ne("b", 2)]),
            ])])
        );
    }

    #[test]
    fn matching_rejects_unknown_operators() {
        for constraints in [
            doc! { "a": { "$regex": "x" } },
            doc! { "a": { "$gt": 1, "b": 2 } },
            doc! { "a": { "$in": 1 } },
            doc! { "$where": "true" },
        ] {
            match Filter::matching(constraints) {
                Err(DocumentStoreError::InvalidFilter(_)) => {}
                other => panic!("unexpected result {other:?}"),
            }
        }
    }

    #[test]
    fn identifier_covers_every_stored_form() {
        assert_eq!(Filter::identifier("abc"), Filter::eq("_id", "abc"));

        let oid = ObjectId::new();
        assert_eq!(
            Filter::identifier(&oid.to_hex()),
            Filter::any_of("_id", vec![Bson::String(oid.to_hex()), Bson::ObjectId(oid)])
        );
        assert_eq!(
            Filter::identifier("42"),
            Filter::any_of("_id", vec![Bson::String("42".into()), Bson::Int64(42)])
        );
    }
}
