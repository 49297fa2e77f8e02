//! Deferred, composable queries.
//!
//! A [`Query`] describes a find without touching the store: filter, sort keys,
//! skip, limit, field projection, the transform applied to each result and,
//! optionally, the collection it should run against. Builder calls consume the
//! query and return the updated value, so a query can be cloned and extended
//! in different directions without aliasing.
//!
//! Invoking a query is the only step that does I/O. It opens a cursor and
//! returns a [`QueryResult`] that materializes documents on demand.
//!
//! ```ignore
//! use docquery::prelude::*;
//!
//! let query = Query::matching(doc! { "c": 1 })
//!     .sort("a", SortDirection::Desc)
//!     .limit(10);
//!
//! let mut result = query.invoke_on(&store.collection("test")).await?;
//! while let Some(doc) = result.next().await {
//!     println!("{:?}", doc?);
//! }
//! ```
//!
//! # Transforms
//!
//! Each raw document is turned into the query's output type by one of:
//!
//! 1. a type registered with [`Query::as_type`] (any [`FromDocument`] type),
//! 2. a function registered with [`Query::call`] or [`Query::call_with`],
//! 3. otherwise the raw [`Document`] itself.
//!
//! When both a type and a function are registered the type wins.

use bson::Document;
use log::debug;
use std::{any::Any, fmt, sync::Arc};

use crate::{
    document::{FromDocument, ID_FIELD},
    error::{DocumentStoreError, DocumentStoreResult, NO_COLLECTION},
    filter::{Expr, Filter},
    result::QueryResult,
    store::CollectionHandle,
};

/// Code reported when a query produces a type it has no transform for.
pub const NO_TRANSFORM: &str = "no_transform";

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Accepts MongoDB-style directions: negative numbers sort descending,
/// everything else ascending.
impl From<i32> for SortDirection {
    fn from(direction: i32) -> Self {
        if direction < 0 { SortDirection::Desc } else { SortDirection::Asc }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// The store-level description of a find, as handed to a backend.
///
/// Backends apply `sort`, then `skip`, then `limit`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub filter: Option<Expr>,
    /// Fields to return. `_id` is always included.
    pub projection: Option<Vec<String>>,
    /// Sort keys, most significant first.
    pub sort: Vec<Sort>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

pub(crate) type Transform<T> = Arc<dyn Fn(Document) -> DocumentStoreResult<T> + Send + Sync>;

/// An unexecuted find.
///
/// `T` is the type every result is materialized into; it starts out as
/// [`Document`] and changes when a transform is registered.
pub struct Query<T = Document> {
    filter: Option<Expr>,
    sort: Vec<Sort>,
    limit: Option<u64>,
    skip: Option<u64>,
    projection: Option<Vec<String>>,
    complete: bool,
    collection: Option<CollectionHandle>,
    cls: Option<Transform<T>>,
    func: Option<Transform<T>>,
    /// Why the constraints given to [`Query::matching`] could not be turned
    /// into a filter. Reported when the query is invoked.
    filter_error: Option<String>,
}

impl Query<Document> {
    /// Creates a query matching every document.
    pub fn new() -> Self {
        Query {
            filter: None,
            sort: Vec::new(),
            limit: None,
            skip: None,
            projection: None,
            complete: true,
            collection: None,
            cls: None,
            func: None,
            filter_error: None,
        }
    }

    /// Creates a query with an initial filter.
    pub fn filter(filter: Expr) -> Self {
        Self::new().and_filter(filter)
    }

    /// Creates a query from MongoDB-style constraints: plain `field: value`
    /// equalities and `$` operator documents (see [`Filter::matching`]).
    ///
    /// Malformed constraints surface as [`DocumentStoreError::InvalidFilter`]
    /// when the query is invoked.
    pub fn matching(constraints: Document) -> Self {
        Self::try_matching(constraints).unwrap_or_else(|err| {
            let message = match err {
                DocumentStoreError::InvalidFilter(message) => message,
                other => other.to_string(),
            };

            Self { filter_error: Some(message), ..Self::new() }
        })
    }

    /// Like [`matching`](Self::matching), but reports malformed constraints
    /// right away.
    pub fn try_matching(constraints: Document) -> DocumentStoreResult<Self> {
        if constraints.is_empty() {
            return Ok(Self::new());
        }

        Ok(Self::filter(Filter::matching(constraints)?))
    }
}

impl Default for Query<Document> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Query<T> {
    /// Narrows the filter: the query matches documents satisfying both the
    /// existing filter and `filter`.
    pub fn and_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Appends a sort key. Earlier keys are more significant.
    ///
    /// `direction` accepts a [`SortDirection`] or a MongoDB-style `1` / `-1`.
    pub fn sort(mut self, field: impl Into<String>, direction: impl Into<SortDirection>) -> Self {
        self.sort.push(Sort { field: field.into(), direction: direction.into() });
        self
    }

    /// Appends an ascending sort key.
    pub fn sort_asc(self, field: impl Into<String>) -> Self {
        self.sort(field, SortDirection::Asc)
    }

    /// Appends a descending sort key.
    pub fn sort_desc(self, field: impl Into<String>) -> Self {
        self.sort(field, SortDirection::Desc)
    }

    /// Caps the number of returned documents. A limit of zero means no limit.
    pub fn limit(mut self, count: u64) -> Self {
        self.limit = (count > 0).then_some(count);
        self
    }

    /// Skips the first `count` matching documents.
    pub fn skip(mut self, count: u64) -> Self {
        self.skip = Some(count);
        self
    }

    /// Restricts the returned fields. Results of a projected query are never
    /// complete, whatever fields were chosen.
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self.complete = false;
        self
    }

    /// Materializes every result as `U` through [`FromDocument`].
    ///
    /// A function transform registered earlier is kept only if it already
    /// produces `U`; either way this type transform takes priority over it.
    pub fn as_type<U: FromDocument>(self) -> Query<U> {
        let cls: Transform<U> = Arc::new(U::from_document);
        let func = retype::<T, U>(self.func);

        Query {
            filter: self.filter,
            sort: self.sort,
            limit: self.limit,
            skip: self.skip,
            projection: self.projection,
            complete: self.complete,
            collection: self.collection,
            cls: Some(cls),
            func,
            filter_error: self.filter_error,
        }
    }

    /// Materializes every result through `function`.
    ///
    /// A type transform registered earlier is kept if it already produces
    /// `U`, and still takes priority over `function`.
    pub fn call<U, F>(self, function: F) -> Query<U>
    where
        U: Send + 'static,
        F: Fn(Document) -> DocumentStoreResult<U> + Send + Sync + 'static,
    {
        let func: Transform<U> = Arc::new(function);
        let cls = retype::<T, U>(self.cls);

        Query {
            filter: self.filter,
            sort: self.sort,
            limit: self.limit,
            skip: self.skip,
            projection: self.projection,
            complete: self.complete,
            collection: self.collection,
            cls,
            func: Some(func),
            filter_error: self.filter_error,
        }
    }

    /// Like [`call`](Self::call), with `args` bound as the function's second argument.
    pub fn call_with<U, A, F>(self, function: F, args: A) -> Query<U>
    where
        U: Send + 'static,
        A: Send + Sync + 'static,
        F: Fn(Document, &A) -> DocumentStoreResult<U> + Send + Sync + 'static,
    {
        self.call(move |document| function(document, &args))
    }

    /// Binds the query to a collection so it can be invoked without one.
    pub fn bind_collection(mut self, collection: CollectionHandle) -> Self {
        self.collection = Some(collection);
        self
    }

    /// Whether results of this query are full documents.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns the bound collection, if any.
    pub fn collection(&self) -> Option<&CollectionHandle> {
        self.collection.as_ref()
    }

    pub fn filter_expr(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    pub fn limit_count(&self) -> Option<u64> {
        self.limit
    }

    pub fn skip_count(&self) -> Option<u64> {
        self.skip
    }

    /// Returns the find this query sends to the store.
    pub fn find_spec(&self) -> FindSpec {
        FindSpec {
            filter: self.filter.clone(),
            projection: self.projection.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            limit: self.limit,
        }
    }

    /// Runs the query.
    ///
    /// `collection` takes precedence over a bound collection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] with code `"no_collection"` when
    /// neither is available, and [`DocumentStoreError::InvalidFilter`] when the
    /// query was built from malformed constraints. Backend failures are
    /// returned unchanged.
    pub async fn invoke(
        &self,
        collection: Option<&CollectionHandle>,
    ) -> DocumentStoreResult<QueryResult<T>> {
        if let Some(message) = &self.filter_error {
            return Err(DocumentStoreError::InvalidFilter(message.clone()));
        }

        let collection = collection
            .or(self.collection.as_ref())
            .ok_or(DocumentStoreError::Configuration(NO_COLLECTION))?
            .clone();
        let spec = self.find_spec();

        debug!("find on {}: {:?}", collection.name(), spec);

        let cursor = collection.find(&spec).await?;

        Ok(QueryResult::new(cursor, self.clone(), collection))
    }

    /// Runs the query against `collection`.
    pub async fn invoke_on(&self, collection: &CollectionHandle) -> DocumentStoreResult<QueryResult<T>> {
        self.invoke(Some(collection)).await
    }

    /// Runs the query against its bound collection.
    pub async fn run(&self) -> DocumentStoreResult<QueryResult<T>> {
        self.invoke(None).await
    }

    /// Applies the active transform to one raw document.
    pub(crate) fn materialize(&self, document: Document) -> DocumentStoreResult<T> {
        if let Some(cls) = &self.cls {
            return cls(document);
        }
        if let Some(func) = &self.func {
            return func(document);
        }

        passthrough(document)
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Query {
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            limit: self.limit,
            skip: self.skip,
            projection: self.projection.clone(),
            complete: self.complete,
            collection: self.collection.clone(),
            cls: self.cls.clone(),
            func: self.func.clone(),
            filter_error: self.filter_error.clone(),
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .field("limit", &self.limit)
            .field("skip", &self.skip)
            .field("projection", &self.projection)
            .field("complete", &self.complete)
            .field("collection", &self.collection.as_ref().map(CollectionHandle::name))
            .field("cls", &self.cls.is_some())
            .field("func", &self.func.is_some())
            .field("filter_error", &self.filter_error)
            .finish()
    }
}

/// Keeps a transform across an output type change only when the type is unchanged.
fn retype<T: 'static, U: 'static>(transform: Option<Transform<T>>) -> Option<Transform<U>> {
    let transform: Box<dyn Any> = Box::new(transform?);

    transform
        .downcast::<Transform<U>>()
        .ok()
        .map(|transform| *transform)
}

fn passthrough<T: 'static>(document: Document) -> DocumentStoreResult<T> {
    let document: Box<dyn Any> = Box::new(document);

    document
        .downcast::<T>()
        .map(|document| *document)
        .map_err(|_| DocumentStoreError::Configuration(NO_TRANSFORM))
}

/// Projection helper shared by backends: keeps `_id` plus the listed fields.
pub fn project_document(document: &Document, fields: &[String]) -> Document {
    document
        .iter()
        .filter(|(key, _)| key.as_str() == ID_FIELD || fields.iter().any(|field| field == *key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[derive(Debug, PartialEq)]
    struct Tagged(&'static str);

    impl FromDocument for Tagged {
        fn from_document(_document: Document) -> DocumentStoreResult<Self> {
            Ok(Tagged("type"))
        }
    }

    #[test]
    fn projection_marks_query_incomplete() {
        let query = Query::new();
        assert!(query.is_complete());

        let query = query.project(["b"]);
        assert!(!query.is_complete());

        let query = Query::new().project(Vec::<String>::new());
        assert!(!query.is_complete());
    }

    #[test]
    fn builder_calls_accumulate_into_the_find_spec() {
        let spec = Query::matching(doc! { "c": 1 })
            .sort("a", 1)
            .sort("b", -1)
            .limit(2)
            .skip(1)
            .project(["a"])
            .find_spec();

        assert_eq!(spec.filter, Some(Filter::and([Filter::eq("c", 1)])));
        assert_eq!(spec.sort, vec![
            Sort { field: "a".into(), direction: SortDirection::Asc },
            Sort { field: "b".into(), direction: SortDirection::Desc },
        ]);
        assert_eq!(spec.limit, Some(2));
        assert_eq!(spec.skip, Some(1));
        assert_eq!(spec.projection, Some(vec!["a".to_string()]));
    }

    #[test]
    fn extending_a_clone_leaves_the_original_untouched() {
        let base = Query::matching(doc! { "c": 1 });
        let narrowed = base.clone().and_filter(Filter::eq("a", 2)).limit(1);

        assert_eq!(base.limit_count(), None);
        assert_eq!(base.filter_expr(), Some(&Filter::and([Filter::eq("c", 1)])));
        assert_ne!(base.filter_expr(), narrowed.filter_expr());
    }

    #[test]
    fn single_argument_sorts_name_their_direction() {
        let spec = Query::new().sort_asc("a").sort_desc("b").find_spec();

        assert_eq!(spec.sort, Query::new().sort("a", 1).sort("b", -1).find_spec().sort);
    }

    #[test]
    fn matching_understands_operator_documents() {
        let query = Query::matching(doc! { "a": { "$gt": 1 } });

        assert_eq!(query.filter_expr(), Some(&Filter::and([Filter::gt("a", 1)])));
        assert!(Query::try_matching(doc! { "a": { "$near": 1 } }).is_err());
    }

    #[tokio::test]
    async fn malformed_constraints_fail_on_invocation() {
        let query = Query::matching(doc! { "a": { "$near": [0, 0] } }).limit(1);

        match query.run().await.unwrap_err() {
            DocumentStoreError::InvalidFilter(message) => assert!(message.contains("$near")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn zero_limit_means_unlimited() {
        assert_eq!(Query::new().limit(0).limit_count(), None);
    }

    #[test]
    fn type_transform_wins_over_function_in_either_order() {
        let function_first = Query::new()
            .call(|_| Ok(Tagged("function")))
            .as_type::<Tagged>();
        let type_first = Query::new()
            .as_type::<Tagged>()
            .call(|_| Ok(Tagged("function")));

        assert_eq!(function_first.materialize(doc! {}).unwrap(), Tagged("type"));
        assert_eq!(type_first.materialize(doc! {}).unwrap(), Tagged("type"));
    }

    #[test]
    fn function_transform_receives_bound_arguments() {
        let query = Query::new().call_with(
            |document, prefix: &String| Ok(format!("{prefix}{}", document.get_i32("a").unwrap())),
            "a=".to_string(),
        );

        assert_eq!(query.materialize(doc! { "a": 7 }).unwrap(), "a=7");
    }

    #[test]
    fn raw_documents_pass_through_without_transform() {
        let query = Query::new();

        assert_eq!(query.materialize(doc! { "a": 1 }).unwrap(), doc! { "a": 1 });
    }

    #[test]
    fn projection_keeps_identifier() {
        let document = doc! { "_id": "x", "a": 1, "b": 2 };

        assert_eq!(project_document(&document, &["b".to_string()]), doc! { "_id": "x", "b": 2 });
    }

    #[tokio::test]
    async fn invoking_without_collection_fails() {
        let err = Query::matching(doc! { "a": 1 }).run().await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::Configuration(code) if code == NO_COLLECTION));
    }
}
