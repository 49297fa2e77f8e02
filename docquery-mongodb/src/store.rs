use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use bson::{Bson, Document, doc, oid::ObjectId};
use log::debug;
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, FindOptions},
};
use docquery_core::{
    backend::{DocumentCursor, StoreBackend, StoreBackendBuilder},
    document::{ID_FIELD, identifier_of},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Expr,
    query::{FindSpec, SortDirection},
};

use crate::query::MongoQueryTranslator;

/// A [`StoreBackend`] over one MongoDB database.
///
/// Documents stored without an `_id` get a fresh object id in hex string
/// form, so identifiers stay opaque strings on the way back.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    fn find_options(spec: &FindSpec) -> FindOptions {
        let mut options = FindOptions::default();

        // a negative limit asks the server for a single batch; larger limits are no limit at all
        options.limit = spec.limit.and_then(|limit| i64::try_from(limit).ok());
        options.skip = spec.skip;

        if !spec.sort.is_empty() {
            options.sort = Some(
                spec.sort
                    .iter()
                    .map(|sort| (sort.field.clone(), Bson::Int32(match sort.direction {
                        SortDirection::Asc => 1,
                        SortDirection::Desc => -1,
                    })))
                    .collect(),
            );
        }
        if let Some(fields) = &spec.projection {
            options.projection = Some(
                fields
                    .iter()
                    .map(|field| (field.clone(), Bson::Int32(1)))
                    .collect(),
            );
        }

        options
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find(&self, collection: &str, spec: &FindSpec) -> DocumentStoreResult<DocumentCursor> {
        let filter = MongoQueryTranslator::translate(spec.filter.as_ref())?;

        debug!("mongodb find on {}: {}", collection, filter);

        Ok(
            self.get_collection(collection)
                .find(filter)
                .with_options(Self::find_options(spec))
                .await
                .map_err(DocumentStoreError::backend)?
                .map_err(DocumentStoreError::backend)
                .boxed()
        )
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::translate(filter)?)
            .await
            .map_err(DocumentStoreError::backend)
    }

    async fn find_one(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(MongoQueryTranslator::translate(Some(filter))?)
            .await
            .map_err(DocumentStoreError::backend)
    }

    async fn insert_or_replace(&self, collection: &str, mut document: Document) -> DocumentStoreResult<Document> {
        if identifier_of(&document).is_none() {
            document.insert(ID_FIELD, ObjectId::new().to_hex());
        }

        let id = document.get(ID_FIELD).cloned().unwrap_or(Bson::Null);

        self.get_collection(collection)
            .replace_one(doc! { ID_FIELD: id }, &document)
            .upsert(true)
            .await
            .map_err(DocumentStoreError::backend)?;

        Ok(document)
    }

    async fn remove(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .delete_many(MongoQueryTranslator::translate(Some(filter))?)
            .await
            .map_err(DocumentStoreError::backend)?;

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(DocumentStoreError::backend)
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(DocumentStoreError::backend)
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    app_name: Option<String>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            app_name: None,
        }
    }

    /// Name reported to the server in the connection handshake.
    pub fn with_app_name(mut self, app_name: &str) -> Self {
        self.app_name = Some(app_name.to_string());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if let Some(app_name) = self.app_name {
            options.app_name = Some(app_name);
        }

        Ok(MongoDbStore::new(
            Client::with_options(options)
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docquery_core::query::Sort;

    #[test]
    fn find_options_carry_window_sort_and_projection() {
        let options = MongoDbStore::find_options(&FindSpec {
            filter: None,
            projection: Some(vec!["b".into()]),
            sort: vec![
                Sort { field: "c".into(), direction: SortDirection::Asc },
                Sort { field: "a".into(), direction: SortDirection::Desc },
            ],
            skip: Some(1),
            limit: Some(2),
        });

        assert_eq!(options.limit, Some(2));
        assert_eq!(options.skip, Some(1));
        assert_eq!(options.sort, Some(doc! { "c": 1, "a": -1 }));
        assert_eq!(options.projection, Some(doc! { "b": 1 }));
    }

    #[test]
    fn oversized_limit_is_not_sent_as_negative() {
        let options = MongoDbStore::find_options(&FindSpec {
            limit: Some(u64::MAX),
            skip: Some(u64::MAX),
            ..FindSpec::default()
        });

        assert_eq!(options.limit, None);
        assert_eq!(options.skip, Some(u64::MAX));
    }

    #[test]
    fn unwindowed_find_sets_no_options() {
        let options = MongoDbStore::find_options(&FindSpec::default());

        assert_eq!(options.limit, None);
        assert_eq!(options.skip, None);
        assert!(options.sort.is_none());
        assert!(options.projection.is_none());
    }
}
