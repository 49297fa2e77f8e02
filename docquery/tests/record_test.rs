mod common;

use async_trait::async_trait;
use docquery::prelude::*;
use serde::Deserialize;
use std::sync::{Arc, LazyLock, Mutex};

use common::empty_store;

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

struct FileSet;

static FILESET_SCHEMA: LazyLock<FieldSchema> = LazyLock::new(|| {
    FieldSchema::new()
        .field(SchemaField::string("password").validate(Validator::min_length(5)))
        .field(SchemaField::string("subject"))
        .field(SchemaField::string("description").optional())
        .field(SchemaField::string("sender_id").optional())
        .field(SchemaField::string("sender_email").validate(Validator::custom(|value| {
            match value.as_str() {
                Some(email) if email.contains('@') => Ok(()),
                _ => Err("Invalid email address".to_string()),
            }
        })))
        .field(SchemaField::string("sender_name"))
        .field(SchemaField::string("recipient_id"))
        .field(SchemaField::bool("from_kua").default(false))
        .field(SchemaField::datetime("expires_on"))
        .field(SchemaField::string("created_ip").optional())
        .field(SchemaField::int("size").validate(Validator::min(0.0)))
});

impl RecordType for FileSet {
    fn collection_name() -> &'static str {
        "filesets"
    }

    fn schema() -> &'static dyn Schema {
        &*FILESET_SCHEMA
    }

    fn initialize(data: &mut AttributeBag) {
        if data.get("expires_on").is_none() {
            let expires_on = bson::DateTime::from_millis(bson::DateTime::now().timestamp_millis() + 14 * DAY_MILLIS);
            data.set_attr("expires_on", expires_on);
        }
    }
}

fn fs_data() -> bson::Document {
    doc! {
        "oid": "c76s87c68c7s6",
        "password": "12345",
        "subject": "Subject 1",
        "description": "This is a description",
        "sender_id": bson::Bson::Null,
        "sender_email": "foo@example.org",
        "sender_name": "Example sender",
        "recipient_id": "info@example.org",
        "from_kua": false,
        "created_ip": "127.0.0.1",
        "size": 1761716176_i64,
    }
}

#[derive(Debug, Deserialize)]
struct Summary {
    subject: String,
    size: i64,
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let store = empty_store();
    let filesets = store.records::<FileSet>();

    let mut fileset = Record::<FileSet>::new(fs_data());
    assert_eq!(fileset.data().attr_as::<String>("password").unwrap(), "12345");
    assert!(fileset.identifier().is_none());
    assert!(!fileset.exists());

    filesets.put(&mut fileset).await.unwrap();

    let identifier = fileset.identifier().unwrap().to_string();
    assert!(!identifier.is_empty());
    assert!(fileset.exists());
    assert_eq!(fileset.collection().unwrap().handle().name(), "filesets");

    let loaded = filesets.get(&identifier).await.unwrap();
    assert_eq!(loaded.identifier(), Some(identifier.as_str()));
    assert_eq!(loaded.data().attr_as::<String>("password").unwrap(), "12345");
    assert_eq!(loaded.data(), fileset.data());
    assert!(loaded.is_loaded_from_store());

    let summary: Summary = loaded.decode().unwrap();
    assert_eq!(summary.subject, "Subject 1");
    assert_eq!(summary.size, 1761716176);
}

#[tokio::test]
async fn stored_records_are_not_initialized_twice() {
    let store = empty_store();
    let filesets = store.records::<FileSet>();

    let mut fileset = Record::<FileSet>::new(fs_data());
    filesets.put(&mut fileset).await.unwrap();
    let identifier = fileset.identifier().unwrap().to_string();

    let mut loaded = filesets.get(&identifier).await.unwrap();
    let first = *loaded.data().attr("expires_on").unwrap().as_datetime().unwrap();

    let changed = bson::DateTime::from_millis(first.timestamp_millis() + 30 * DAY_MILLIS);
    loaded.data_mut().set_attr("expires_on", changed);
    loaded.save().await.unwrap();

    let reloaded = filesets.get(&identifier).await.unwrap();
    let second = *reloaded.data().attr("expires_on").unwrap().as_datetime().unwrap();

    assert_ne!(first, second);
    assert_eq!(second, changed);
}

#[tokio::test]
async fn every_violation_is_reported_and_nothing_is_stored() {
    let store = empty_store();
    let filesets = store.records::<FileSet>();

    let mut data = fs_data();
    data.insert("password", "123");
    data.insert("sender_email", "nobody");
    data.insert("size", -5);
    data.remove("subject");

    let mut fileset = Record::<FileSet>::new(data);
    let err = filesets.put(&mut fileset).await.unwrap_err();

    let errors = err.validation_errors().unwrap();
    assert_eq!(errors.len(), 4);
    assert_eq!(errors.get("password"), Some("Shorter than minimum length 5"));
    assert_eq!(errors.get("sender_email"), Some("Invalid email address"));
    assert_eq!(errors.get("size"), Some("-5 is less than minimum value 0"));
    assert_eq!(errors.get("subject"), Some("Required"));

    assert!(fileset.identifier().is_none());
    assert!(!fileset.exists());
    assert_eq!(filesets.count().await.unwrap(), 0);
}

#[tokio::test]
async fn identifier_is_stable_across_saves() {
    let store = empty_store();
    let filesets = store.records::<FileSet>();

    let mut fileset = Record::<FileSet>::new(fs_data());
    filesets.put(&mut fileset).await.unwrap();
    let identifier = fileset.identifier().unwrap().to_string();

    fileset.data_mut().set_attr("subject", "Subject 2");
    fileset.put().await.unwrap();
    fileset.serialize().unwrap();

    assert_eq!(fileset.identifier(), Some(identifier.as_str()));
    assert_eq!(filesets.count().await.unwrap(), 1);
    assert_eq!(
        filesets.get(&identifier).await.unwrap().data().get_str("subject").unwrap(),
        "Subject 2"
    );
}

#[tokio::test]
async fn missing_identifier_is_not_found() {
    let store = empty_store();
    let filesets = store.records::<FileSet>();

    match filesets.get("nope").await {
        Err(DocumentStoreError::ObjectNotFound(identifier)) => assert_eq!(identifier, "nope"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn delete_removes_and_tolerates_unknown_identifiers() {
    let store = empty_store();
    let filesets = store.records::<FileSet>();

    let mut fileset = Record::<FileSet>::new(fs_data());
    filesets.put(&mut fileset).await.unwrap();
    let identifier = fileset.identifier().unwrap().to_string();

    filesets.delete(&identifier).await.unwrap();
    filesets.delete(&identifier).await.unwrap();
    filesets.delete("never-stored").await.unwrap();

    assert!(filesets.get(&identifier).await.is_err());
    assert_eq!(filesets.count().await.unwrap(), 0);
}

#[tokio::test]
async fn collection_queries_yield_records() {
    let store = empty_store();
    let filesets = store.records::<FileSet>();

    for (subject, size) in [("one", 10), ("two", 20), ("three", 30)] {
        let mut data = fs_data();
        data.insert("subject", subject);
        data.insert("size", size);
        filesets.put(&mut Record::new(data)).await.unwrap();
    }

    let all = filesets.all().run().await.unwrap().try_collect().await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|record| record.exists() && record.collection().is_some()));

    let result = filesets
        .query(Filter::gte("size", 20))
        .sort("size", -1)
        .run()
        .await
        .unwrap();
    assert_eq!(result.count().await.unwrap(), 2);

    let largest = result.get(0).await.unwrap().unwrap();
    assert_eq!(largest.data().get_str("subject").unwrap(), "three");

    let partial = filesets.all().project(["subject"]).run().await.unwrap();
    assert!(!partial.is_complete());
}

#[tokio::test]
async fn loaded_records_save_through_their_collection() {
    let store = empty_store();
    let filesets = store.records::<FileSet>();

    let mut fileset = Record::<FileSet>::new(fs_data());
    filesets.put(&mut fileset).await.unwrap();

    let mut loaded = filesets
        .query(Filter::eq("subject", "Subject 1"))
        .run()
        .await
        .unwrap()
        .next()
        .await
        .unwrap()
        .unwrap();
    loaded.data_mut().set_attr("description", "changed");
    loaded.put().await.unwrap();

    let reloaded = filesets.get(fileset.identifier().unwrap()).await.unwrap();
    assert_eq!(reloaded.data().get_str("description").unwrap(), "changed");
}

#[tokio::test]
async fn normalization_on_read_cleans_legacy_documents() {
    let store = empty_store();
    store
        .collection("filesets")
        .insert_or_replace({
            let mut legacy = fs_data();
            legacy.insert("_id", "legacy");
            legacy.insert("size", 10.0);
            legacy.insert("expires_on", bson::DateTime::now());
            legacy
        })
        .await
        .unwrap();

    let raw = store.records::<FileSet>().get("legacy").await.unwrap();
    assert_eq!(raw.data().get("size"), Some(&bson::Bson::Double(10.0)));
    assert!(raw.data().get("oid").is_some());

    let normalizing = store.records_with_config::<FileSet>(
        CollectionConfig::new().with_normalize_on_read(true),
    );
    let normalized = normalizing.get("legacy").await.unwrap();

    assert_eq!(normalized.data().get("size"), Some(&bson::Bson::Int64(10)));
    assert!(normalized.data().get("oid").is_none());
    assert_eq!(normalized.identifier(), Some("legacy"));
}

struct Upload;

static UPLOAD_SCHEMA: LazyLock<FieldSchema> =
    LazyLock::new(|| FieldSchema::new().unknown(UnknownFields::Preserve));

impl RecordType for Upload {
    const CREATE_ID: bool = false;

    fn collection_name() -> &'static str {
        "uploads"
    }

    fn schema() -> &'static dyn Schema {
        &*UPLOAD_SCHEMA
    }

    fn on_serialize(mut data: bson::Document) -> DocumentStoreResult<bson::Document> {
        data.insert("serialized", true);
        Ok(data)
    }

    fn on_deserialize(mut raw: bson::Document) -> DocumentStoreResult<bson::Document> {
        raw.remove("serialized");
        Ok(raw)
    }
}

#[tokio::test]
async fn store_assigns_identifiers_when_records_do_not() {
    let store = empty_store();
    let uploads = store.records::<Upload>();

    let mut upload = Record::<Upload>::new(doc! { "name": "file.txt" });
    uploads.put(&mut upload).await.unwrap();

    let identifier = upload.identifier().unwrap().to_string();
    assert!(upload.data().get_bool("serialized").unwrap());

    let loaded = uploads.get(&identifier).await.unwrap();
    assert_eq!(loaded.data().get_str("name").unwrap(), "file.txt");
    assert!(loaded.data().get("serialized").is_none());
}

#[tokio::test]
async fn non_string_identifiers_round_trip_through_get_and_delete() {
    let store = empty_store();
    let uploads = store.records::<Upload>();

    let oid = bson::oid::ObjectId::new();
    let mut by_oid = Record::<Upload>::new(doc! { "_id": oid, "n": 1 });
    let mut by_number = Record::<Upload>::new(doc! { "_id": 42_i64, "n": 2 });
    uploads.put(&mut by_oid).await.unwrap();
    uploads.put(&mut by_number).await.unwrap();

    assert_eq!(by_oid.identifier(), Some(oid.to_hex().as_str()));
    assert_eq!(by_number.identifier(), Some("42"));

    let loaded = uploads.get(&oid.to_hex()).await.unwrap();
    assert_eq!(loaded.data().get(ID_FIELD), Some(&bson::Bson::ObjectId(oid)));
    assert_eq!(loaded.data().get_i32("n").unwrap(), 1);
    assert_eq!(uploads.get("42").await.unwrap().data().get_i32("n").unwrap(), 2);

    uploads.delete(&oid.to_hex()).await.unwrap();
    uploads.delete("42").await.unwrap();

    assert_eq!(uploads.count().await.unwrap(), 0);
}

#[derive(Default, Clone)]
struct UniqueSender {
    deleted: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CollectionHooks<FileSet> for UniqueSender {
    async fn on_put(
        &self,
        collection: &Collection<FileSet>,
        record: &Record<FileSet>,
        data: bson::Document,
    ) -> DocumentStoreResult<bson::Document> {
        let sender = data.get_str("sender_email")?.to_string();
        let mut others = collection
            .query(Filter::eq("sender_email", sender.as_str()))
            .run()
            .await?;

        while let Some(other) = others.next().await {
            if other?.identifier() != record.identifier() {
                let mut errors = ValidationErrors::new();
                errors.push("sender_email", "Already registered");
                return Err(DocumentStoreError::InvalidData(errors));
            }
        }

        Ok(data)
    }

    async fn on_delete(&self, _collection: &Collection<FileSet>, identifier: &str) -> DocumentStoreResult<()> {
        self.deleted.lock().unwrap().push(identifier.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn collection_hooks_guard_puts_and_observe_deletes() {
    let store = empty_store();
    let hooks = UniqueSender::default();
    let filesets = store.records::<FileSet>().with_hooks(hooks.clone());

    let mut first = Record::<FileSet>::new(fs_data());
    filesets.put(&mut first).await.unwrap();
    first.data_mut().set_attr("subject", "resaved");
    filesets.put(&mut first).await.unwrap();

    let mut second = Record::<FileSet>::new(fs_data());
    let err = filesets.put(&mut second).await.unwrap_err();
    assert_eq!(err.validation_errors().unwrap().get("sender_email"), Some("Already registered"));
    assert_eq!(filesets.count().await.unwrap(), 1);

    let identifier = first.identifier().unwrap().to_string();
    filesets.delete(&identifier).await.unwrap();

    assert_eq!(*hooks.deleted.lock().unwrap(), vec![identifier]);
}
