#![allow(dead_code)]

use docquery::{memory::InMemoryStore, prelude::*};

#[ctor::ctor]
fn init() {
    colog::init();
}

/// A store whose `test` collection holds `{a: 1, b: 2, c: 1}` and `{a: 2, b: 3, c: 1}`.
pub async fn test_store() -> DocumentStore {
    let backend = InMemoryStore::builder()
        .with_document("test", doc! { "a": 1, "b": 2, "c": 1 })
        .with_document("test", doc! { "a": 2, "b": 3, "c": 1 })
        .build()
        .await
        .unwrap();

    DocumentStore::new(backend)
}

pub fn empty_store() -> DocumentStore {
    DocumentStore::new(InMemoryStore::new())
}
