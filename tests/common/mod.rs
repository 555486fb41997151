//! Shared fixtures for integration tests: library/book/chapter definitions on in-memory SQLite.

#![allow(dead_code)]

use crud_engine::{
    parse_definitions, CrudService, EngineSettings, Entity, EntityId, FileProcessor, IdKind, Reference,
    ServiceRegistry, Value,
};
use std::sync::Arc;

pub const LIBRARY_DEFINITIONS: &str = r#"{
    "entities": [
        {
            "name": "library",
            "label": "Library",
            "fields": [
                { "name": "name", "type": "text", "required": true, "unique": true },
                { "name": "code", "type": "text", "pattern": "^[A-Z]{3}$" },
                { "name": "isOpenOnSundays", "type": "boolean", "default": false },
                { "name": "opened", "type": "date" },
                { "name": "libraryBook", "type": "many",
                  "many": { "entity": "book", "this_field": "library", "that_field": "book", "name_field": "title" } }
            ],
            "list_fields": ["name", "isOpenOnSundays"]
        },
        {
            "name": "book",
            "fields": [
                { "name": "title", "type": "text", "required": true },
                { "name": "pages", "type": "integer" },
                { "name": "price", "type": "float" },
                { "name": "published", "type": "datetime" },
                { "name": "cover", "type": "file" },
                { "name": "library", "type": "reference",
                  "reference": { "entity": "library", "name_field": "name" } }
            ],
            "page_size": 5
        },
        {
            "name": "chapter",
            "fields": [
                { "name": "heading", "type": "text" },
                { "name": "book", "type": "reference",
                  "reference": { "entity": "book", "name_field": "title" } }
            ]
        }
    ]
}"#;

pub fn settings(id_kind: IdKind) -> EngineSettings {
    EngineSettings {
        id_kind,
        ..EngineSettings::default()
    }
}

/// Fresh registry over its own in-memory database.
pub async fn registry() -> Arc<ServiceRegistry> {
    registry_with(IdKind::Sequential).await
}

pub async fn registry_with(id_kind: IdKind) -> Arc<ServiceRegistry> {
    let defs = parse_definitions(LIBRARY_DEFINITIONS).expect("definitions");
    ServiceRegistry::open(&settings(id_kind), defs)
        .await
        .expect("open registry")
}

pub async fn registry_with_files(files: Arc<dyn FileProcessor>) -> Arc<ServiceRegistry> {
    let defs = parse_definitions(LIBRARY_DEFINITIONS).expect("definitions");
    ServiceRegistry::open_with_files(&settings(IdKind::Sequential), defs, files)
        .await
        .expect("open registry")
}

pub async fn create_library(libraries: &CrudService, name: &str) -> Entity {
    let mut lib = libraries.create_empty();
    lib.set("name", name);
    assert!(libraries.create(&mut lib).await.expect("create library"));
    lib
}

pub async fn create_book(books: &CrudService, title: &str, library: Option<&Entity>) -> Entity {
    let mut book = books.create_empty();
    book.set("title", title);
    if let Some(lib) = library {
        book.set("library", Value::from(lib.id().expect("library id")));
    }
    assert!(books.create(&mut book).await.expect("create book"));
    book
}

pub async fn create_chapter(chapters: &CrudService, heading: &str, book: &Entity) -> Entity {
    let mut chapter = chapters.create_empty();
    chapter.set("heading", heading);
    chapter.set("book", Value::from(book.id().expect("book id")));
    assert!(chapters.create(&mut chapter).await.expect("create chapter"));
    chapter
}

pub fn id_of(e: &Entity) -> EntityId {
    e.id().expect("entity id")
}

pub fn many_ids(e: &Entity, field: &str) -> Vec<EntityId> {
    e.get(field)
        .as_many()
        .expect("many field")
        .iter()
        .map(|r: &Reference| r.id.clone())
        .collect()
}
