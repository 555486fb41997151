mod common;

use common::*;
use crud_engine::{CrudError, EntityId, EntityValidator, Value};

fn failed_field(result: Result<(), CrudError>) -> String {
    match result {
        Err(CrudError::Validation { field, .. }) => field,
        other => panic!("expected a validation failure, got {:?}", other),
    }
}

#[tokio::test]
async fn required_fields_must_be_present() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    let mut lib = libraries.create_empty();
    assert_eq!(failed_field(EntityValidator::validate(&libraries, &lib).await), "name");
    lib.set("name", "");
    assert_eq!(failed_field(EntityValidator::validate(&libraries, &lib).await), "name");
    lib.set("name", "lib a");
    EntityValidator::validate(&libraries, &lib).await.unwrap();
}

#[tokio::test]
async fn unique_fields_ignore_the_entity_itself() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    let existing = create_library(&libraries, "lib a").await;

    EntityValidator::validate(&libraries, &existing).await.unwrap();

    let mut twin = libraries.create_empty();
    twin.set("name", "lib a");
    assert_eq!(failed_field(EntityValidator::validate(&libraries, &twin).await), "name");

    libraries.delete(&existing).await.unwrap();
    EntityValidator::validate(&libraries, &twin).await.unwrap();
}

#[tokio::test]
async fn patterns_and_shapes_are_checked() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    let books = reg.data("book").unwrap();

    let mut lib = libraries.create_empty();
    lib.set("name", "lib a");
    lib.set("code", "ABC");
    EntityValidator::validate(&libraries, &lib).await.unwrap();
    lib.set("code", "abcd");
    assert_eq!(failed_field(EntityValidator::validate(&libraries, &lib).await), "code");
    lib.set("code", Value::Null);
    lib.set("opened", "not a date");
    assert_eq!(failed_field(EntityValidator::validate(&libraries, &lib).await), "opened");
    lib.set("opened", "2020-02-29");
    EntityValidator::validate(&libraries, &lib).await.unwrap();

    let mut book = books.create_empty();
    book.set("title", "one");
    book.set("pages", "many");
    assert_eq!(failed_field(EntityValidator::validate(&books, &book).await), "pages");
    book.set("pages", "12");
    EntityValidator::validate(&books, &book).await.unwrap();
    book.set("published", "yesterday");
    assert_eq!(failed_field(EntityValidator::validate(&books, &book).await), "published");
}

#[tokio::test]
async fn references_must_point_at_live_rows() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    let books = reg.data("book").unwrap();
    let lib = create_library(&libraries, "lib a").await;

    let mut book = books.create_empty();
    book.set("title", "one");
    book.set("library", Value::from(EntityId::Int(99)));
    assert_eq!(failed_field(EntityValidator::validate(&books, &book).await), "library");

    book.set("library", Value::from(id_of(&lib)));
    EntityValidator::validate(&books, &book).await.unwrap();

    libraries.delete(&lib).await.unwrap();
    assert_eq!(failed_field(EntityValidator::validate(&books, &book).await), "library");
}
