mod common;

use common::*;
use crud_engine::{ListQuery, Operation, Phase, UpdateOutcome};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn before_create_veto_writes_nothing() {
    let reg = registry().await;
    let books = reg.data("book").unwrap();
    books
        .events()
        .push(Phase::Before, Operation::Create, |e| e.get("title").as_str() != Some("forbidden"));

    let mut book = books.create_empty();
    book.set("title", "forbidden");
    assert!(!books.create(&mut book).await.unwrap());
    assert!(book.id().is_none());
    assert!(books.list_entries(&ListQuery::new()).await.unwrap().is_empty());

    book.set("title", "fine");
    assert!(books.create(&mut book).await.unwrap());
    assert!(book.id().is_some());
}

#[tokio::test]
async fn after_create_sees_the_assigned_id() {
    let reg = registry().await;
    let books = reg.data("book").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    books.events().push(Phase::After, Operation::Create, move |e| {
        sink.lock().unwrap().push((e.id(), e.version()));
        false
    });

    let book = create_book(&books, "one", None).await;
    assert_eq!(*seen.lock().unwrap(), vec![(book.id(), Some(0))]);
}

#[tokio::test]
async fn update_hooks_follow_the_outcome() {
    let reg = registry().await;
    let books = reg.data("book").unwrap();
    let after = Arc::new(Mutex::new(Vec::new()));
    let sink = after.clone();
    books.events().push(Phase::After, Operation::Update, move |e| {
        sink.lock().unwrap().push(e.version());
        true
    });

    let mut book = create_book(&books, "one", None).await;
    book.set("title", "two");
    assert_eq!(books.update(&mut book).await.unwrap(), UpdateOutcome::Applied(1));

    let mut stale = book.clone();
    stale.set("version", 0);
    assert_eq!(books.update(&mut stale).await.unwrap(), UpdateOutcome::Applied(0));
    assert_eq!(*after.lock().unwrap(), vec![Some(1)]);

    books.events().push(Phase::Before, Operation::Update, |_| false);
    book.set("title", "three");
    assert_eq!(books.update(&mut book).await.unwrap(), UpdateOutcome::Vetoed);
    assert_eq!(book.version(), Some(1));
    let stored = books.get(&id_of(&book)).await.unwrap().unwrap();
    assert_eq!(stored.get("title").as_str(), Some("two"));

    assert!(books.events().pop(Phase::Before, Operation::Update));
    assert_eq!(books.update(&mut book).await.unwrap(), UpdateOutcome::Applied(1));
    assert_eq!(*after.lock().unwrap(), vec![Some(1), Some(2)]);
}

#[tokio::test]
async fn hooks_belong_to_one_engine() {
    let reg = registry().await;
    let books = reg.data("book").unwrap();
    let libraries = reg.data("library").unwrap();
    books.events().push(Phase::Before, Operation::Create, |_| false);

    let mut lib = libraries.create_empty();
    lib.set("name", "lib a");
    assert!(libraries.create(&mut lib).await.unwrap());

    let again = reg.data("book").unwrap();
    assert_eq!(again.events().len(Phase::Before, Operation::Create), 1);
}

#[tokio::test]
async fn hooks_can_unregister_themselves() {
    let reg = registry().await;
    let books = reg.data("book").unwrap();
    let engine = Arc::downgrade(&books);
    books.events().push(Phase::Before, Operation::Create, move |_| {
        if let Some(books) = engine.upgrade() {
            books.events().pop(Phase::Before, Operation::Create);
        }
        false
    });

    let mut book = books.create_empty();
    book.set("title", "one");
    assert!(!books.create(&mut book).await.unwrap());
    assert!(books.events().is_empty(Phase::Before, Operation::Create));
    assert!(books.create(&mut book).await.unwrap());
    assert_eq!(books.list_entries(&ListQuery::new()).await.unwrap().len(), 1);
}
