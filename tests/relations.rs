mod common;

use common::*;
use crud_engine::{EntityId, ListQuery, Reference, UpdateOutcome, Value};

#[tokio::test]
async fn references_resolve_to_id_and_display_name() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    let books = reg.data("book").unwrap();

    let a = create_library(&libraries, "lib a").await;
    let b = create_library(&libraries, "lib b").await;
    create_book(&books, "one", Some(&a)).await;
    create_book(&books, "two", Some(&b)).await;
    create_book(&books, "three", Some(&a)).await;
    create_book(&books, "orphan", None).await;

    let page = books.list_entries(&ListQuery::new()).await.unwrap();
    let names: Vec<Option<&str>> = page
        .iter()
        .map(|e| e.get("library").as_reference().and_then(|r| r.name.as_deref()))
        .collect();
    assert_eq!(names, vec![Some("lib a"), Some("lib b"), Some("lib a"), None]);
    assert_eq!(page[3].get("library"), &Value::Null);
    assert_eq!(
        page[1].get("library").as_reference().map(|r| r.id.clone()),
        Some(id_of(&b))
    );
}

#[tokio::test]
async fn deleted_targets_keep_their_id_without_a_name() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    let books = reg.data("book").unwrap();

    let lib = create_library(&libraries, "lib a").await;
    let book = create_book(&books, "one", Some(&lib)).await;
    // Soft-delete the library behind the reference's back.
    let mut conn = reg.pool().acquire().await.unwrap();
    sqlx::query("UPDATE \"library\" SET \"deleted_at\" = '2024-01-01T00:00:00Z'")
        .execute(&mut *conn)
        .await
        .unwrap();
    drop(conn);

    let fetched = books.get(&id_of(&book)).await.unwrap().unwrap();
    assert_eq!(
        fetched.get("library").as_reference(),
        Some(&Reference::unresolved(id_of(&lib)))
    );
}

#[tokio::test]
async fn fetch_references_fills_raw_ids_in_place() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    let books = reg.data("book").unwrap();
    let lib = create_library(&libraries, "lib a").await;

    let mut draft = books.create_empty();
    draft.set("library", Value::from(id_of(&lib)));
    let mut rows = vec![draft];
    books.fetch_references(&mut rows).await.unwrap();
    assert_eq!(
        rows[0].get("library").as_reference(),
        Some(&Reference::new(id_of(&lib), "lib a"))
    );

    let mut none: Vec<crud_engine::Entity> = Vec::new();
    books.fetch_references(&mut none).await.unwrap();
}

#[tokio::test]
async fn many_collections_are_replaced_and_deduplicated() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    let books = reg.data("book").unwrap();

    let b1 = create_book(&books, "one", None).await;
    let b2 = create_book(&books, "two", None).await;
    let b3 = create_book(&books, "three", None).await;

    let mut lib = libraries.create_empty();
    lib.set("name", "lib a");
    lib.set(
        "libraryBook",
        vec![
            Reference::unresolved(id_of(&b2)),
            Reference::unresolved(id_of(&b1)),
            Reference::unresolved(id_of(&b2)),
        ],
    );
    assert!(libraries.create(&mut lib).await.unwrap());

    let stored = libraries.get(&id_of(&lib)).await.unwrap().unwrap();
    assert_eq!(many_ids(&stored, "libraryBook"), vec![id_of(&b1), id_of(&b2)]);
    assert_eq!(
        stored.get("libraryBook").as_many().unwrap()[0].name.as_deref(),
        Some("one")
    );

    let mut lib = stored;
    lib.set("libraryBook", vec![Reference::unresolved(id_of(&b3))]);
    assert_eq!(libraries.update(&mut lib).await.unwrap(), UpdateOutcome::Applied(1));
    let stored = libraries.get(&id_of(&lib)).await.unwrap().unwrap();
    assert_eq!(many_ids(&stored, "libraryBook"), vec![id_of(&b3)]);

    let mut lib = stored;
    lib.set("libraryBook", Vec::<Reference>::new());
    libraries.update(&mut lib).await.unwrap();
    let stored = libraries.get(&id_of(&lib)).await.unwrap().unwrap();
    assert_eq!(stored.get("libraryBook"), &Value::Many(Vec::new()));
}

#[tokio::test]
async fn stale_update_leaves_many_collections_alone() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    let books = reg.data("book").unwrap();
    let b1 = create_book(&books, "one", None).await;
    let b2 = create_book(&books, "two", None).await;

    let mut lib = libraries.create_empty();
    lib.set("name", "lib a");
    lib.set("libraryBook", vec![Reference::unresolved(id_of(&b1))]);
    libraries.create(&mut lib).await.unwrap();

    lib.set("version", 7);
    lib.set("libraryBook", vec![Reference::unresolved(id_of(&b2))]);
    assert_eq!(libraries.update(&mut lib).await.unwrap(), UpdateOutcome::Applied(0));

    let stored = libraries.get(&id_of(&lib)).await.unwrap().unwrap();
    assert_eq!(many_ids(&stored, "libraryBook"), vec![id_of(&b1)]);
}

#[tokio::test]
async fn many_collections_skip_deleted_targets() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    let books = reg.data("book").unwrap();
    let b1 = create_book(&books, "one", None).await;
    let b2 = create_book(&books, "two", None).await;

    let mut lib = libraries.create_empty();
    lib.set("name", "lib a");
    lib.set(
        "libraryBook",
        vec![Reference::unresolved(id_of(&b1)), Reference::unresolved(id_of(&b2))],
    );
    libraries.create(&mut lib).await.unwrap();
    books.delete(&b1).await.unwrap();

    let page = libraries.list_entries(&ListQuery::new()).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(many_ids(&page[0], "libraryBook"), vec![id_of(&b2)]);
}

#[tokio::test]
async fn rows_without_associations_get_empty_lists() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    create_library(&libraries, "lib a").await;
    create_library(&libraries, "lib b").await;
    for lib in libraries.list_entries(&ListQuery::new()).await.unwrap() {
        assert_eq!(lib.get("libraryBook"), &Value::Many(Vec::new()));
    }
}

#[tokio::test]
async fn id_to_name_map_is_ordered_by_display_field() {
    let reg = registry().await;
    let libraries = reg.data("library").unwrap();
    let books = reg.data("book").unwrap();
    let c = create_library(&libraries, "charlie").await;
    let a = create_library(&libraries, "alpha").await;
    let b = create_library(&libraries, "bravo").await;
    libraries.delete(&b).await.unwrap();

    let map = books.get_id_to_name_map("library", Some("name")).await.unwrap();
    assert_eq!(
        map,
        vec![(id_of(&a), "alpha".to_string()), (id_of(&c), "charlie".to_string())]
    );

    let by_id = books.get_id_to_name_map("library", None).await.unwrap();
    assert_eq!(
        by_id,
        vec![(EntityId::Int(1), "1".to_string()), (EntityId::Int(2), "2".to_string())]
    );

    assert!(books.get_id_to_name_map("library", Some("nope")).await.is_err());
    assert!(books.get_id_to_name_map("shelf", None).await.is_err());
}
