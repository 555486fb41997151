//! Example consumer: a separate Rust project that uses crud-engine as a dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Definitions come from `CRUD_DEFINITIONS` (default `example_consumer/library.json`);
//! the database from `CRUD_DATABASE_URL` (default in-memory SQLite).

use crud_engine::{load_from_path, EngineSettings, EntityValidator, ListQuery, Reference, ServiceRegistry, Value};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crud_engine=info")),
        )
        .init();

    let settings = EngineSettings::from_env()?;
    let path = settings
        .definitions_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/library.json")));
    let definitions = load_from_path(&path).await?;
    let registry = ServiceRegistry::open(&settings, definitions).await?;

    let libraries = registry.data("library")?;
    let books = registry.data("book")?;

    books.events().push(
        crud_engine::Phase::Before,
        crud_engine::Operation::Create,
        |book| !book.get("title").is_empty(),
    );

    let mut lib = libraries.create_empty();
    lib.set("name", "lib a");
    EntityValidator::validate(&libraries, &lib).await?;
    libraries.create(&mut lib).await?;
    let lib_id = lib.id().ok_or("library has no id")?;

    let mut book = books.create_empty();
    book.set("title", "titleA");
    book.set("pages", 320);
    book.set("library", Value::from(lib_id.clone()));
    EntityValidator::validate(&books, &book).await?;
    books.create(&mut book).await?;

    let mut untitled = books.create_empty();
    let created = books.create(&mut untitled).await?;
    tracing::info!(created, "untitled book");

    let book_id = book.id().ok_or("book has no id")?;
    lib.set("libraryBook", vec![Reference::unresolved(book_id.clone())]);
    let outcome = libraries.update(&mut lib).await?;
    tracing::info!(?outcome, version = ?lib.version(), "library updated");

    if let Some(fetched) = books.get(&book_id).await? {
        println!("{}", serde_json::to_string_pretty(&fetched)?);
    }
    for row in libraries.list_entries(&ListQuery::new().sort_by("name", None)).await? {
        println!("{}", serde_json::to_string_pretty(&row)?);
    }

    let blocked = libraries.do_delete(&lib, false).await?;
    tracing::info!(?blocked, "delete library without cascade");
    let deleted = libraries.do_delete(&lib, true).await?;
    tracing::info!(?deleted, "delete library with cascade");

    let remaining = books.list_entries(&ListQuery::new()).await?;
    tracing::info!(remaining = remaining.len(), "books left");
    Ok(())
}
