//! Create managed tables and join tables for resolved definitions.
//! Idempotent (IF NOT EXISTS); existing tables are never altered.

use crate::config::{Definitions, EntityDefinition};
use crate::error::CrudError;
use crate::ids::IdKind;
use crate::sql::{quoted, Dialect};
use sqlx::AnyPool;
use std::collections::HashSet;

/// DDL for one entity table: system columns, then one column per non-many field.
pub fn create_table_sql(def: &EntityDefinition, dialect: Dialect, id_kind: IdKind) -> String {
    let ts = dialect.timestamp_type();
    let version_type = match dialect {
        Dialect::Postgres => "BIGINT",
        Dialect::Sqlite => "INTEGER",
    };
    let mut col_defs = vec![
        format!("{} {}", quoted("id"), dialect.id_column_type(id_kind)),
        format!("{} {} NOT NULL", quoted("created_at"), ts),
        format!("{} {} NOT NULL", quoted("updated_at"), ts),
        format!("{} {}", quoted("deleted_at"), ts),
        format!("{} {} NOT NULL DEFAULT 0", quoted("version"), version_type),
    ];
    for f in def.column_fields() {
        if let Some(typ) = dialect.column_type(&f.field_type, id_kind) {
            col_defs.push(format!("{} {}", quoted(&f.name), typ));
        }
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quoted(&def.table),
        col_defs.join(", ")
    )
}

/// Create every missing entity table and join table.
pub async fn apply_migrations(
    pool: &AnyPool,
    dialect: Dialect,
    definitions: &Definitions,
    id_kind: IdKind,
) -> Result<(), CrudError> {
    let id_ref = dialect.id_ref_type(id_kind);
    let mut join_tables = HashSet::new();
    for def in definitions.iter() {
        let sql = create_table_sql(def, dialect, id_kind);
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(&sql).execute(pool).await?;

        for (_, many) in def.many_fields() {
            if !join_tables.insert(many.table.clone()) {
                continue;
            }
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} ({} {} NOT NULL, {} {} NOT NULL)",
                quoted(&many.table),
                quoted(&many.this_field),
                id_ref,
                quoted(&many.that_field),
                id_ref
            );
            tracing::debug!(sql = %sql, "migration");
            sqlx::query(&sql).execute(pool).await?;
        }
    }
    tracing::info!(
        tables = definitions.entities.len(),
        join_tables = join_tables.len(),
        "migrations applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_definitions;

    #[test]
    fn table_ddl_carries_system_columns() {
        let defs = parse_definitions(
            r#"{ "entities": [ { "name": "book", "fields": [
                { "name": "title", "type": "text" },
                { "name": "isRead", "type": "boolean" }
            ] } ] }"#,
        )
        .unwrap();
        let book = defs.get("book").unwrap();
        assert_eq!(
            create_table_sql(book, Dialect::Sqlite, IdKind::Sequential),
            "CREATE TABLE IF NOT EXISTS \"book\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
             \"created_at\" TEXT NOT NULL, \"updated_at\" TEXT NOT NULL, \"deleted_at\" TEXT, \
             \"version\" INTEGER NOT NULL DEFAULT 0, \"title\" TEXT, \"isRead\" INTEGER NOT NULL DEFAULT 0)"
        );
        let pg = create_table_sql(book, Dialect::Postgres, IdKind::Uuid);
        assert!(pg.contains("\"id\" VARCHAR(36) PRIMARY KEY"));
        assert!(pg.contains("\"deleted_at\" TIMESTAMPTZ,"));
    }
}
