//! Per-entity data access: listing, lookup, versioned writes, soft delete and relation enrichment.

use crate::config::{EntityDefinition, FieldType, ScalarKind};
use crate::entity::{Entity, EntityId, Reference, Value};
use crate::error::CrudError;
use crate::events::{EventRegistry, Operation, Phase};
use crate::files::FileProcessor;
use crate::ids::{IdKind, IdStrategy};
use crate::service::EngineLookup;
use crate::sql::{
    bind_all, count_where, delete_many, format_timestamp, insert, insert_many, parse_date, parse_timestamp,
    select_id_names, select_list, select_many_in, select_names_in, soft_delete, update, Condition, Dialect,
    FilterOp, ListQuery, QueryBuf,
};
use chrono::Utc;
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, AnyPool, Row};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

/// Upper bound on ids bound into one `IN (...)` list.
const IN_CHUNK: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A before-update hook refused the change.
    Vetoed,
    /// Rows written: 1, or 0 when the row is gone or its version moved on.
    Applied(u64),
}

impl UpdateOutcome {
    pub fn rows_affected(self) -> u64 {
        match self {
            UpdateOutcome::Vetoed => 0,
            UpdateOutcome::Applied(n) => n,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Success,
    FailedEvent,
    FailedStillReferenced,
}

type DeleteFuture<'a> = Pin<Box<dyn Future<Output = Result<DeleteOutcome, CrudError>> + Send + 'a>>;

#[derive(Clone, Copy)]
enum FileAction {
    Create,
    Update,
    Delete,
}

pub struct CrudService {
    definition: Arc<EntityDefinition>,
    pool: AnyPool,
    dialect: Dialect,
    ids: Arc<dyn IdStrategy>,
    files: Arc<dyn FileProcessor>,
    events: EventRegistry,
    lookup: Weak<dyn EngineLookup>,
}

impl CrudService {
    pub fn new(
        definition: Arc<EntityDefinition>,
        pool: AnyPool,
        dialect: Dialect,
        ids: Arc<dyn IdStrategy>,
        files: Arc<dyn FileProcessor>,
        lookup: Weak<dyn EngineLookup>,
    ) -> Self {
        CrudService {
            definition,
            pool,
            dialect,
            ids,
            files,
            events: EventRegistry::new(),
            lookup,
        }
    }

    pub fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    /// Hooks of this entity type; push and pop handlers here.
    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn id_kind(&self) -> IdKind {
        self.ids.kind()
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Live entity by id with references and many-to-many collections populated.
    pub async fn get(&self, id: &EntityId) -> Result<Option<Entity>, CrudError> {
        // An id this installation cannot store matches no row.
        let Some(id) = self.normalize_id(&Value::from(id.clone())) else {
            return Ok(None);
        };
        let query = ListQuery::new().filter("id", Value::from(id)).amount(1);
        let mut conn = self.pool.acquire().await?;
        let mut rows = self.query_rows(&mut conn, &query).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        self.enrich(&mut conn, &mut rows).await?;
        Ok(rows.pop())
    }

    pub async fn list_entries(&self, query: &ListQuery) -> Result<Vec<Entity>, CrudError> {
        let mut conn = self.pool.acquire().await?;
        let mut rows = self.query_rows(&mut conn, query).await?;
        self.enrich(&mut conn, &mut rows).await?;
        Ok(rows)
    }

    /// Zero-based page using the entity's configured page size, in id order.
    pub async fn list_page(&self, page: u64) -> Result<Vec<Entity>, CrudError> {
        self.list_entries(&ListQuery::new().page(page, self.definition.page_size))
            .await
    }

    pub async fn create(&self, entity: &mut Entity) -> Result<bool, CrudError> {
        if !self.events.fire(Phase::Before, Operation::Create, entity) {
            tracing::info!(entity = %self.definition.name, "create vetoed by hook");
            return Ok(false);
        }
        let now = format_timestamp(&Utc::now());
        let mut tx = self.pool.begin().await?;
        let supplied = self.ids.next_id(&mut tx, self.dialect).await?;
        let q = insert(&self.definition, self.dialect, self.id_kind(), entity, supplied.as_ref(), &now)?;
        let row = fetch_one(&mut tx, &q).await?;
        let id = read_id(&row, "id", self.id_kind())?.ok_or(CrudError::MissingId)?;

        let query = ListQuery::new().filter("id", Value::from(id.clone())).amount(1);
        let stored = self
            .query_rows(&mut tx, &query)
            .await?
            .pop()
            .ok_or(CrudError::Db(sqlx::Error::RowNotFound))?;
        for field in ["id", "version", "created_at", "updated_at"] {
            entity.set(field, stored.get(field).clone());
        }
        self.replace_many(&mut tx, &id, entity).await?;
        tx.commit().await?;

        tracing::info!(entity = %self.definition.name, id = %id, "created");
        self.events.fire(Phase::After, Operation::Create, entity);
        Ok(true)
    }

    /// Version-checked update. On success the caller's entity carries the new version.
    pub async fn update(&self, entity: &mut Entity) -> Result<UpdateOutcome, CrudError> {
        let id = entity.id().ok_or(CrudError::MissingId)?;
        let version = entity.version().ok_or(CrudError::MissingVersion)?;
        if !self.events.fire(Phase::Before, Operation::Update, entity) {
            tracing::info!(entity = %self.definition.name, id = %id, "update vetoed by hook");
            return Ok(UpdateOutcome::Vetoed);
        }
        let now = format_timestamp(&Utc::now());
        let mut tx = self.pool.begin().await?;
        let q = update(&self.definition, self.dialect, self.id_kind(), entity, &id, version, &now)?;
        let rows = execute(&mut tx, &q).await?;
        if rows == 0 {
            tx.rollback().await?;
            tracing::warn!(
                entity = %self.definition.name,
                id = %id,
                version,
                "update matched no live row at the expected version"
            );
            return Ok(UpdateOutcome::Applied(0));
        }
        self.replace_many(&mut tx, &id, entity).await?;
        tx.commit().await?;

        entity.set("version", version + 1);
        entity.set("updated_at", Value::from(parse_timestamp(&now)));
        tracing::info!(entity = %self.definition.name, id = %id, version = version + 1, "updated");
        self.events.fire(Phase::After, Operation::Update, entity);
        Ok(UpdateOutcome::Applied(rows))
    }

    /// Delete honoring the definition's cascade setting.
    pub async fn delete(&self, entity: &Entity) -> Result<DeleteOutcome, CrudError> {
        self.do_delete(entity, self.definition.delete_cascade).await
    }

    /// Soft delete. With `cascade`, live children are deleted too, each through its own
    /// engine; otherwise any live child blocks the delete.
    pub async fn do_delete(&self, entity: &Entity, cascade: bool) -> Result<DeleteOutcome, CrudError> {
        let id = entity.id().ok_or(CrudError::MissingId)?;
        if !self.events.fire(Phase::Before, Operation::Delete, entity) {
            tracing::info!(entity = %self.definition.name, id = %id, "delete vetoed by hook");
            return Ok(DeleteOutcome::FailedEvent);
        }
        let now = format_timestamp(&Utc::now());
        let mut cascaded = Vec::new();
        let mut tx = self.pool.begin().await?;
        let outcome = self.delete_tree(&mut tx, &id, &now, cascade, &mut cascaded).await?;
        if outcome != DeleteOutcome::Success {
            tx.rollback().await?;
            tracing::info!(entity = %self.definition.name, id = %id, outcome = ?outcome, "delete refused");
            return Ok(outcome);
        }
        tx.commit().await?;
        tracing::info!(
            entity = %self.definition.name,
            id = %id,
            cascaded = cascaded.len(),
            "deleted"
        );

        for (engine, child) in &cascaded {
            engine.events.fire(Phase::After, Operation::Delete, child);
        }
        self.events.fire(Phase::After, Operation::Delete, entity);
        Ok(DeleteOutcome::Success)
    }

    /// Soft-delete `id` and, with `cascade`, every live row below it. The row is marked
    /// before its children are visited, so a reference cycle back to it finds nothing live.
    fn delete_tree<'a>(
        &'a self,
        conn: &'a mut AnyConnection,
        id: &'a EntityId,
        now: &'a str,
        cascade: bool,
        cascaded: &'a mut Vec<(Arc<CrudService>, Entity)>,
    ) -> DeleteFuture<'a> {
        Box::pin(async move {
            if !cascade {
                for rel in &self.definition.children {
                    let mut refers = vec![Condition::eq(rel.field.clone(), Value::from(id.clone()))];
                    if rel.entity == self.definition.name {
                        refers.push(Condition::new("id", FilterOp::NotEq, Value::from(id.clone())));
                    }
                    if count(conn, self.dialect, &rel.table, &refers).await? > 0 {
                        return Ok(DeleteOutcome::FailedStillReferenced);
                    }
                }
            }
            let q = soft_delete(&self.definition.table, self.dialect, id, now);
            if execute(conn, &q).await? == 0 {
                tracing::warn!(entity = %self.definition.name, id = %id, "delete matched no live row");
            }
            if !cascade {
                return Ok(DeleteOutcome::Success);
            }
            for rel in &self.definition.children {
                let child = self.engine_for(&rel.entity)?;
                let query = ListQuery {
                    conditions: vec![Condition::eq(rel.field.clone(), Value::from(id.clone()))],
                    ..ListQuery::default()
                };
                for row in child.query_rows(conn, &query).await? {
                    let child_id = row.id().ok_or(CrudError::MissingId)?;
                    // Reached earlier in this walk through another relation.
                    if cascaded
                        .iter()
                        .any(|(e, r)| e.definition.name == rel.entity && r.id().as_ref() == Some(&child_id))
                    {
                        continue;
                    }
                    if !child.events.fire(Phase::Before, Operation::Delete, &row) {
                        tracing::info!(entity = %rel.entity, "cascaded delete vetoed by hook");
                        return Ok(DeleteOutcome::FailedEvent);
                    }
                    let outcome = child.delete_tree(conn, &child_id, now, true, cascaded).await?;
                    if outcome != DeleteOutcome::Success {
                        return Ok(outcome);
                    }
                    cascaded.push((child.clone(), row));
                }
            }
            Ok(DeleteOutcome::Success)
        })
    }

    /// Rows of any table matching `conditions`, optionally live rows only.
    pub async fn count_by(
        &self,
        table: &str,
        conditions: &[Condition],
        exclude_deleted: bool,
    ) -> Result<i64, CrudError> {
        let q = count_where(table, self.dialect, conditions, exclude_deleted)?;
        let mut conn = self.pool.acquire().await?;
        let row = fetch_one(&mut conn, &q).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    /// Every live row of `entity_name` as (id, display name), ordered by the display field.
    /// Without a display field the name is the id.
    pub async fn get_id_to_name_map(
        &self,
        entity_name: &str,
        name_field: Option<&str>,
    ) -> Result<Vec<(EntityId, String)>, CrudError> {
        let target = self.definition_of(entity_name)?;
        if let Some(nf) = name_field {
            if !target.is_column(nf) {
                return Err(CrudError::UnknownField {
                    entity: entity_name.to_string(),
                    field: nf.to_string(),
                });
            }
        }
        let q = select_id_names(&target.table, name_field);
        let mut conn = self.pool.acquire().await?;
        let rows = fetch_all(&mut conn, &q).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(id) = read_id(row, "id", self.id_kind())? else {
                continue;
            };
            let name = match name_field {
                Some(_) => row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
                None => id.to_string(),
            };
            out.push((id, name));
        }
        Ok(out)
    }

    /// Resolve every reference field of `entities` to `{id, name}` in place.
    pub async fn fetch_references(&self, entities: &mut [Entity]) -> Result<(), CrudError> {
        if entities.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.acquire().await?;
        self.resolve_references(&mut conn, entities).await
    }

    /// New entity of this type holding every field's configured default.
    pub fn create_empty(&self) -> Entity {
        let mut e = Entity::new(self.definition.name.clone());
        for f in &self.definition.fields {
            e.set(f.name.clone(), f.default.clone());
        }
        e
    }

    pub async fn create_files(&self, entity: &Entity) -> Result<bool, CrudError> {
        self.run_files(Operation::CreateFiles, FileAction::Create, entity, None)
            .await
    }

    pub async fn update_files(&self, entity: &Entity) -> Result<bool, CrudError> {
        self.run_files(Operation::UpdateFiles, FileAction::Update, entity, None)
            .await
    }

    pub async fn delete_files(&self, entity: &Entity) -> Result<bool, CrudError> {
        self.run_files(Operation::DeleteFiles, FileAction::Delete, entity, None)
            .await
    }

    pub async fn delete_file(&self, entity: &Entity, field: &str) -> Result<bool, CrudError> {
        self.run_files(Operation::DeleteFile, FileAction::Delete, entity, Some(field))
            .await
    }

    pub async fn render_file(&self, entity: &Entity, field: &str) -> Result<Vec<u8>, CrudError> {
        self.file_field(field)?;
        self.files.render_file(entity, &self.definition, field).await
    }

    async fn run_files(
        &self,
        op: Operation,
        action: FileAction,
        entity: &Entity,
        only: Option<&str>,
    ) -> Result<bool, CrudError> {
        if !self.events.fire(Phase::Before, op, entity) {
            tracing::info!(entity = %self.definition.name, operation = %op, "file operation vetoed by hook");
            return Ok(false);
        }
        let fields: Vec<&str> = match only {
            Some(f) => vec![self.file_field(f)?],
            None => self.definition.file_fields().map(|f| f.name.as_str()).collect(),
        };
        for field in fields {
            match action {
                FileAction::Create => self.files.create_file(entity, &self.definition, field).await?,
                FileAction::Update => self.files.update_file(entity, &self.definition, field).await?,
                FileAction::Delete => self.files.delete_file(entity, &self.definition, field).await?,
            }
        }
        self.events.fire(Phase::After, op, entity);
        Ok(true)
    }

    fn file_field<'f>(&self, field: &'f str) -> Result<&'f str, CrudError> {
        match self.definition.field_type(field) {
            Some(FieldType::Scalar(ScalarKind::File)) => Ok(field),
            _ => Err(CrudError::UnknownField {
                entity: self.definition.name.clone(),
                field: field.to_string(),
            }),
        }
    }

    pub(crate) fn engine_for(&self, entity_name: &str) -> Result<Arc<CrudService>, CrudError> {
        let lookup = self.lookup.upgrade().ok_or(CrudError::RegistryDropped)?;
        lookup
            .engine(entity_name)
            .ok_or_else(|| CrudError::UnknownEntity(entity_name.to_string()))
    }

    pub(crate) fn definition_of(&self, entity_name: &str) -> Result<Arc<EntityDefinition>, CrudError> {
        if entity_name == self.definition.name {
            return Ok(self.definition.clone());
        }
        Ok(self.engine_for(entity_name)?.definition.clone())
    }

    /// Base rows only; references stay unresolved and many-fields unset.
    async fn query_rows(&self, conn: &mut AnyConnection, query: &ListQuery) -> Result<Vec<Entity>, CrudError> {
        let q = select_list(&self.definition, self.dialect, self.id_kind(), query)?;
        let rows = fetch_all(conn, &q).await?;
        rows.iter().map(|r| self.hydrate(r)).collect()
    }

    fn hydrate(&self, row: &AnyRow) -> Result<Entity, CrudError> {
        let kind = self.id_kind();
        let mut e = Entity::new(self.definition.name.clone());
        e.set("id", read_id(row, "id", kind)?.map(Value::from));
        for ts in ["created_at", "updated_at", "deleted_at"] {
            let raw: Option<String> = row.try_get(ts)?;
            e.set(ts, raw.as_deref().and_then(parse_timestamp));
        }
        e.set("version", row.try_get::<Option<i64>, _>("version")?);
        for f in self.definition.column_fields() {
            let name = f.name.as_str();
            let value = match &f.field_type {
                FieldType::Many(_) => continue,
                FieldType::Boolean => Value::Bool(row.try_get::<Option<i64>, _>(name)?.is_some_and(|n| n != 0)),
                FieldType::Reference(_) => read_id(row, name, kind)?.map(Reference::unresolved).into(),
                FieldType::Scalar(ScalarKind::Integer) => row.try_get::<Option<i64>, _>(name)?.into(),
                FieldType::Scalar(ScalarKind::Float) => row.try_get::<Option<f64>, _>(name)?.into(),
                FieldType::Scalar(ScalarKind::Date) => {
                    let raw: Option<String> = row.try_get(name)?;
                    match raw {
                        Some(s) => parse_date(&s).map(Value::Date).unwrap_or(Value::Text(s)),
                        None => Value::Null,
                    }
                }
                FieldType::Scalar(ScalarKind::DateTime) => {
                    let raw: Option<String> = row.try_get(name)?;
                    match raw {
                        Some(s) => parse_timestamp(&s).map(Value::DateTime).unwrap_or(Value::Text(s)),
                        None => Value::Null,
                    }
                }
                FieldType::Scalar(_) => row.try_get::<Option<String>, _>(name)?.into(),
            };
            e.set(name, value);
        }
        Ok(e)
    }

    async fn enrich(&self, conn: &mut AnyConnection, entities: &mut [Entity]) -> Result<(), CrudError> {
        if entities.is_empty() {
            return Ok(());
        }
        self.resolve_references(conn, entities).await?;
        self.attach_many(conn, entities).await
    }

    /// Coerce a raw value to this installation's id representation.
    fn normalize_id(&self, v: &Value) -> Option<EntityId> {
        match (self.id_kind(), v.as_id()?) {
            (IdKind::Sequential, EntityId::Uuid(s)) => s.trim().parse().ok().map(EntityId::Int),
            (IdKind::Uuid, EntityId::Int(n)) => Some(EntityId::Uuid(n.to_string())),
            (_, id) => Some(id),
        }
    }

    async fn resolve_references(&self, conn: &mut AnyConnection, entities: &mut [Entity]) -> Result<(), CrudError> {
        for (f, r) in self.definition.reference_fields() {
            let mut ids = Vec::new();
            let mut seen = HashSet::new();
            for e in entities.iter() {
                if let Some(id) = self.normalize_id(e.get(&f.name)) {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                    }
                }
            }
            if ids.is_empty() {
                continue;
            }
            let target = self.definition_of(&r.entity)?;
            let mut names: HashMap<EntityId, Option<String>> = HashMap::new();
            for chunk in ids.chunks(IN_CHUNK) {
                let q = select_names_in(&target.table, r.name_field.as_deref(), chunk, self.dialect);
                for row in fetch_all(conn, &q).await? {
                    let Some(id) = read_id(&row, "id", self.id_kind())? else {
                        continue;
                    };
                    let name = match r.name_field {
                        Some(_) => row.try_get::<Option<String>, _>("name")?,
                        None => Some(id.to_string()),
                    };
                    names.insert(id, name);
                }
            }
            for e in entities.iter_mut() {
                if let Some(id) = self.normalize_id(e.get(&f.name)) {
                    let name = names.get(&id).cloned().flatten();
                    e.set(f.name.clone(), Reference { id, name });
                }
            }
        }
        Ok(())
    }

    async fn attach_many(&self, conn: &mut AnyConnection, entities: &mut [Entity]) -> Result<(), CrudError> {
        let owners: Vec<EntityId> = entities.iter().filter_map(Entity::id).collect();
        for (f, many) in self.definition.many_fields() {
            let target = self.definition_of(&many.entity)?;
            let mut by_owner: HashMap<EntityId, Vec<Reference>> = HashMap::new();
            for chunk in owners.chunks(IN_CHUNK) {
                let q = select_many_in(many, &target.table, chunk, self.dialect);
                for row in fetch_all(conn, &q).await? {
                    let (Some(this), Some(that)) = (
                        read_id(&row, "this_id", self.id_kind())?,
                        read_id(&row, "that_id", self.id_kind())?,
                    ) else {
                        continue;
                    };
                    let name = match many.name_field {
                        Some(_) => row.try_get::<Option<String>, _>("name")?,
                        None => None,
                    };
                    by_owner.entry(this).or_default().push(Reference { id: that, name });
                }
            }
            for e in entities.iter_mut() {
                let list = e.id().and_then(|id| by_owner.remove(&id)).unwrap_or_default();
                e.set(f.name.clone(), Value::Many(list));
            }
        }
        Ok(())
    }

    /// Replace the association set of every many-field the entity carries.
    /// Fields absent from the entity keep their stored associations.
    async fn replace_many(&self, conn: &mut AnyConnection, id: &EntityId, entity: &Entity) -> Result<(), CrudError> {
        for (f, many) in self.definition.many_fields() {
            if !entity.contains(&f.name) {
                continue;
            }
            let wanted: Vec<EntityId> = match entity.get(&f.name) {
                Value::Null => Vec::new(),
                Value::Many(refs) => {
                    let mut seen = HashSet::new();
                    refs.iter()
                        .map(|r| r.id.clone())
                        .filter(|id| seen.insert(id.clone()))
                        .collect()
                }
                other => {
                    return Err(CrudError::InvalidValue {
                        field: f.name.clone(),
                        reason: format!("{:?} is not a collection of references", other),
                    })
                }
            };
            execute(conn, &delete_many(many, self.dialect, id)).await?;
            if !wanted.is_empty() {
                execute(conn, &insert_many(many, self.dialect, id, &wanted)).await?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CrudService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudService")
            .field("entity", &self.definition.name)
            .field("dialect", &self.dialect)
            .field("id_kind", &self.id_kind())
            .field("events", &self.events)
            .finish()
    }
}

fn read_id(row: &AnyRow, column: &str, kind: IdKind) -> Result<Option<EntityId>, CrudError> {
    Ok(match kind {
        IdKind::Sequential => row.try_get::<Option<i64>, _>(column)?.map(EntityId::Int),
        IdKind::Uuid => row.try_get::<Option<String>, _>(column)?.map(EntityId::Uuid),
    })
}

async fn fetch_all(conn: &mut AnyConnection, q: &QueryBuf) -> Result<Vec<AnyRow>, CrudError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    Ok(bind_all(sqlx::query(&q.sql), &q.params)
        .fetch_all(&mut *conn)
        .await?)
}

async fn fetch_one(conn: &mut AnyConnection, q: &QueryBuf) -> Result<AnyRow, CrudError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    Ok(bind_all(sqlx::query(&q.sql), &q.params)
        .fetch_one(&mut *conn)
        .await?)
}

async fn execute(conn: &mut AnyConnection, q: &QueryBuf) -> Result<u64, CrudError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
    Ok(bind_all(sqlx::query(&q.sql), &q.params)
        .execute(&mut *conn)
        .await?
        .rows_affected())
}

async fn count(
    conn: &mut AnyConnection,
    dialect: Dialect,
    table: &str,
    conditions: &[Condition],
) -> Result<i64, CrudError> {
    let q = count_where(table, dialect, conditions, true)?;
    let row = fetch_one(conn, &q).await?;
    Ok(row.try_get::<i64, _>(0)?)
}
