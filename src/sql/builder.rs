//! Builds parameterized SELECT, COUNT, INSERT, UPDATE and soft-delete SQL from entity definitions.

use crate::config::{EntityDefinition, FieldType, ManyField, ScalarKind};
use crate::entity::{Entity, EntityId, Value};
use crate::error::CrudError;
use crate::ids::IdKind;
use crate::sql::{BindValue, Dialect, SqlCast};
use std::str::FromStr;

/// Quote identifier (safe: only from definitions).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, dialect: Dialect, v: BindValue, cast: Option<SqlCast>) -> String {
        self.params.push(v);
        dialect.placeholder(self.params.len(), cast)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterOp {
    #[default]
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl FilterOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::NotEq => "<>",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Like => "LIKE",
        }
    }
}

impl FromStr for FilterOp {
    type Err = CrudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_uppercase().as_str() {
            "=" | "==" => FilterOp::Eq,
            "!=" | "<>" => FilterOp::NotEq,
            "<" => FilterOp::Lt,
            "<=" => FilterOp::Le,
            ">" => FilterOp::Gt,
            ">=" => FilterOp::Ge,
            "LIKE" => FilterOp::Like,
            _ => {
                return Err(CrudError::InvalidValue {
                    field: "operator".into(),
                    reason: format!("unsupported operator '{}'", s),
                })
            }
        })
    }
}

/// One filter term: `field <op> value`, or `IS [NOT] NULL` for a null value.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Condition {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub ascending: bool,
}

/// Filters, ordering and paging for a listing. `amount: None` means no limit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListQuery {
    pub conditions: Vec<Condition>,
    pub skip: Option<u64>,
    pub amount: Option<u64>,
    pub sort: Option<Sort>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::eq(field, value));
        self
    }

    pub fn filter_op(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::new(field, op, value));
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn amount(mut self, n: u64) -> Self {
        self.amount = Some(n);
        self
    }

    /// Sort by a column; ascending unless `ascending` is `Some(false)`.
    pub fn sort_by(mut self, field: impl Into<String>, ascending: Option<bool>) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            ascending: ascending != Some(false),
        });
        self
    }

    /// Zero-based page of `page_size` rows.
    pub fn page(self, page: u64, page_size: u32) -> Self {
        let size = u64::from(page_size);
        self.skip(page * size).amount(size)
    }
}

fn unknown_field(def: &EntityDefinition, field: &str) -> CrudError {
    CrudError::UnknownField {
        entity: def.name.clone(),
        field: field.to_string(),
    }
}

fn is_timestamp_column(name: &str) -> bool {
    matches!(name, "created_at" | "updated_at" | "deleted_at")
}

fn text_cast(expr: &str, alias: &str) -> String {
    format!("CAST({} AS TEXT) AS {}", expr, quoted(alias))
}

/// SELECT list: system columns then base-table fields. Dates and timestamps come back as text.
fn select_column_list(def: &EntityDefinition) -> String {
    let mut cols = vec![quoted("id")];
    for ts in ["created_at", "updated_at", "deleted_at"] {
        cols.push(text_cast(&quoted(ts), ts));
    }
    cols.push(quoted("version"));
    for f in def.column_fields() {
        if SqlCast::for_field(&f.field_type).is_some() {
            cols.push(text_cast(&quoted(&f.name), &f.name));
        } else {
            cols.push(quoted(&f.name));
        }
    }
    cols.join(", ")
}

/// Bind value and cast for a base-table column of `def`.
fn column_bind(
    def: &EntityDefinition,
    id_kind: IdKind,
    field: &str,
    v: &Value,
) -> Result<(BindValue, Option<SqlCast>), CrudError> {
    match field {
        "id" => Ok((BindValue::for_id(id_kind, field, v)?, None)),
        "version" => Ok((
            BindValue::for_field(&FieldType::Scalar(ScalarKind::Integer), id_kind, field, v)?,
            None,
        )),
        f if is_timestamp_column(f) => Ok((
            BindValue::for_field(&FieldType::Scalar(ScalarKind::DateTime), id_kind, field, v)?,
            Some(SqlCast::Timestamp),
        )),
        _ => {
            let ft = def
                .field_type(field)
                .filter(|t| !t.is_many())
                .ok_or_else(|| unknown_field(def, field))?;
            Ok((BindValue::for_field(ft, id_kind, field, v)?, SqlCast::for_field(ft)))
        }
    }
}

fn push_conditions<F>(
    q: &mut QueryBuf,
    dialect: Dialect,
    where_parts: &mut Vec<String>,
    conditions: &[Condition],
    bind: F,
) -> Result<(), CrudError>
where
    F: Fn(&Condition) -> Result<(BindValue, Option<SqlCast>), CrudError>,
{
    for c in conditions {
        let col = quoted(&c.field);
        if c.value.is_null() {
            let test = if c.op == FilterOp::NotEq { "IS NOT NULL" } else { "IS NULL" };
            where_parts.push(format!("{} {}", col, test));
            continue;
        }
        let (value, cast) = bind(c)?;
        let ph = q.push_param(dialect, value, cast);
        where_parts.push(format!("{} {} {}", col, c.op.as_sql(), ph));
    }
    Ok(())
}

fn in_list(q: &mut QueryBuf, dialect: Dialect, ids: &[EntityId]) -> String {
    ids.iter()
        .map(|id| q.push_param(dialect, BindValue::from_id(id), None))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SELECT live rows with filters, ORDER BY (sort field, then id) and paging.
pub fn select_list(
    def: &EntityDefinition,
    dialect: Dialect,
    id_kind: IdKind,
    query: &ListQuery,
) -> Result<QueryBuf, CrudError> {
    let mut q = QueryBuf::new();
    for c in &query.conditions {
        if !def.is_column(&c.field) {
            return Err(unknown_field(def, &c.field));
        }
    }
    let mut where_parts = vec![format!("{} IS NULL", quoted("deleted_at"))];
    push_conditions(&mut q, dialect, &mut where_parts, &query.conditions, |c| {
        column_bind(def, id_kind, &c.field, &c.value)
    })?;

    let order_clause = match &query.sort {
        Some(sort) => {
            if !def.is_column(&sort.field) {
                return Err(unknown_field(def, &sort.field));
            }
            let dir = if sort.ascending { "ASC" } else { "DESC" };
            if sort.field == "id" {
                format!(" ORDER BY {} {}", quoted("id"), dir)
            } else {
                format!(" ORDER BY {} {}, {} ASC", quoted(&sort.field), dir, quoted("id"))
            }
        }
        None => format!(" ORDER BY {}", quoted("id")),
    };

    q.sql = format!(
        "SELECT {} FROM {} WHERE {}{}{}",
        select_column_list(def),
        quoted(&def.table),
        where_parts.join(" AND "),
        order_clause,
        dialect.limit_clause(query.skip, query.amount)
    );
    Ok(q)
}

/// SELECT COUNT(*) over any table; values are bound by their own type.
pub fn count_where(
    table: &str,
    dialect: Dialect,
    conditions: &[Condition],
    exclude_deleted: bool,
) -> Result<QueryBuf, CrudError> {
    let mut q = QueryBuf::new();
    let mut where_parts = Vec::new();
    push_conditions(&mut q, dialect, &mut where_parts, conditions, |c| {
        Ok((BindValue::from_value(&c.value), SqlCast::for_value(&c.value)))
    })?;
    if exclude_deleted {
        where_parts.push(format!("{} IS NULL", quoted("deleted_at")));
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    q.sql = format!("SELECT COUNT(*) FROM {}{}", quoted(table), where_clause);
    Ok(q)
}

/// INSERT editable fields plus managed columns; `version` starts at 0. Returns the id.
pub fn insert(
    def: &EntityDefinition,
    dialect: Dialect,
    id_kind: IdKind,
    entity: &Entity,
    id: Option<&EntityId>,
    now: &str,
) -> Result<QueryBuf, CrudError> {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    if let Some(id) = id {
        cols.push(quoted("id"));
        placeholders.push(q.push_param(dialect, BindValue::from_id(id), None));
    }
    for f in def.editable_fields() {
        let value = BindValue::for_field(&f.field_type, id_kind, &f.name, entity.get(&f.name))?;
        cols.push(quoted(&f.name));
        placeholders.push(q.push_param(dialect, value, SqlCast::for_field(&f.field_type)));
    }
    let now_ph = q.push_param(dialect, BindValue::Text(Some(now.to_string())), Some(SqlCast::Timestamp));
    cols.push(quoted("created_at"));
    placeholders.push(now_ph.clone());
    cols.push(quoted("updated_at"));
    placeholders.push(now_ph);
    cols.push(quoted("version"));
    placeholders.push("0".into());

    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(&def.table),
        cols.join(", "),
        placeholders.join(", "),
        quoted("id")
    );
    Ok(q)
}

/// Version-checked UPDATE: sets every editable field, bumps version, only on a live row
/// whose version still equals `expected_version`.
pub fn update(
    def: &EntityDefinition,
    dialect: Dialect,
    id_kind: IdKind,
    entity: &Entity,
    id: &EntityId,
    expected_version: i64,
    now: &str,
) -> Result<QueryBuf, CrudError> {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for f in def.editable_fields() {
        let value = BindValue::for_field(&f.field_type, id_kind, &f.name, entity.get(&f.name))?;
        let ph = q.push_param(dialect, value, SqlCast::for_field(&f.field_type));
        sets.push(format!("{} = {}", quoted(&f.name), ph));
    }
    let now_ph = q.push_param(dialect, BindValue::Text(Some(now.to_string())), Some(SqlCast::Timestamp));
    sets.push(format!("{} = {}", quoted("updated_at"), now_ph));
    sets.push(format!("{0} = {0} + 1", quoted("version")));

    let id_ph = q.push_param(dialect, BindValue::from_id(id), None);
    let version_ph = q.push_param(dialect, BindValue::Int(Some(expected_version)), None);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} AND {} = {} AND {} IS NULL",
        quoted(&def.table),
        sets.join(", "),
        quoted("id"),
        id_ph,
        quoted("version"),
        version_ph,
        quoted("deleted_at")
    );
    Ok(q)
}

/// Soft delete: stamp `deleted_at` on one live row.
pub fn soft_delete(table: &str, dialect: Dialect, id: &EntityId, now: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let now_ph = q.push_param(dialect, BindValue::Text(Some(now.to_string())), Some(SqlCast::Timestamp));
    let id_ph = q.push_param(dialect, BindValue::from_id(id), None);
    q.sql = format!(
        "UPDATE {} SET {} = {} WHERE {} = {} AND {} IS NULL",
        quoted(table),
        quoted("deleted_at"),
        now_ph,
        quoted("id"),
        id_ph,
        quoted("deleted_at")
    );
    q
}

/// Live rows of `table` with the given ids: `id` and optionally the display value as `name`.
pub fn select_names_in(table: &str, name_field: Option<&str>, ids: &[EntityId], dialect: Dialect) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cols = match name_field {
        Some(nf) => format!("{}, {}", quoted("id"), text_cast(&quoted(nf), "name")),
        None => quoted("id"),
    };
    if ids.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", cols, quoted(table));
        return q;
    }
    let placeholders = in_list(&mut q, dialect, ids);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}) AND {} IS NULL",
        cols,
        quoted(table),
        quoted("id"),
        placeholders,
        quoted("deleted_at")
    );
    q
}

/// Associations of many owners at once: `this_id`, `that_id` and optionally `name`,
/// restricted to live targets.
pub fn select_many_in(many: &ManyField, target_table: &str, ids: &[EntityId], dialect: Dialect) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = vec![
        format!("t1.{} AS {}", quoted(&many.this_field), quoted("this_id")),
        format!("t1.{} AS {}", quoted(&many.that_field), quoted("that_id")),
    ];
    if let Some(nf) = &many.name_field {
        cols.push(text_cast(&format!("t2.{}", quoted(nf)), "name"));
    }
    let from = format!(
        "{} t1 LEFT JOIN {} t2 ON t2.{} = t1.{}",
        quoted(&many.table),
        quoted(target_table),
        quoted("id"),
        quoted(&many.that_field)
    );
    if ids.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", cols.join(", "), from);
        return q;
    }
    let placeholders = in_list(&mut q, dialect, ids);
    q.sql = format!(
        "SELECT {} FROM {} WHERE t1.{} IN ({}) AND t2.{} IS NULL ORDER BY t1.{}, t1.{}",
        cols.join(", "),
        from,
        quoted(&many.this_field),
        placeholders,
        quoted("deleted_at"),
        quoted(&many.this_field),
        quoted(&many.that_field)
    );
    q
}

/// Remove every association of one owner.
pub fn delete_many(many: &ManyField, dialect: Dialect, id: &EntityId) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_param(dialect, BindValue::from_id(id), None);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        quoted(&many.table),
        quoted(&many.this_field),
        ph
    );
    q
}

/// Insert one owner's associations in a single statement. `that_ids` must be non-empty.
pub fn insert_many(many: &ManyField, dialect: Dialect, id: &EntityId, that_ids: &[EntityId]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let this_ph = q.push_param(dialect, BindValue::from_id(id), None);
    let rows: Vec<String> = that_ids
        .iter()
        .map(|that| {
            let that_ph = q.push_param(dialect, BindValue::from_id(that), None);
            format!("({}, {})", this_ph, that_ph)
        })
        .collect();
    q.sql = format!(
        "INSERT INTO {} ({}, {}) VALUES {}",
        quoted(&many.table),
        quoted(&many.this_field),
        quoted(&many.that_field),
        rows.join(", ")
    );
    q
}

/// Every live row as `id` plus display `name`, ordered by the display column (or id).
pub fn select_id_names(table: &str, name_field: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = match name_field {
        Some(nf) => format!(
            "SELECT {}, {} FROM {} WHERE {} IS NULL ORDER BY {}, {}",
            quoted("id"),
            text_cast(&quoted(nf), "name"),
            quoted(table),
            quoted("deleted_at"),
            quoted(nf),
            quoted("id")
        ),
        None => format!(
            "SELECT {} FROM {} WHERE {} IS NULL ORDER BY {}",
            quoted("id"),
            quoted(table),
            quoted("deleted_at"),
            quoted("id")
        ),
    };
    q
}
