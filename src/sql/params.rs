//! Convert entity values to bindable parameters and stored text back to values.

use crate::config::{FieldType, ScalarKind};
use crate::entity::{EntityId, Value};
use crate::error::CrudError;
use crate::ids::IdKind;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use sqlx::any::AnyArguments;
use sqlx::query::Query;
use sqlx::Any;

/// A value that can be bound through the `Any` driver. Nulls keep their type so
/// PostgreSQL sees a typed parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
}

fn invalid(field: &str, reason: impl Into<String>) -> CrudError {
    CrudError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Parse a timestamp as stored by either backend (RFC 3339, or PostgreSQL's text form).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|dt| dt.date_naive()))
}

impl BindValue {
    pub fn from_id(id: &EntityId) -> Self {
        match id {
            EntityId::Int(n) => BindValue::Int(Some(*n)),
            EntityId::Uuid(s) => BindValue::Text(Some(s.clone())),
        }
    }

    pub fn null_id(id_kind: IdKind) -> Self {
        match id_kind {
            IdKind::Sequential => BindValue::Int(None),
            IdKind::Uuid => BindValue::Text(None),
        }
    }

    /// Untyped conversion, for tables the caller names directly.
    pub fn from_value(v: &Value) -> Self {
        match v {
            Value::Null => BindValue::Text(None),
            Value::Bool(b) => BindValue::Int(Some(i64::from(*b))),
            Value::Int(n) => BindValue::Int(Some(*n)),
            Value::Float(f) => BindValue::Float(Some(*f)),
            Value::Text(s) => BindValue::Text(Some(s.clone())),
            Value::Date(d) => BindValue::Text(Some(format_date(d))),
            Value::DateTime(dt) => BindValue::Text(Some(format_timestamp(dt))),
            Value::Reference(r) => BindValue::from_id(&r.id),
            Value::Many(_) => BindValue::Text(None),
        }
    }

    /// Id column value (primary key or reference) in the installation's id representation.
    pub fn for_id(id_kind: IdKind, field: &str, v: &Value) -> Result<Self, CrudError> {
        if v.is_null() {
            return Ok(BindValue::null_id(id_kind));
        }
        let id = v.as_id().ok_or_else(|| invalid(field, "expected an id"))?;
        Ok(match (id_kind, id) {
            (IdKind::Sequential, EntityId::Int(n)) => BindValue::Int(Some(n)),
            (IdKind::Sequential, EntityId::Uuid(s)) => {
                let n = s.parse().map_err(|_| invalid(field, format!("'{}' is not an integer id", s)))?;
                BindValue::Int(Some(n))
            }
            (IdKind::Uuid, id) => BindValue::Text(Some(id.to_string())),
        })
    }

    /// Typed conversion for a defined field.
    pub fn for_field(field_type: &FieldType, id_kind: IdKind, field: &str, v: &Value) -> Result<Self, CrudError> {
        match field_type {
            FieldType::Many(_) => Err(invalid(field, "many-to-many fields have no column")),
            FieldType::Reference(_) => Self::for_id(id_kind, field, v),
            FieldType::Boolean => Ok(BindValue::Int(Some(i64::from(truthy(v))))),
            FieldType::Scalar(kind) => scalar(*kind, field, v),
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Int(n) => *n != 0,
        Value::Float(f) => *f != 0.0,
        Value::Text(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
        Value::Null => false,
        _ => true,
    }
}

fn scalar(kind: ScalarKind, field: &str, v: &Value) -> Result<BindValue, CrudError> {
    if matches!(v, Value::Reference(_) | Value::Many(_)) {
        return Err(invalid(field, "relation value given for a plain field"));
    }
    Ok(match kind {
        ScalarKind::Integer => BindValue::Int(match v {
            Value::Null => None,
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => Some(
                s.trim()
                    .parse()
                    .map_err(|_| invalid(field, format!("'{}' is not an integer", s)))?,
            ),
            other => return Err(invalid(field, format!("{:?} is not an integer", other))),
        }),
        ScalarKind::Float => BindValue::Float(match v {
            Value::Null => None,
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::Text(s) => Some(
                s.trim()
                    .parse()
                    .map_err(|_| invalid(field, format!("'{}' is not a number", s)))?,
            ),
            other => return Err(invalid(field, format!("{:?} is not a number", other))),
        }),
        ScalarKind::Date => BindValue::Text(match v {
            Value::Null => None,
            Value::Date(d) => Some(format_date(d)),
            Value::DateTime(dt) => Some(format_date(&dt.date_naive())),
            Value::Text(s) => Some(s.clone()),
            other => return Err(invalid(field, format!("{:?} is not a date", other))),
        }),
        ScalarKind::DateTime => BindValue::Text(match v {
            Value::Null => None,
            Value::DateTime(dt) => Some(format_timestamp(dt)),
            Value::Date(d) => d.and_hms_opt(0, 0, 0).map(|n| format_timestamp(&n.and_utc())),
            Value::Text(s) => Some(s.clone()),
            other => return Err(invalid(field, format!("{:?} is not a timestamp", other))),
        }),
        ScalarKind::Text | ScalarKind::Multiline | ScalarKind::Url | ScalarKind::File => BindValue::Text(match v {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Date(d) => Some(format_date(d)),
            Value::DateTime(dt) => Some(format_timestamp(dt)),
            Value::Reference(_) | Value::Many(_) => None,
        }),
    })
}

/// Bind every parameter in order.
pub fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &[BindValue],
) -> Query<'q, Any, AnyArguments<'q>> {
    for p in params {
        query = match p {
            BindValue::Int(v) => query.bind(*v),
            BindValue::Float(v) => query.bind(*v),
            BindValue::Text(v) => query.bind(v.clone()),
        };
    }
    query
}
