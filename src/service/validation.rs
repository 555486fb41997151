//! Entity validation from field definitions.

use crate::config::{FieldDef, FieldType, ScalarKind};
use crate::entity::{Entity, Value};
use crate::error::CrudError;
use crate::service::CrudService;
use crate::sql::{parse_date, parse_timestamp, BindValue, Condition, FilterOp};

pub struct EntityValidator;

impl EntityValidator {
    /// Check every field of `entity` against its definition; returns the first failure.
    pub async fn validate(service: &CrudService, entity: &Entity) -> Result<(), CrudError> {
        let def = service.definition();
        for f in &def.fields {
            let v = entity.get(&f.name);
            if f.required && v.is_empty() {
                return Err(failure(&f.name, "is required"));
            }
            if v.is_null() {
                continue;
            }
            validate_shape(service, f, v)?;
            if let (Some(re), Some(s)) = (&f.pattern, v.as_str()) {
                if !re.is_match(s) {
                    return Err(failure(&f.name, "does not match required pattern"));
                }
            }
            if f.unique && !f.field_type.is_many() && !v.is_empty() {
                let mut conditions = vec![Condition::eq(f.name.clone(), typed(f, v))];
                if let Some(id) = entity.id() {
                    conditions.push(Condition::new("id", FilterOp::NotEq, Value::from(id)));
                }
                if service.count_by(&def.table, &conditions, true).await? > 0 {
                    return Err(failure(&f.name, "must be unique"));
                }
            }
            if let FieldType::Reference(r) = &f.field_type {
                let target = service.definition_of(&r.entity)?;
                let id = v
                    .as_id()
                    .ok_or_else(|| failure(&f.name, "must reference an id"))?;
                let live = service
                    .count_by(&target.table, &[Condition::eq("id", Value::from(id.clone()))], true)
                    .await?;
                if live == 0 {
                    return Err(failure(&f.name, format!("{} {} does not exist", r.entity, id)));
                }
            }
        }
        Ok(())
    }
}

fn failure(field: &str, reason: impl Into<String>) -> CrudError {
    CrudError::Validation {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Text in a date or datetime field as the typed value, so the comparison is cast.
fn typed(f: &FieldDef, v: &Value) -> Value {
    let parsed = match (&f.field_type, v.as_str()) {
        (FieldType::Scalar(ScalarKind::Date), Some(s)) => parse_date(s).map(Value::Date),
        (FieldType::Scalar(ScalarKind::DateTime), Some(s)) => parse_timestamp(s).map(Value::DateTime),
        _ => None,
    };
    parsed.unwrap_or_else(|| v.clone())
}

fn validate_shape(service: &CrudService, f: &FieldDef, v: &Value) -> Result<(), CrudError> {
    match &f.field_type {
        FieldType::Many(_) => {
            return match v {
                Value::Many(_) => Ok(()),
                _ => Err(failure(&f.name, "must be a list of references")),
            }
        }
        FieldType::Scalar(ScalarKind::Date) => {
            if let Some(s) = v.as_str() {
                if parse_date(s).is_none() {
                    return Err(failure(&f.name, "must be a valid date"));
                }
            }
        }
        FieldType::Scalar(ScalarKind::DateTime) => {
            if let Some(s) = v.as_str() {
                if parse_timestamp(s).is_none() {
                    return Err(failure(&f.name, "must be a valid timestamp"));
                }
            }
        }
        FieldType::Scalar(ScalarKind::Url) => {
            if let Some(s) = v.as_str() {
                if !s.is_empty() && !(s.starts_with("http://") || s.starts_with("https://")) {
                    return Err(failure(&f.name, "must be an http(s) url"));
                }
            }
        }
        _ => {}
    }
    BindValue::for_field(&f.field_type, service.id_kind(), &f.name, v)
        .map(|_| ())
        .map_err(|e| match e {
            CrudError::InvalidValue { field, reason } => CrudError::Validation { field, reason },
            other => other,
        })
}
