//! Entity records and the dynamically typed values they hold.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Field names every managed table carries, in select order.
pub const SYSTEM_FIELDS: [&str; 5] = ["id", "created_at", "updated_at", "deleted_at", "version"];

pub fn is_system_field(name: &str) -> bool {
    SYSTEM_FIELDS.contains(&name)
}

/// Primary identifier of a row: database sequence or UUID string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Uuid(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(n) => write!(f, "{}", n),
            EntityId::Uuid(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Int(n)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::Uuid(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId::Uuid(s)
    }
}

/// A reference field after resolution: the foreign id plus the target's display value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reference {
    pub id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Reference {
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Reference {
            id: id.into(),
            name: Some(name.into()),
        }
    }

    /// Reference that only knows its id (not yet resolved, or target gone).
    pub fn unresolved(id: impl Into<EntityId>) -> Self {
        Reference {
            id: id.into(),
            name: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Reference(Reference),
    Many(Vec<Reference>),
}

static NULL: Value = Value::Null;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&[Reference]> {
        match self {
            Value::Many(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret as a row id: plain integers and strings count, as does a reference.
    pub fn as_id(&self) -> Option<EntityId> {
        match self {
            Value::Int(n) => Some(EntityId::Int(*n)),
            Value::Text(s) => Some(EntityId::Uuid(s.clone())),
            Value::Reference(r) => Some(r.id.clone()),
            _ => None,
        }
    }

    /// Empty means null, an empty string or an empty many-collection.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::Many(v) => v.is_empty(),
            _ => false,
        }
    }

    /// Convert a JSON literal (e.g. a configured default). Objects and arrays become null.
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            _ => Value::Null,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::DateTime(d)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        match id {
            EntityId::Int(n) => Value::Int(n),
            EntityId::Uuid(s) => Value::Text(s),
        }
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::Reference(r)
    }
}

impl From<Vec<Reference>> for Value {
    fn from(v: Vec<Reference>) -> Self {
        Value::Many(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One record of an entity type: field name to value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Entity {
    #[serde(skip)]
    entity_name: String,
    #[serde(flatten)]
    values: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Entity {
            entity_name: entity_name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Value of a field; unset fields read as null.
    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn id(&self) -> Option<EntityId> {
        match self.get("id") {
            Value::Int(n) => Some(EntityId::Int(*n)),
            Value::Text(s) => Some(EntityId::Uuid(s.clone())),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<i64> {
        self.get("version").as_i64()
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self.get("deleted_at") {
            Value::DateTime(d) => Some(*d),
            _ => None,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_read_as_null() {
        let e = Entity::new("book");
        assert!(e.get("title").is_null());
        assert_eq!(e.id(), None);
        assert_eq!(e.version(), None);
    }

    #[test]
    fn id_follows_stored_representation() {
        let mut e = Entity::new("book");
        e.set("id", EntityId::Int(7));
        assert_eq!(e.id(), Some(EntityId::Int(7)));
        e.set("id", "0b7e7dee-87b2-4dca-a0f7-c9d1a0c2d3f4");
        assert_eq!(
            e.id(),
            Some(EntityId::Uuid("0b7e7dee-87b2-4dca-a0f7-c9d1a0c2d3f4".into()))
        );
    }

    #[test]
    fn reference_serializes_as_id_and_name() {
        let mut e = Entity::new("book");
        e.set("library", Reference::new(1i64, "lib a"));
        e.set("secondLibrary", Reference::unresolved(2i64));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["library"], serde_json::json!({ "id": 1, "name": "lib a" }));
        assert_eq!(json["secondLibrary"], serde_json::json!({ "id": 2 }));
    }

    #[test]
    fn as_id_accepts_raw_ids_and_references() {
        assert_eq!(Value::Int(3).as_id(), Some(EntityId::Int(3)));
        assert_eq!(Value::from(Reference::unresolved(4i64)).as_id(), Some(EntityId::Int(4)));
        assert_eq!(Value::Bool(true).as_id(), None);
    }

    #[test]
    fn json_defaults_convert() {
        assert_eq!(Value::from_json(&serde_json::json!(5)), Value::Int(5));
        assert_eq!(Value::from_json(&serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from_json(&serde_json::json!("x")), Value::Text("x".into()));
        assert_eq!(Value::from_json(&serde_json::json!([1])), Value::Null);
    }
}
