//! Resolved entity definitions: validated, typed and cross-linked for runtime use.

use crate::entity::{is_system_field, Value};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Kinds of plain column fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    Text,
    Multiline,
    Url,
    Integer,
    Float,
    Date,
    DateTime,
    File,
}

impl ScalarKind {
    pub fn parse(type_name: &str) -> Option<Self> {
        Some(match type_name.to_lowercase().as_str() {
            "text" => ScalarKind::Text,
            "multiline" => ScalarKind::Multiline,
            "url" => ScalarKind::Url,
            "integer" | "int" => ScalarKind::Integer,
            "float" => ScalarKind::Float,
            "date" => ScalarKind::Date,
            "datetime" => ScalarKind::DateTime,
            "file" => ScalarKind::File,
            _ => return None,
        })
    }
}

/// Foreign key to another entity, shown by an optional display field of the target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceField {
    pub entity: String,
    pub name_field: Option<String>,
}

/// Many-to-many relation backed by a two-column join table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManyField {
    pub entity: String,
    pub table: String,
    pub this_field: String,
    pub that_field: String,
    pub name_field: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    Boolean,
    Reference(ReferenceField),
    Many(ManyField),
    Scalar(ScalarKind),
}

impl FieldType {
    pub fn is_many(&self) -> bool {
        matches!(self, FieldType::Many(_))
    }
}

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: String,
    pub label: Option<String>,
    pub field_type: FieldType,
    pub required: bool,
    pub unique: bool,
    pub editable: bool,
    pub pattern: Option<Regex>,
    pub default: Value,
}

/// Rows of `table` whose `field` points at the parent; deleted with it on cascade.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildRelation {
    pub table: String,
    pub field: String,
    pub entity: String,
}

#[derive(Clone, Debug)]
pub struct EntityDefinition {
    pub name: String,
    pub table: String,
    pub label: Option<String>,
    pub fields: Vec<FieldDef>,
    pub list_fields: Vec<String>,
    pub children: Vec<ChildRelation>,
    pub page_size: u32,
    pub delete_cascade: bool,
}

impl EntityDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.field(name).map(|f| &f.field_type)
    }

    /// True for system fields and every field stored as a column of the base table.
    pub fn is_column(&self, name: &str) -> bool {
        is_system_field(name) || self.field(name).is_some_and(|f| !f.field_type.is_many())
    }

    /// Fields stored in the base table (everything except many-to-many).
    pub fn column_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.field_type.is_many())
    }

    /// Fields written on create and update.
    pub fn editable_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.column_fields().filter(|f| f.editable)
    }

    pub fn many_fields(&self) -> impl Iterator<Item = (&FieldDef, &ManyField)> {
        self.fields.iter().filter_map(|f| match &f.field_type {
            FieldType::Many(m) => Some((f, m)),
            _ => None,
        })
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = (&FieldDef, &ReferenceField)> {
        self.fields.iter().filter_map(|f| match &f.field_type {
            FieldType::Reference(r) => Some((f, r)),
            _ => None,
        })
    }

    pub fn file_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|f| f.field_type == FieldType::Scalar(ScalarKind::File))
    }

    /// Fields shown in listings: the configured list, else every field.
    pub fn list_field_names(&self) -> Vec<&str> {
        if self.list_fields.is_empty() {
            self.fields.iter().map(|f| f.name.as_str()).collect()
        } else {
            self.list_fields.iter().map(String::as_str).collect()
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Definitions {
    pub entities: Vec<Arc<EntityDefinition>>,
    pub by_name: HashMap<String, Arc<EntityDefinition>>,
}

impl Definitions {
    pub fn get(&self, name: &str) -> Option<&Arc<EntityDefinition>> {
        self.by_name.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityDefinition>> {
        self.entities.iter()
    }
}
