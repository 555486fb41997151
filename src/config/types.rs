//! Raw definition types as they appear in a JSON definitions file.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferenceConfig {
    pub entity: String,
    #[serde(default)]
    pub name_field: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManyConfig {
    pub entity: String,
    /// Join table; the field name when omitted.
    #[serde(default)]
    pub table: Option<String>,
    pub this_field: String,
    pub that_field: String,
    #[serde(default)]
    pub name_field: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default = "default_true")]
    pub editable: bool,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub reference: Option<ReferenceConfig>,
    #[serde(default)]
    pub many: Option<ManyConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    /// Table name; the entity name when omitted.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub list_fields: Vec<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub delete_cascade: bool,
}

impl EntityConfig {
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }
}

/// All entity definitions of one installation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    pub entities: Vec<EntityConfig>,
}
