//! Definition validation: uniqueness, referential integrity and relation blocks.

use crate::config::{EntityConfig, FieldConfig, FullConfig};
use crate::entity::is_system_field;
use crate::error::DefinitionError;
use regex::Regex;
use std::collections::{HashMap, HashSet};

fn invalid(entity: &EntityConfig, field: &FieldConfig, reason: impl Into<String>) -> DefinitionError {
    DefinitionError::InvalidField {
        entity: entity.name.clone(),
        field: field.name.clone(),
        reason: reason.into(),
    }
}

pub fn validate(config: &FullConfig) -> Result<(), DefinitionError> {
    let mut by_name: HashMap<&str, &EntityConfig> = HashMap::new();
    let mut tables = HashSet::new();
    for e in &config.entities {
        if by_name.insert(e.name.as_str(), e).is_some() {
            return Err(DefinitionError::DuplicateEntity(e.name.clone()));
        }
        if !tables.insert(e.table_name()) {
            return Err(DefinitionError::DuplicateTable(e.table_name().to_string()));
        }
    }

    for e in &config.entities {
        let mut field_names = HashSet::new();
        for f in &e.fields {
            if is_system_field(&f.name) {
                return Err(invalid(e, f, "name is reserved for a system field"));
            }
            if !field_names.insert(f.name.as_str()) {
                return Err(DefinitionError::DuplicateField {
                    entity: e.name.clone(),
                    field: f.name.clone(),
                });
            }
            if let Some(pattern) = &f.pattern {
                Regex::new(pattern).map_err(|err| invalid(e, f, format!("bad pattern: {}", err)))?;
            }
            match f.type_.to_lowercase().as_str() {
                "reference" => {
                    let rel = f
                        .reference
                        .as_ref()
                        .ok_or_else(|| invalid(e, f, "reference field needs a 'reference' block"))?;
                    check_target(&by_name, &rel.entity, rel.name_field.as_deref())?;
                }
                "many" => {
                    let rel = f
                        .many
                        .as_ref()
                        .ok_or_else(|| invalid(e, f, "many field needs a 'many' block"))?;
                    check_target(&by_name, &rel.entity, rel.name_field.as_deref())?;
                    if rel.this_field == rel.that_field {
                        return Err(invalid(e, f, "this_field and that_field must differ"));
                    }
                }
                other => {
                    if other != "boolean" && crate::config::ScalarKind::parse(other).is_none() {
                        return Err(invalid(e, f, format!("unknown type '{}'", f.type_)));
                    }
                }
            }
        }
        for lf in &e.list_fields {
            if !field_names.contains(lf.as_str()) && !is_system_field(lf) {
                return Err(DefinitionError::MissingReference {
                    kind: "list field",
                    id: format!("{}.{}", e.name, lf),
                });
            }
        }
    }
    Ok(())
}

fn check_target(
    by_name: &HashMap<&str, &EntityConfig>,
    entity: &str,
    name_field: Option<&str>,
) -> Result<(), DefinitionError> {
    let target = by_name.get(entity).ok_or_else(|| DefinitionError::MissingReference {
        kind: "entity",
        id: entity.to_string(),
    })?;
    if let Some(nf) = name_field {
        if !is_system_field(nf) && !target.fields.iter().any(|f| f.name == nf) {
            return Err(DefinitionError::MissingReference {
                kind: "name field",
                id: format!("{}.{}", entity, nf),
            });
        }
    }
    Ok(())
}
