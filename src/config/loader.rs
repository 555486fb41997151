//! Load definitions from JSON and resolve them into runtime definitions.

use crate::config::resolved::{
    ChildRelation, Definitions, EntityDefinition, FieldDef, FieldType, ManyField, ReferenceField, ScalarKind,
    DEFAULT_PAGE_SIZE,
};
use crate::config::types::*;
use crate::config::validate;
use crate::entity::Value;
use crate::error::DefinitionError;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Build resolved definitions from raw config (validates first).
pub fn resolve(config: &FullConfig) -> Result<Definitions, DefinitionError> {
    validate(config)?;

    let mut resolved: Vec<EntityDefinition> = Vec::with_capacity(config.entities.len());
    for e in &config.entities {
        let mut fields = Vec::with_capacity(e.fields.len());
        for f in &e.fields {
            fields.push(resolve_field(e, f)?);
        }
        resolved.push(EntityDefinition {
            name: e.name.clone(),
            table: e.table_name().to_string(),
            label: e.label.clone(),
            fields,
            list_fields: e.list_fields.clone(),
            children: Vec::new(),
            page_size: e.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            delete_cascade: e.delete_cascade,
        });
    }

    let index: HashMap<String, usize> = resolved
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name.clone(), i))
        .collect();
    let mut children: Vec<(usize, ChildRelation)> = Vec::new();
    for d in &resolved {
        for (field, rel) in d.reference_fields() {
            let target = index.get(&rel.entity).copied().ok_or_else(|| DefinitionError::MissingReference {
                kind: "entity",
                id: rel.entity.clone(),
            })?;
            children.push((
                target,
                ChildRelation {
                    table: d.table.clone(),
                    field: field.name.clone(),
                    entity: d.name.clone(),
                },
            ));
        }
    }
    for (target, child) in children {
        resolved[target].children.push(child);
    }

    let entities: Vec<Arc<EntityDefinition>> = resolved.into_iter().map(Arc::new).collect();
    let by_name = entities.iter().map(|d| (d.name.clone(), Arc::clone(d))).collect();
    Ok(Definitions { entities, by_name })
}

fn resolve_field(entity: &EntityConfig, f: &FieldConfig) -> Result<FieldDef, DefinitionError> {
    let invalid = |reason: &str| DefinitionError::InvalidField {
        entity: entity.name.clone(),
        field: f.name.clone(),
        reason: reason.to_string(),
    };
    let field_type = match f.type_.to_lowercase().as_str() {
        "boolean" => FieldType::Boolean,
        "reference" => {
            let rel = f.reference.as_ref().ok_or_else(|| invalid("missing reference block"))?;
            FieldType::Reference(ReferenceField {
                entity: rel.entity.clone(),
                name_field: rel.name_field.clone(),
            })
        }
        "many" => {
            let rel = f.many.as_ref().ok_or_else(|| invalid("missing many block"))?;
            FieldType::Many(ManyField {
                entity: rel.entity.clone(),
                table: rel.table.clone().unwrap_or_else(|| f.name.clone()),
                this_field: rel.this_field.clone(),
                that_field: rel.that_field.clone(),
                name_field: rel.name_field.clone(),
            })
        }
        other => FieldType::Scalar(ScalarKind::parse(other).ok_or_else(|| invalid("unknown type"))?),
    };
    let pattern = match &f.pattern {
        Some(p) => Some(Regex::new(p).map_err(|e| invalid(&e.to_string()))?),
        None => None,
    };
    let default = match (&field_type, &f.default) {
        (FieldType::Many(_), _) => Value::Many(Vec::new()),
        (_, Some(v)) => Value::from_json(v),
        (_, None) => Value::Null,
    };
    Ok(FieldDef {
        name: f.name.clone(),
        label: f.label.clone(),
        field_type,
        required: f.required,
        unique: f.unique,
        editable: f.editable,
        pattern,
        default,
    })
}

/// Parse and resolve a JSON definitions document.
pub fn parse_definitions(json: &str) -> Result<Definitions, DefinitionError> {
    let config: FullConfig = serde_json::from_str(json).map_err(|e| DefinitionError::Load(e.to_string()))?;
    resolve(&config)
}

/// Read and resolve a JSON definitions file.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<Definitions, DefinitionError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DefinitionError::Load(format!("{}: {}", path.display(), e)))?;
    tracing::debug!(path = %path.display(), "loaded definitions file");
    parse_definitions(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIBRARY: &str = r#"{
        "entities": [
            {
                "name": "library",
                "fields": [
                    { "name": "name", "type": "text", "required": true, "unique": true },
                    { "name": "isOpenOnSundays", "type": "boolean", "default": false },
                    { "name": "libraryBook", "type": "many",
                      "many": { "entity": "book", "this_field": "library", "that_field": "book", "name_field": "title" } }
                ],
                "delete_cascade": true
            },
            {
                "name": "book",
                "fields": [
                    { "name": "title", "type": "text", "required": true },
                    { "name": "pages", "type": "integer" },
                    { "name": "library", "type": "reference",
                      "reference": { "entity": "library", "name_field": "name" } }
                ],
                "page_size": 5
            }
        ]
    }"#;

    #[test]
    fn resolves_types_and_defaults() {
        let defs = parse_definitions(LIBRARY).unwrap();
        let library = defs.get("library").unwrap();
        assert_eq!(library.table, "library");
        assert_eq!(library.page_size, DEFAULT_PAGE_SIZE);
        assert!(library.delete_cascade);
        assert_eq!(library.field_type("isOpenOnSundays"), Some(&FieldType::Boolean));
        assert_eq!(library.field("isOpenOnSundays").unwrap().default, Value::Bool(false));
        let (_, many) = library.many_fields().next().unwrap();
        assert_eq!(many.table, "libraryBook");
        assert_eq!(library.field("libraryBook").unwrap().default, Value::Many(Vec::new()));
        assert!(!library.is_column("libraryBook"));
        assert!(library.is_column("deleted_at"));

        let book = defs.get("book").unwrap();
        assert_eq!(book.page_size, 5);
        assert_eq!(book.field_type("pages"), Some(&FieldType::Scalar(ScalarKind::Integer)));
    }

    #[test]
    fn children_are_derived_from_references() {
        let defs = parse_definitions(LIBRARY).unwrap();
        let library = defs.get("library").unwrap();
        assert_eq!(
            library.children,
            vec![ChildRelation {
                table: "book".into(),
                field: "library".into(),
                entity: "book".into(),
            }]
        );
        assert!(defs.get("book").unwrap().children.is_empty());
    }

    #[test]
    fn unknown_reference_target_is_rejected() {
        let json = r#"{ "entities": [ { "name": "book", "fields": [
            { "name": "library", "type": "reference", "reference": { "entity": "library" } } ] } ] }"#;
        match parse_definitions(json) {
            Err(DefinitionError::MissingReference { kind: "entity", id }) => assert_eq!(id, "library"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn system_field_names_are_reserved() {
        let json = r#"{ "entities": [ { "name": "a", "fields": [ { "name": "version", "type": "integer" } ] } ] }"#;
        assert!(matches!(
            parse_definitions(json),
            Err(DefinitionError::InvalidField { .. })
        ));
    }

    #[test]
    fn duplicate_entities_are_rejected() {
        let json = r#"{ "entities": [ { "name": "a", "fields": [] }, { "name": "a", "table": "b", "fields": [] } ] }"#;
        assert!(matches!(parse_definitions(json), Err(DefinitionError::DuplicateEntity(_))));
    }

    #[test]
    fn name_field_must_exist_on_target() {
        let json = r#"{ "entities": [
            { "name": "library", "fields": [ { "name": "name", "type": "text" } ] },
            { "name": "book", "fields": [
                { "name": "library", "type": "reference", "reference": { "entity": "library", "name_field": "title" } } ] } ] }"#;
        assert!(matches!(
            parse_definitions(json),
            Err(DefinitionError::MissingReference { kind: "name field", .. })
        ));
    }

    #[test]
    fn unknown_field_type_is_rejected() {
        let json = r#"{ "entities": [ { "name": "a", "fields": [ { "name": "x", "type": "blob" } ] } ] }"#;
        assert!(matches!(parse_definitions(json), Err(DefinitionError::InvalidField { .. })));
    }
}
