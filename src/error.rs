//! Typed errors for definitions, settings and engine operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("duplicate table: {0}")]
    DuplicateTable(String),
    #[error("duplicate field: {entity}.{field}")]
    DuplicateField { entity: String, field: String },
    #[error("invalid field {entity}.{field}: {reason}")]
    InvalidField {
        entity: String,
        field: String,
        reason: String,
    },
    #[error("definition load: {0}")]
    Load(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),
}

#[derive(Error, Debug)]
pub enum CrudError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("unknown field: {entity}.{field}")]
    UnknownField { entity: String, field: String },
    #[error("entity has no id")]
    MissingId,
    #[error("entity has no version")]
    MissingVersion,
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("validation: {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("file: {0}")]
    File(String),
    #[error("service registry is gone")]
    RegistryDropped,
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}
