//! Pluggable storage for `file` fields.

use crate::config::EntityDefinition;
use crate::entity::Entity;
use crate::error::CrudError;
use async_trait::async_trait;

/// Stores, replaces, removes and renders the payload behind a `file` field.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    async fn create_file(&self, entity: &Entity, definition: &EntityDefinition, field: &str) -> Result<(), CrudError>;

    async fn update_file(&self, entity: &Entity, definition: &EntityDefinition, field: &str) -> Result<(), CrudError>;

    async fn delete_file(&self, entity: &Entity, definition: &EntityDefinition, field: &str) -> Result<(), CrudError>;

    async fn render_file(&self, entity: &Entity, definition: &EntityDefinition, field: &str) -> Result<Vec<u8>, CrudError>;
}

/// Processor for installations without file fields; every call is rejected.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFiles;

#[async_trait]
impl FileProcessor for NoFiles {
    async fn create_file(&self, _: &Entity, d: &EntityDefinition, field: &str) -> Result<(), CrudError> {
        Err(no_files(d, field))
    }

    async fn update_file(&self, _: &Entity, d: &EntityDefinition, field: &str) -> Result<(), CrudError> {
        Err(no_files(d, field))
    }

    async fn delete_file(&self, _: &Entity, d: &EntityDefinition, field: &str) -> Result<(), CrudError> {
        Err(no_files(d, field))
    }

    async fn render_file(&self, _: &Entity, d: &EntityDefinition, field: &str) -> Result<Vec<u8>, CrudError> {
        Err(no_files(d, field))
    }
}

fn no_files(d: &EntityDefinition, field: &str) -> CrudError {
    CrudError::File(format!("no file processor configured for {}.{}", d.name, field))
}
