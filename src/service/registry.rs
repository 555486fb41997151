//! Service locator: one shared engine per entity, built from resolved definitions.

use crate::config::{Definitions, EngineSettings};
use crate::error::CrudError;
use crate::files::{FileProcessor, NoFiles};
use crate::ids::{strategy_for, IdStrategy};
use crate::migration::apply_migrations;
use crate::service::CrudService;
use crate::sql::Dialect;
use crate::store;
use sqlx::AnyPool;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// How an engine reaches the engines of other entity types.
pub trait EngineLookup: Send + Sync {
    fn engine(&self, name: &str) -> Option<Arc<CrudService>>;
}

pub struct ServiceRegistry {
    definitions: Definitions,
    engines: HashMap<String, Arc<CrudService>>,
    pool: AnyPool,
    dialect: Dialect,
}

impl ServiceRegistry {
    pub fn new(
        definitions: Definitions,
        pool: AnyPool,
        dialect: Dialect,
        ids: Arc<dyn IdStrategy>,
        files: Arc<dyn FileProcessor>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<ServiceRegistry>| {
            let lookup: Weak<dyn EngineLookup> = weak.clone();
            let engines = definitions
                .iter()
                .map(|def| {
                    let engine = CrudService::new(
                        def.clone(),
                        pool.clone(),
                        dialect,
                        ids.clone(),
                        files.clone(),
                        lookup.clone(),
                    );
                    (def.name.clone(), Arc::new(engine))
                })
                .collect();
            ServiceRegistry {
                definitions,
                engines,
                pool,
                dialect,
            }
        })
    }

    /// Connect per settings, create missing tables, and build engines without file storage.
    pub async fn open(settings: &EngineSettings, definitions: Definitions) -> Result<Arc<Self>, CrudError> {
        Self::open_with_files(settings, definitions, Arc::new(NoFiles)).await
    }

    pub async fn open_with_files(
        settings: &EngineSettings,
        definitions: Definitions,
        files: Arc<dyn FileProcessor>,
    ) -> Result<Arc<Self>, CrudError> {
        let (pool, dialect) = store::connect(settings).await?;
        apply_migrations(&pool, dialect, &definitions, settings.id_kind).await?;
        tracing::info!(
            entities = definitions.entities.len(),
            dialect = ?dialect,
            id_kind = ?settings.id_kind,
            "service registry ready"
        );
        Ok(Self::new(definitions, pool, dialect, strategy_for(settings.id_kind), files))
    }

    /// Engine for an entity type.
    pub fn data(&self, name: &str) -> Result<Arc<CrudService>, CrudError> {
        self.engine(name)
            .ok_or_else(|| CrudError::UnknownEntity(name.to_string()))
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

impl EngineLookup for ServiceRegistry {
    fn engine(&self, name: &str) -> Option<Arc<CrudService>> {
        self.engines.get(name).cloned()
    }
}
