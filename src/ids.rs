//! Primary key generation: database sequence or database-generated UUID.

use crate::entity::EntityId;
use crate::error::{ConfigError, CrudError};
use crate::sql::Dialect;
use async_trait::async_trait;
use sqlx::AnyConnection;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
    Sequential,
    Uuid,
}

impl FromStr for IdKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "serial" | "auto" => Ok(IdKind::Sequential),
            "uuid" => Ok(IdKind::Uuid),
            _ => Err(ConfigError::Invalid {
                name: "CRUD_ID_STRATEGY",
                reason: format!("expected sequential or uuid, got '{}'", s),
            }),
        }
    }
}

/// Chosen once per installation; every engine of a registry shares it.
#[async_trait]
pub trait IdStrategy: Send + Sync {
    fn kind(&self) -> IdKind;

    /// Id to supply on insert. `None` lets the database assign one.
    async fn next_id(&self, conn: &mut AnyConnection, dialect: Dialect) -> Result<Option<EntityId>, CrudError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialIds;

#[async_trait]
impl IdStrategy for SequentialIds {
    fn kind(&self) -> IdKind {
        IdKind::Sequential
    }

    async fn next_id(&self, _conn: &mut AnyConnection, _dialect: Dialect) -> Result<Option<EntityId>, CrudError> {
        Ok(None)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIds;

#[async_trait]
impl IdStrategy for UuidIds {
    fn kind(&self) -> IdKind {
        IdKind::Uuid
    }

    async fn next_id(&self, conn: &mut AnyConnection, dialect: Dialect) -> Result<Option<EntityId>, CrudError> {
        let sql = format!("SELECT {} AS \"id\"", dialect.uuid_expression());
        tracing::debug!(sql = %sql, "query");
        let raw: String = sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?;
        let id = uuid::Uuid::parse_str(raw.trim()).map_err(|e| CrudError::InvalidValue {
            field: "id".into(),
            reason: format!("database returned '{}': {}", raw, e),
        })?;
        Ok(Some(EntityId::Uuid(id.hyphenated().to_string())))
    }
}

pub fn strategy_for(kind: IdKind) -> Arc<dyn IdStrategy> {
    match kind {
        IdKind::Sequential => Arc::new(SequentialIds),
        IdKind::Uuid => Arc::new(UuidIds),
    }
}
