//! Engine settings from environment variables.

use crate::error::ConfigError;
use crate::ids::IdKind;
use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub database_url: String,
    pub id_kind: IdKind,
    pub max_connections: u32,
    /// JSON definitions file, if the caller wants them loaded from disk.
    pub definitions_path: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            database_url: DEFAULT_DATABASE_URL.into(),
            id_kind: IdKind::Sequential,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            definitions_path: None,
        }
    }
}

impl EngineSettings {
    /// Read `CRUD_DATABASE_URL` (or `DATABASE_URL`), `CRUD_ID_STRATEGY`, `CRUD_MAX_CONNECTIONS`
    /// and `CRUD_DEFINITIONS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = EngineSettings::default();
        if let Some(url) = get("CRUD_DATABASE_URL").or_else(|| get("DATABASE_URL")) {
            settings.database_url = url;
        }
        if let Some(kind) = get("CRUD_ID_STRATEGY") {
            settings.id_kind = kind.parse()?;
        }
        if let Some(n) = get("CRUD_MAX_CONNECTIONS") {
            settings.max_connections = n
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "CRUD_MAX_CONNECTIONS",
                    reason: format!("expected a positive integer, got '{}'", n),
                })?;
        }
        settings.definitions_path = get("CRUD_DEFINITIONS").filter(|s| !s.is_empty()).map(PathBuf::from);
        Ok(settings)
    }
}
