//! Connection pool setup through the sqlx `Any` driver.

use crate::config::EngineSettings;
use crate::error::CrudError;
use crate::sql::Dialect;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::time::Duration;

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// File-backed SQLite URLs get `mode=rwc` so a missing database file is created.
pub fn normalize_url(url: &str, dialect: Dialect) -> String {
    if dialect != Dialect::Sqlite || is_in_memory(url) || url.contains("mode=") {
        return url.to_string();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}mode=rwc", url, sep)
}

/// Open a pool for `settings.database_url` and report which dialect it speaks.
/// An in-memory SQLite database lives in one connection, so that pool holds exactly one
/// connection that is never recycled.
pub async fn connect(settings: &EngineSettings) -> Result<(AnyPool, Dialect), CrudError> {
    sqlx::any::install_default_drivers();
    let dialect = Dialect::from_url(&settings.database_url)?;
    let url = normalize_url(&settings.database_url, dialect);
    let in_memory = dialect == Dialect::Sqlite && is_in_memory(&url);

    let mut options = AnyPoolOptions::new();
    options = if in_memory {
        options
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
    } else {
        options.max_connections(settings.max_connections)
    };
    let pool = options.connect(&url).await?;
    tracing::info!(dialect = ?dialect, in_memory, "database pool ready");
    Ok((pool, dialect))
}
