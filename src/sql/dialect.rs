//! Per-backend SQL differences: placeholders, casts, paging, UUIDs and DDL types.

use crate::config::{FieldType, ScalarKind};
use crate::entity::Value;
use crate::error::ConfigError;
use crate::ids::IdKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

/// Cast applied to a text parameter so PostgreSQL accepts it for a typed column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlCast {
    Date,
    Timestamp,
}

impl SqlCast {
    pub fn for_field(field_type: &FieldType) -> Option<Self> {
        match field_type {
            FieldType::Scalar(ScalarKind::Date) => Some(SqlCast::Date),
            FieldType::Scalar(ScalarKind::DateTime) => Some(SqlCast::Timestamp),
            _ => None,
        }
    }

    /// Cast implied by a typed value, for conditions on tables without a definition at hand.
    pub fn for_value(v: &Value) -> Option<Self> {
        match v {
            Value::Date(_) => Some(SqlCast::Date),
            Value::DateTime(_) => Some(SqlCast::Timestamp),
            _ => None,
        }
    }
}

const SQLITE_UUID: &str = "lower(hex(randomblob(4)) || '-' || hex(randomblob(2)) || '-4' || \
     substr(hex(randomblob(2)), 2) || '-' || substr('89AB', 1 + (abs(random()) % 4), 1) || \
     substr(hex(randomblob(2)), 2) || '-' || hex(randomblob(6)))";

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Dialect::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else {
            Err(ConfigError::UnsupportedUrl(url.split(':').next().unwrap_or(url).to_string()))
        }
    }

    /// Positional parameter `n` (1-based). Both backends accept `$n`.
    pub fn placeholder(self, n: usize, cast: Option<SqlCast>) -> String {
        match (self, cast) {
            (Dialect::Postgres, Some(SqlCast::Date)) => format!("${}::date", n),
            (Dialect::Postgres, Some(SqlCast::Timestamp)) => format!("${}::timestamptz", n),
            _ => format!("${}", n),
        }
    }

    /// Paging suffix. SQLite cannot OFFSET without a LIMIT, so it gets `LIMIT -1`.
    pub fn limit_clause(self, skip: Option<u64>, amount: Option<u64>) -> String {
        let skip = skip.filter(|k| *k > 0);
        match (self, amount, skip) {
            (_, Some(n), Some(k)) => format!(" LIMIT {} OFFSET {}", n, k),
            (_, Some(n), None) => format!(" LIMIT {}", n),
            (Dialect::Sqlite, None, Some(k)) => format!(" LIMIT -1 OFFSET {}", k),
            (Dialect::Postgres, None, Some(k)) => format!(" OFFSET {}", k),
            (_, None, None) => String::new(),
        }
    }

    /// Expression yielding a fresh UUID string on the database side.
    pub fn uuid_expression(self) -> &'static str {
        match self {
            Dialect::Postgres => "gen_random_uuid()::text",
            Dialect::Sqlite => SQLITE_UUID,
        }
    }

    pub fn id_column_type(self, id_kind: IdKind) -> &'static str {
        match (self, id_kind) {
            (Dialect::Postgres, IdKind::Sequential) => "BIGSERIAL PRIMARY KEY",
            (Dialect::Sqlite, IdKind::Sequential) => "INTEGER PRIMARY KEY AUTOINCREMENT",
            (_, IdKind::Uuid) => "VARCHAR(36) PRIMARY KEY",
        }
    }

    /// Column type holding a foreign id.
    pub fn id_ref_type(self, id_kind: IdKind) -> &'static str {
        match (self, id_kind) {
            (Dialect::Postgres, IdKind::Sequential) => "BIGINT",
            (Dialect::Sqlite, IdKind::Sequential) => "INTEGER",
            (_, IdKind::Uuid) => "VARCHAR(36)",
        }
    }

    pub fn timestamp_type(self) -> &'static str {
        match self {
            Dialect::Postgres => "TIMESTAMPTZ",
            Dialect::Sqlite => "TEXT",
        }
    }

    /// DDL type for a base-table field. `None` for many-fields, which have no column.
    pub fn column_type(self, field_type: &FieldType, id_kind: IdKind) -> Option<&'static str> {
        let pg = self == Dialect::Postgres;
        Some(match field_type {
            FieldType::Many(_) => return None,
            FieldType::Reference(_) => self.id_ref_type(id_kind),
            FieldType::Boolean => {
                if pg {
                    "SMALLINT NOT NULL DEFAULT 0"
                } else {
                    "INTEGER NOT NULL DEFAULT 0"
                }
            }
            FieldType::Scalar(kind) => match kind {
                ScalarKind::Integer => {
                    if pg {
                        "BIGINT"
                    } else {
                        "INTEGER"
                    }
                }
                ScalarKind::Float => {
                    if pg {
                        "DOUBLE PRECISION"
                    } else {
                        "REAL"
                    }
                }
                ScalarKind::Date => {
                    if pg {
                        "DATE"
                    } else {
                        "TEXT"
                    }
                }
                ScalarKind::DateTime => self.timestamp_type(),
                ScalarKind::Text | ScalarKind::Multiline | ScalarKind::Url | ScalarKind::File => "TEXT",
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_from_url() {
        assert_eq!(Dialect::from_url("postgres://localhost/db").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert!(Dialect::from_url("mysql://localhost/db").is_err());
    }

    #[test]
    fn postgres_casts_typed_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3, Some(SqlCast::Timestamp)), "$3::timestamptz");
        assert_eq!(Dialect::Sqlite.placeholder(3, Some(SqlCast::Timestamp)), "$3");
        assert_eq!(Dialect::Postgres.placeholder(1, None), "$1");
    }

    #[test]
    fn paging_without_limit() {
        assert_eq!(Dialect::Sqlite.limit_clause(Some(5), None), " LIMIT -1 OFFSET 5");
        assert_eq!(Dialect::Postgres.limit_clause(Some(5), None), " OFFSET 5");
        assert_eq!(Dialect::Postgres.limit_clause(None, None), "");
        assert_eq!(Dialect::Sqlite.limit_clause(Some(0), Some(2)), " LIMIT 2");
        assert_eq!(Dialect::Sqlite.limit_clause(Some(4), Some(2)), " LIMIT 2 OFFSET 4");
    }
}
