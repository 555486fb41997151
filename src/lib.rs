//! crud-engine: definition-driven data access over PostgreSQL or SQLite.

pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod files;
pub mod ids;
pub mod migration;
pub mod service;
pub mod sql;
pub mod store;

pub use config::{load_from_path, parse_definitions, resolve, validate, Definitions, EngineSettings, EntityDefinition, FullConfig};
pub use entity::{Entity, EntityId, Reference, Value};
pub use error::{ConfigError, CrudError, DefinitionError};
pub use events::{EventRegistry, Operation, Phase};
pub use files::{FileProcessor, NoFiles};
pub use ids::{strategy_for, IdKind, IdStrategy, SequentialIds, UuidIds};
pub use migration::apply_migrations;
pub use service::{CrudService, DeleteOutcome, EngineLookup, EntityValidator, ServiceRegistry, UpdateOutcome};
pub use sql::{Condition, Dialect, FilterOp, ListQuery, Sort};
pub use store::connect;
