//! Per-entity engines, the locator that owns them, and entity validation.

mod crud;
mod registry;
mod validation;
pub use crud::{CrudService, DeleteOutcome, UpdateOutcome};
pub use registry::{EngineLookup, ServiceRegistry};
pub use validation::EntityValidator;
