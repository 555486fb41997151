//! Per-engine hook registry: stacks of handlers keyed by phase and operation.

use crate::entity::Entity;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    After,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    CreateFiles,
    UpdateFiles,
    DeleteFiles,
    DeleteFile,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::CreateFiles => "createFiles",
            Operation::UpdateFiles => "updateFiles",
            Operation::DeleteFiles => "deleteFiles",
            Operation::DeleteFile => "deleteFile",
        })
    }
}

/// Returns `false` to veto (before-phase only).
pub type EventHandler = Arc<dyn Fn(&Entity) -> bool + Send + Sync>;

#[derive(Default)]
pub struct EventRegistry {
    handlers: RwLock<HashMap<(Phase, Operation), Vec<EventHandler>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&self, phase: Phase, op: Operation, handler: F)
    where
        F: Fn(&Entity) -> bool + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((phase, op))
            .or_default()
            .push(Arc::new(handler));
    }

    /// Remove the most recently pushed handler for the key. Returns whether one was removed.
    pub fn pop(&self, phase: Phase, op: Operation) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&(phase, op))
            .and_then(Vec::pop)
            .is_some()
    }

    pub fn len(&self, phase: Phase, op: Operation) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(phase, op))
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, phase: Phase, op: Operation) -> bool {
        self.len(phase, op) == 0
    }

    /// Run handlers in push order. Before-phase stops at the first `false` and returns it;
    /// after-phase runs every handler and always returns `true`.
    /// Handlers run on a snapshot taken before the first call, so a handler may push or pop
    /// on this registry; changes apply from the next `fire`.
    pub fn fire(&self, phase: Phase, op: Operation, entity: &Entity) -> bool {
        let stack: Vec<EventHandler> = match self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(phase, op))
        {
            Some(stack) => stack.clone(),
            None => return true,
        };
        match phase {
            Phase::Before => stack.iter().all(|h| h(entity)),
            Phase::After => {
                for h in &stack {
                    h(entity);
                }
                true
            }
        }
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_map()
            .entries(handlers.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}
