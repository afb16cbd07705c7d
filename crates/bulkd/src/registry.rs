//! Registry owning every live connection context.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;

use crate::context::{ConnectionContext, ContextId};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Shared handle to a context held by the registry.
pub type SharedContext = Arc<Mutex<ConnectionContext>>;

/// Errors reported by registry lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The context was never created or has already been removed.
    #[error("context {id} not found")]
    NotFound {
        /// Identifier that failed to resolve.
        id: ContextId,
    },
}

#[derive(Debug)]
struct Contexts {
    next_id: u64,
    entries: HashMap<ContextId, SharedContext>,
}

/// Thread-safe map from [`ContextId`] to [`ConnectionContext`].
///
/// Identifiers increase monotonically for the lifetime of the registry and
/// are never handed out twice.
#[derive(Debug)]
pub struct Registry {
    contexts: Mutex<Contexts>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(Contexts {
                next_id: 1,
                entries: HashMap::new(),
            }),
        }
    }

    /// Inserts an empty context and returns its identifier.
    pub fn create_context(&self, bulk_size: NonZeroUsize) -> ContextId {
        let mut contexts = self.lock();
        let id = ContextId::from_raw(contexts.next_id);
        contexts.next_id += 1;
        contexts.entries.insert(
            id,
            Arc::new(Mutex::new(ConnectionContext::new(id, bulk_size))),
        );
        debug!(
            target: REGISTRY_TARGET,
            context = %id,
            bulk_size = bulk_size.get(),
            active = contexts.entries.len(),
            "context created"
        );
        id
    }

    /// Looks up a live context.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when the context does not exist.
    pub fn find_context(&self, id: ContextId) -> Result<SharedContext, RegistryError> {
        self.lock()
            .entries
            .get(&id)
            .map(Arc::clone)
            .ok_or(RegistryError::NotFound { id })
    }

    /// Removes a context and returns its final state.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when the context was already
    /// removed, which makes a repeated disconnect harmless.
    pub fn take_and_erase(&self, id: ContextId) -> Result<ConnectionContext, RegistryError> {
        let shared = {
            let mut contexts = self.lock();
            let removed = contexts.entries.remove(&id);
            debug!(
                target: REGISTRY_TARGET,
                context = %id,
                found = removed.is_some(),
                active = contexts.entries.len(),
                "context erase requested"
            );
            removed.ok_or(RegistryError::NotFound { id })?
        };
        Ok(into_context(shared))
    }

    /// Removes every context, returning them in identifier order.
    pub fn drain(&self) -> Vec<ConnectionContext> {
        let entries = std::mem::take(&mut self.lock().entries);
        let mut drained: Vec<ConnectionContext> = entries.into_values().map(into_context).collect();
        drained.sort_by_key(ConnectionContext::id);
        drained
    }

    /// True while at least one context is registered.
    #[must_use]
    pub fn has_any(&self) -> bool {
        !self.lock().entries.is_empty()
    }

    /// Number of registered contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when no context is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_any()
    }

    fn lock(&self) -> MutexGuard<'_, Contexts> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn into_context(shared: SharedContext) -> ConnectionContext {
    match Arc::try_unwrap(shared) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
        // A straggling receive still holds a clone. Taking the lock waits for
        // any feed in progress; later feeds land on the retired shell.
        Err(shared) => shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retire(),
    }
}
