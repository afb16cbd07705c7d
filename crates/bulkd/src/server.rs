//! Entry points used by the transport: connect, receive and disconnect.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::context::ContextId;
use crate::registry::{Registry, RegistryError};
use crate::workers::{
    AuditSink, PoolSettings, PoolStats, StdoutAudit, WorkerJoinError, WorkerPool,
};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Batching core shared by every connection handler.
///
/// The server owns the context registry and the worker pool. Workers start
/// with the first connection and stop once the last connection leaves; a
/// later connection starts a new generation.
pub struct Server {
    registry: Registry,
    pool: WorkerPool,
    transitions: Mutex<()>,
}

impl Server {
    /// Builds a server that audits to `audit_sink`.
    pub fn new(settings: PoolSettings, audit_sink: Arc<dyn AuditSink>) -> Self {
        Self {
            registry: Registry::new(),
            pool: WorkerPool::new(settings, audit_sink),
            transitions: Mutex::new(()),
        }
    }

    /// Builds a server that audits to standard output.
    #[must_use]
    pub fn with_stdout(settings: PoolSettings) -> Self {
        Self::new(settings, Arc::new(StdoutAudit))
    }

    /// Registers a connection and starts the workers if they are stopped.
    pub fn connect(&self, bulk_size: NonZeroUsize) -> ContextId {
        let _transition = self.transition();
        let id = self.registry.create_context(bulk_size);
        self.pool.ensure_started();
        info!(
            target: SERVER_TARGET,
            context = %id,
            bulk_size = bulk_size.get(),
            "client connected"
        );
        id
    }

    /// Feeds one chunk of bytes from the connection behind `id`.
    ///
    /// Unknown identifiers are ignored.
    pub fn receive(&self, id: ContextId, chunk: &[u8]) {
        let shared = match self.registry.find_context(id) {
            Ok(shared) => shared,
            Err(RegistryError::NotFound { .. }) => {
                debug!(
                    target: SERVER_TARGET,
                    context = %id,
                    bytes = chunk.len(),
                    "ignoring data for unknown context"
                );
                return;
            }
        };
        let mut context = shared.lock().unwrap_or_else(PoisonError::into_inner);
        if context.is_retired() {
            debug!(
                target: SERVER_TARGET,
                context = %id,
                bytes = chunk.len(),
                "ignoring data for closed context"
            );
            return;
        }
        // Blocks are queued before the context lock is released, so a
        // concurrent close cannot push shutdown markers ahead of them.
        for block in context.feed(chunk) {
            self.pool.dispatch(block);
        }
    }

    /// Flushes and forgets the connection behind `id`.
    ///
    /// Leftover text becomes one final block. When no connections remain the
    /// workers are told to stop. Repeated calls are ignored.
    pub fn disconnect(&self, id: ContextId) {
        let _transition = self.transition();
        let Ok(context) = self.registry.take_and_erase(id) else {
            debug!(target: SERVER_TARGET, context = %id, "context already gone");
            return;
        };
        let flushed = context.finish();
        let flushed_commands = flushed.as_ref().map_or(0, |block| block.commands().len());
        if let Some(block) = flushed {
            self.pool.dispatch(block);
        }
        info!(
            target: SERVER_TARGET,
            context = %id,
            flushed_commands,
            "client disconnected"
        );
        if !self.registry.has_any() {
            self.pool.request_shutdown();
        }
    }

    /// Disconnects every remaining client and waits for the workers to exit.
    ///
    /// Used on process shutdown; data still arriving from lingering sessions
    /// is ignored afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerJoinError`] naming every worker thread that panicked.
    pub fn close(&self) -> Result<(), WorkerJoinError> {
        {
            let _transition = self.transition();
            let remaining = self.registry.drain();
            let count = remaining.len();
            for block in remaining.into_iter().filter_map(|context| context.finish()) {
                self.pool.dispatch(block);
            }
            self.pool.request_shutdown();
            info!(
                target: SERVER_TARGET,
                drained_contexts = count,
                "server closing"
            );
        }
        self.pool.join()
    }

    /// True while the worker pool is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.pool.is_running()
    }

    /// Number of live connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.registry.len()
    }

    /// Cumulative worker counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Waits for a stopped worker generation to exit.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerJoinError`] naming every worker thread that panicked.
    pub fn join_workers(&self) -> Result<(), WorkerJoinError> {
        self.pool.join()
    }

    fn transition(&self) -> MutexGuard<'_, ()> {
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
