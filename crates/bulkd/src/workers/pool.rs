//! Start/stop state machine for the worker threads.

use std::mem;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use bulk_config::{Config, DEFAULT_OUTPUT_DIR, DEFAULT_PERSIST_WORKERS};

use super::{AuditSink, BlockFileWriter, WORKERS_TARGET};
use crate::block::CommandBlock;
use crate::queue::DispatchQueue;

type Dispatched = Arc<CommandBlock>;

/// Sizing and output location for the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    persist_workers: NonZeroUsize,
    output_dir: PathBuf,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::new(DEFAULT_PERSIST_WORKERS, DEFAULT_OUTPUT_DIR)
    }
}

impl PoolSettings {
    /// Builds settings with an explicit worker count and output directory.
    pub fn new(persist_workers: NonZeroUsize, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            persist_workers,
            output_dir: output_dir.into(),
        }
    }

    /// Derives settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.persist_workers(), config.output_dir())
    }

    /// Number of persistence workers per generation.
    #[must_use]
    pub const fn persist_workers(&self) -> NonZeroUsize {
        self.persist_workers
    }

    /// Directory receiving block files.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Cumulative block counters across every worker generation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Blocks written to the audit sink.
    pub audited: u64,
    /// Blocks written to their own file.
    pub persisted: u64,
    /// Blocks a persistence worker failed to write.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    audited: AtomicU64,
    persisted: AtomicU64,
    dropped: AtomicU64,
}

/// State shared with every worker thread.
struct Shared {
    audit_queue: DispatchQueue<Dispatched>,
    persist_queue: DispatchQueue<Dispatched>,
    audit_sink: Arc<dyn AuditSink>,
    writer: BlockFileWriter,
    counters: Counters,
}

/// Worker threads that panicked instead of exiting on their shutdown marker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("worker threads panicked: {}", .workers.join(", "))]
pub struct WorkerJoinError {
    workers: Vec<String>,
}

impl WorkerJoinError {
    /// Names of the panicked threads, in join order.
    #[must_use]
    pub fn workers(&self) -> &[String] {
        &self.workers
    }
}

/// Threads spawned by one successful start.
#[derive(Default)]
struct Generation {
    number: u64,
    handles: Vec<JoinHandle<()>>,
    /// Panicked threads not yet reported by [`WorkerPool::join`].
    panicked: Vec<String>,
}

/// Owns the audit and persistence queues and the threads draining them.
///
/// The pool moves between stopped and running any number of times. Starting
/// is gated by a compare-and-swap on the running flag, so concurrent callers
/// elect exactly one winner; stopping pushes one shutdown marker per live
/// worker so every consumer leaves its loop exactly once.
///
/// A start racing a stop must be ordered by the caller; [`crate::Server`]
/// runs both under its transition lock.
pub struct WorkerPool {
    shared: Arc<Shared>,
    persist_workers: NonZeroUsize,
    running: AtomicBool,
    live_audit: AtomicUsize,
    live_persist: AtomicUsize,
    next_worker_id: AtomicU64,
    generation: Mutex<Generation>,
}

impl WorkerPool {
    /// Creates a stopped pool.
    pub fn new(settings: PoolSettings, audit_sink: Arc<dyn AuditSink>) -> Self {
        let PoolSettings {
            persist_workers,
            output_dir,
        } = settings;
        Self {
            shared: Arc::new(Shared {
                audit_queue: DispatchQueue::new(),
                persist_queue: DispatchQueue::new(),
                audit_sink,
                writer: BlockFileWriter::new(output_dir),
                counters: Counters::default(),
            }),
            persist_workers,
            running: AtomicBool::new(false),
            live_audit: AtomicUsize::new(0),
            live_persist: AtomicUsize::new(0),
            next_worker_id: AtomicU64::new(1),
            generation: Mutex::new(Generation::default()),
        }
    }

    /// True between a winning [`WorkerPool::ensure_started`] and the next
    /// [`WorkerPool::request_shutdown`].
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts a fresh generation of workers if the pool is stopped.
    ///
    /// Returns true for the single caller that performed the start. Threads
    /// from a previous generation are joined first; they have already been
    /// sent their shutdown markers, so the wait is bounded by their backlog.
    pub fn ensure_started(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stale = join_all(mem::take(&mut generation.handles));
        if !stale.is_empty() {
            // Panicked workers never consumed their markers.
            let markers = self.purge_markers();
            warn!(
                target: WORKERS_TARGET,
                panicked = stale.len(),
                markers,
                "discarded shutdown markers of panicked workers"
            );
            generation.panicked.extend(stale);
        }
        generation.number += 1;

        let mut audit = 0;
        if let Some(handle) = self.spawn_worker(WorkerRole::Audit) {
            generation.handles.push(handle);
            audit += 1;
        }
        let mut persist = 0;
        for _ in 0..self.persist_workers.get() {
            if let Some(handle) = self.spawn_worker(WorkerRole::Persist) {
                generation.handles.push(handle);
                persist += 1;
            }
        }
        self.live_audit.store(audit, Ordering::SeqCst);
        self.live_persist.store(persist, Ordering::SeqCst);

        info!(
            target: WORKERS_TARGET,
            generation = generation.number,
            audit_workers = audit,
            persist_workers = persist,
            output_dir = %self.shared.writer.output_dir().display(),
            "worker pool started"
        );
        true
    }

    /// Stops the running generation.
    ///
    /// Returns true for the single caller that observed the running to
    /// stopped transition; everyone else does nothing.
    pub fn request_shutdown(&self) -> bool {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let audit = self.live_audit.swap(0, Ordering::SeqCst);
        let persist = self.live_persist.swap(0, Ordering::SeqCst);
        for _ in 0..audit {
            self.shared
                .audit_queue
                .push(Arc::new(CommandBlock::shutdown_marker()));
        }
        for _ in 0..persist {
            self.shared
                .persist_queue
                .push(Arc::new(CommandBlock::shutdown_marker()));
        }
        info!(
            target: WORKERS_TARGET,
            audit_markers = audit,
            persist_markers = persist,
            "worker pool shutdown requested"
        );
        true
    }

    /// Waits for the threads of the most recent generation to exit.
    ///
    /// Only meaningful after [`WorkerPool::request_shutdown`]; a running
    /// generation is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerJoinError`] when any worker panicked since the last
    /// join, including workers of generations replaced by a restart.
    pub fn join(&self) -> Result<(), WorkerJoinError> {
        if self.is_running() {
            return Ok(());
        }
        let (handles, mut panicked) = {
            let mut generation = self
                .generation
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            (
                mem::take(&mut generation.handles),
                mem::take(&mut generation.panicked),
            )
        };
        panicked.extend(join_all(handles));
        if panicked.is_empty() {
            Ok(())
        } else {
            Err(WorkerJoinError { workers: panicked })
        }
    }

    /// Fans a completed block out to both queues.
    pub fn dispatch(&self, block: CommandBlock) {
        let block = Arc::new(block);
        self.shared.audit_queue.push(Arc::clone(&block));
        self.shared.persist_queue.push(block);
    }

    /// Snapshot of the cumulative block counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let counters = &self.shared.counters;
        PoolStats {
            audited: counters.audited.load(Ordering::SeqCst),
            persisted: counters.persisted.load(Ordering::SeqCst),
            dropped: counters.dropped.load(Ordering::SeqCst),
        }
    }

    fn purge_markers(&self) -> usize {
        let keep = |block: &Dispatched| !block.is_shutdown_marker();
        self.shared.audit_queue.retain(keep) + self.shared.persist_queue.retain(keep)
    }

    fn spawn_worker(&self, role: WorkerRole) -> Option<JoinHandle<()>> {
        let worker = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("bulkd-{role}-{worker}"))
            .spawn(move || match role {
                WorkerRole::Audit => run_audit(&shared, worker),
                WorkerRole::Persist => run_persist(&shared, worker),
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(source) => {
                error!(
                    target: WORKERS_TARGET,
                    %role,
                    worker,
                    error = %source,
                    "failed to spawn worker thread"
                );
                None
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Release blocked consumers; their threads finish on their own.
        self.request_shutdown();
    }
}

#[derive(Debug, Clone, Copy)]
enum WorkerRole {
    Audit,
    Persist,
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self {
            Self::Audit => "audit",
            Self::Persist => "persist",
        })
    }
}

fn run_audit(shared: &Shared, worker: u64) {
    debug!(target: WORKERS_TARGET, worker, "audit worker started");
    let mut audited = 0_u64;
    loop {
        let block = shared.audit_queue.pop();
        if block.is_shutdown_marker() {
            break;
        }
        match shared.audit_sink.record(&block.audit_line()) {
            Ok(()) => {
                audited += 1;
                shared.counters.audited.fetch_add(1, Ordering::SeqCst);
            }
            Err(source) => warn!(
                target: WORKERS_TARGET,
                worker,
                context = %block.context_id(),
                error = %source,
                "failed to write audit line"
            ),
        }
    }
    info!(target: WORKERS_TARGET, worker, audited, "audit worker stopped");
}

fn run_persist(shared: &Shared, worker: u64) {
    debug!(target: WORKERS_TARGET, worker, "persistence worker started");
    let mut sequence = 0_u64;
    loop {
        let block = shared.persist_queue.pop();
        if block.is_shutdown_marker() {
            break;
        }
        sequence += 1;
        match shared.writer.write(&block, worker, sequence) {
            Ok(path) => {
                shared.counters.persisted.fetch_add(1, Ordering::SeqCst);
                debug!(
                    target: WORKERS_TARGET,
                    worker,
                    context = %block.context_id(),
                    commands = block.commands().len(),
                    queued_us = block
                        .completed_at()
                        .elapsed()
                        .map_or(0, |waited| u64::try_from(waited.as_micros()).unwrap_or(u64::MAX)),
                    path = %path.display(),
                    "block persisted"
                );
            }
            Err(source) => {
                shared.counters.dropped.fetch_add(1, Ordering::SeqCst);
                error!(
                    target: WORKERS_TARGET,
                    worker,
                    context = %block.context_id(),
                    error = %source,
                    "dropping block"
                );
            }
        }
    }
    info!(
        target: WORKERS_TARGET,
        worker,
        blocks = sequence,
        "persistence worker stopped"
    );
}

/// Joins `handles`, returning the names of threads that panicked.
fn join_all(handles: Vec<JoinHandle<()>>) -> Vec<String> {
    let mut panicked = Vec::new();
    for handle in handles {
        let name = handle.thread().name().unwrap_or("unnamed").to_owned();
        if handle.join().is_err() {
            error!(
                target: WORKERS_TARGET,
                thread = %name,
                "worker thread panicked"
            );
            panicked.push(name);
        }
    }
    panicked
}
