//! Background workers draining the dispatch queues.
//!
//! One audit worker renders each block to the console stream and a
//! configurable number of persistence workers write each block to its own
//! file. Workers start lazily with the first connection and stop when the
//! last one leaves.

mod audit;
mod persist;
mod pool;
#[cfg(test)]
mod test_utils;

pub use self::audit::{AuditSink, StdoutAudit};
pub use self::persist::{BlockFileWriter, PersistError};
pub use self::pool::{PoolSettings, PoolStats, WorkerJoinError, WorkerPool};
#[cfg(test)]
pub(crate) use self::test_utils::{FailingAudit, PanickingAudit, RecordingAudit};

const WORKERS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::workers");
