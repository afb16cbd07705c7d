//! Streaming command-batching server.
//!
//! Clients connect over TCP and send newline-delimited commands. Each
//! connection gets its own [`ConnectionContext`], which stitches partial reads
//! back into whole lines and groups every `bulk_size` commands into a
//! [`CommandBlock`]. Completed blocks fan out through two [`DispatchQueue`]s:
//! one drained by an audit worker that prints `bulk: cmd1, cmd2, ...`, the
//! other by a small pool of persistence workers that write each block to its
//! own file.
//!
//! Workers are started by the first connection and stopped, by injecting one
//! shutdown marker per worker, when the last connection closes. The
//! [`Server`] type owns all shared state and is handed to connection
//! handlers by reference; there is no process-wide singleton.
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//! use bulkd::{PoolSettings, Server};
//!
//! let server = Server::with_stdout(PoolSettings::default());
//! let id = server.connect(NonZeroUsize::new(3).expect("non-zero"));
//! server.receive(id, b"cmd1\ncmd2\ncmd3\n");
//! server.disconnect(id);
//! server.join_workers().expect("workers exit cleanly");
//! ```

mod block;
mod context;
mod process;
mod queue;
mod registry;
mod server;
mod telemetry;
mod transport;
mod workers;

pub use block::CommandBlock;
pub use context::{ConnectionContext, ContextId};
pub use process::{
    LaunchError, RunningServer, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_server,
    run_server_with, start,
};
pub use queue::DispatchQueue;
pub use registry::{Registry, RegistryError, SharedContext};
pub use server::Server;
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use transport::{
    ConnectionHandler, ListenerError, ListenerHandle, Session, SessionHandler, SocketListener,
};
pub use workers::{
    AuditSink, BlockFileWriter, PersistError, PoolSettings, PoolStats, StdoutAudit,
    WorkerJoinError, WorkerPool,
};

#[cfg(test)]
mod tests;
