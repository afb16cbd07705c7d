//! Supervises server launch sequencing and orderly shutdown.

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use bulk_config::Config;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use crate::server::Server;
use crate::telemetry;
use crate::transport::{ListenerHandle, SessionHandler, SocketListener};
use crate::workers::{AuditSink, PoolSettings, StdoutAudit};

/// A server accepting connections on a background thread.
pub struct RunningServer {
    server: Arc<Server>,
    listener: ListenerHandle,
    local_addr: SocketAddr,
}

impl RunningServer {
    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Batching core shared with the connection handlers.
    #[must_use]
    pub const fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// Stops accepting, drains every connection and joins the workers.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Listener`] when the accept loop panicked; the
    /// workers are still drained in that case. Returns
    /// [`LaunchError::Workers`] when a worker thread panicked.
    pub fn stop(self) -> Result<(), LaunchError> {
        let Self {
            server, listener, ..
        } = self;
        listener.shutdown();
        let joined = listener.join();
        let closed = server.close();
        let stats = server.stats();
        info!(
            target: PROCESS_TARGET,
            audited = stats.audited,
            persisted = stats.persisted,
            dropped = stats.dropped,
            "shutdown sequence completed"
        );
        joined?;
        closed?;
        Ok(())
    }
}

/// Runs the server with the production collaborators until a termination
/// signal arrives.
///
/// # Errors
///
/// Returns [`LaunchError`] when configuration, telemetry, binding or signal
/// installation fails.
pub fn run_server() -> Result<(), LaunchError> {
    let config = Config::load()?;
    telemetry::initialise(&config)?;
    run_server_with(&config, Arc::new(StdoutAudit), &SystemShutdownSignal)
}

/// Runs the server with injected collaborators until `shutdown` returns.
///
/// # Errors
///
/// Returns [`LaunchError`] when startup fails or the shutdown signal cannot
/// be awaited. A signal failure still stops the server before returning.
pub fn run_server_with<S>(
    config: &Config,
    audit_sink: Arc<dyn AuditSink>,
    shutdown: &S,
) -> Result<(), LaunchError>
where
    S: ShutdownSignal + ?Sized,
{
    let running = start(config, audit_sink)?;
    let waited = shutdown.wait();
    let stopped = running.stop();
    waited?;
    stopped
}

/// Prepares the output directory, binds the listener and starts serving.
///
/// Worker threads are not started here; they start with the first client.
///
/// # Errors
///
/// Returns [`LaunchError`] when the output directory cannot be created or
/// the listener fails to bind.
pub fn start(config: &Config, audit_sink: Arc<dyn AuditSink>) -> Result<RunningServer, LaunchError> {
    let output_dir = config.output_dir();
    fs::create_dir_all(output_dir).map_err(|source| LaunchError::OutputDirectory {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let listener = SocketListener::bind(config.host(), config.port())?;
    let local_addr = listener.local_addr();
    let server = Arc::new(Server::new(PoolSettings::from_config(config), audit_sink));
    let handler = Arc::new(SessionHandler::new(Arc::clone(&server), config.bulk_size()));
    let listener = listener.start(handler)?;

    info!(
        target: PROCESS_TARGET,
        addr = %local_addr,
        bulk_size = config.bulk_size().get(),
        persist_workers = config.persist_workers().get(),
        output_dir = %output_dir.display(),
        "bulk server started"
    );
    Ok(RunningServer {
        server,
        listener,
        local_addr,
    })
}
