//! Defines the unified error surface for server launch and supervision.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use bulk_config::ConfigError;

use crate::telemetry::TelemetryError;
use crate::transport::ListenerError;
use crate::workers::WorkerJoinError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the server process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    /// The block output directory could not be created.
    #[error("failed to prepare output directory '{path}': {source}")]
    OutputDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The listener failed to bind or run.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// Worker threads panicked before shutdown completed.
    #[error("worker shutdown failed: {0}")]
    Workers(#[from] WorkerJoinError),
    /// Waiting for a shutdown signal failed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}
