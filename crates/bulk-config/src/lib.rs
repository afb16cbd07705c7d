//! Configuration for the bulk batching server.
//!
//! The server is configured from the command line first and the environment
//! second: `bulkd <PORT> <BULK_SIZE>` supplies the two mandatory values, while
//! the remaining knobs accept either a long flag or a `BULKD_*` environment
//! variable. Flags always win over the environment, and the environment wins
//! over the built-in defaults exported from this crate.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use clap::Parser;
use clap::error::ErrorKind;
use thiserror::Error;

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_OUTPUT_DIR, DEFAULT_PERSIST_WORKERS,
    default_log_filter, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "bulkd",
    version,
    about = "Groups newline-delimited commands from TCP clients into bulk blocks"
)]
pub struct Config {
    /// TCP port to listen on.
    #[arg(value_name = "PORT")]
    port: u16,
    /// Number of commands collected into one block.
    #[arg(value_name = "BULK_SIZE")]
    bulk_size: NonZeroUsize,
    /// Interface address to bind.
    #[arg(long, env = "BULKD_HOST", default_value = DEFAULT_HOST)]
    host: String,
    /// Number of threads writing blocks to files.
    #[arg(long, env = "BULKD_PERSIST_WORKERS", default_value_t = DEFAULT_PERSIST_WORKERS)]
    persist_workers: NonZeroUsize,
    /// Directory receiving one file per completed block.
    #[arg(long, env = "BULKD_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,
    /// Tracing filter expression, for example `info` or `bulkd=debug`.
    #[arg(long, env = "BULKD_LOG", default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,
    /// Log output format (`json` or `compact`).
    #[arg(long, env = "BULKD_LOG_FORMAT", default_value_t = default_log_format())]
    log_format: LogFormat,
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an argument is missing or malformed, or
    /// when help or version output was requested.
    pub fn load() -> Result<Self, ConfigError> {
        Self::try_parse().map_err(ConfigError::from)
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first item is treated as the binary name, matching
    /// [`std::env::args_os`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an argument is missing or malformed.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(ConfigError::from)
    }

    /// Port the listener binds to.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Number of commands per block, applied to every connection.
    #[must_use]
    pub const fn bulk_size(&self) -> NonZeroUsize {
        self.bulk_size
    }

    /// Interface address the listener binds to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Number of persistence workers.
    #[must_use]
    pub const fn persist_workers(&self) -> NonZeroUsize {
        self.persist_workers
    }

    /// Directory receiving block files.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Errors raised while loading the configuration.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ConfigError {
    #[from]
    source: clap::Error,
}

impl ConfigError {
    /// Returns true when clap produced help or version output rather than a
    /// genuine failure.
    #[must_use]
    pub fn is_informational(&self) -> bool {
        matches!(
            self.source.kind(),
            ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        )
    }

    /// Category of the underlying parse failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// Writes clap's rendered message to the appropriate standard stream.
    ///
    /// # Errors
    ///
    /// Propagates failures writing to stdout or stderr.
    pub fn print(&self) -> std::io::Result<()> {
        self.source.print()
    }
}
