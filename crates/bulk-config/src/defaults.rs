use std::num::NonZeroUsize;

use crate::logging::LogFormat;

/// Address the listener binds to when no host is configured.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Number of persistence workers draining the file queue.
pub const DEFAULT_PERSIST_WORKERS: NonZeroUsize = NonZeroUsize::MIN.saturating_add(1);

/// Directory receiving one log file per completed block.
pub const DEFAULT_OUTPUT_DIR: &str = ".";

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binary.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binary.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
