//! Console audit stream.

use std::io::{self, Write};

/// Destination for rendered `bulk: ...` lines.
pub trait AuditSink: Send + Sync + 'static {
    /// Records one line. Implementations add their own line terminator.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error when the line cannot be written.
    fn record(&self, line: &str) -> io::Result<()>;
}

/// Writes audit lines to standard output, flushing after each one.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutAudit;

impl AuditSink for StdoutAudit {
    fn record(&self, line: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()
    }
}
