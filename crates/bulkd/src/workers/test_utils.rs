//! Test doubles for the worker sinks.

use std::io;
use std::sync::Mutex;

use super::AuditSink;

/// Audit sink that keeps every line in memory.
#[derive(Debug, Default)]
pub(crate) struct RecordingAudit {
    lines: Mutex<Vec<String>>,
}

impl RecordingAudit {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lock audit lines").clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .expect("lock audit lines")
            .push(line.to_owned());
        Ok(())
    }
}

/// Audit sink whose writes always fail.
#[derive(Debug, Default)]
pub(crate) struct FailingAudit;

impl AuditSink for FailingAudit {
    fn record(&self, _line: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "audit stream closed"))
    }
}

/// Audit sink that panics on the first line it receives.
#[derive(Debug, Default)]
pub(crate) struct PanickingAudit;

impl AuditSink for PanickingAudit {
    fn record(&self, line: &str) -> io::Result<()> {
        panic!("audit sink crashed on {line:?}");
    }
}
