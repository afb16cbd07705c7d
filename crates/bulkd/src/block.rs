//! Command blocks flowing from connections to the worker pool.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::context::ContextId;

/// A batch of commands flushed from one connection.
///
/// Regular blocks carry between one and `bulk_size` commands, all from the
/// same context. The shutdown marker carries none and tells exactly one
/// consumer to leave its loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBlock {
    context_id: ContextId,
    commands: Vec<String>,
    completed_at: SystemTime,
    shutdown_marker: bool,
}

impl CommandBlock {
    pub(crate) fn new(context_id: ContextId, commands: Vec<String>) -> Self {
        Self {
            context_id,
            commands,
            completed_at: SystemTime::now(),
            shutdown_marker: false,
        }
    }

    /// Builds the sentinel that stops one worker.
    #[must_use]
    pub fn shutdown_marker() -> Self {
        Self {
            context_id: ContextId::SENTINEL,
            commands: Vec::new(),
            completed_at: SystemTime::now(),
            shutdown_marker: true,
        }
    }

    /// Context that produced the block.
    #[must_use]
    pub const fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Commands in arrival order.
    #[must_use]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Wall-clock time at which the block was flushed.
    #[must_use]
    pub const fn completed_at(&self) -> SystemTime {
        self.completed_at
    }

    /// True for the sentinel produced by [`CommandBlock::shutdown_marker`].
    #[must_use]
    pub const fn is_shutdown_marker(&self) -> bool {
        self.shutdown_marker
    }

    /// Renders the console audit line, `bulk: cmd1, cmd2, ...`.
    #[must_use]
    pub fn audit_line(&self) -> String {
        format!("bulk: {}", self.commands.join(", "))
    }

    /// Completion time in microseconds since the Unix epoch.
    ///
    /// Clocks set before the epoch collapse to zero.
    #[must_use]
    pub fn timestamp_micros(&self) -> u128 {
        self.completed_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_micros()
    }
}
