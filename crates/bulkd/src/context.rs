//! Per-connection state: line reassembly and block accumulation.
//!
//! A context receives raw byte chunks in whatever sizes the transport reads
//! them. Bytes after the last newline are kept as a tail until a later chunk
//! completes the line, so splitting `"abc\n"` into `"ab"` and `"c\n"` yields
//! the same command as a single read. Completed, non-empty lines accumulate
//! until `bulk_size` of them form a [`CommandBlock`].

use std::fmt;
use std::mem;
use std::num::NonZeroUsize;

use crate::block::CommandBlock;

/// Opaque identifier handed to the transport for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Identifier carried by shutdown markers; never assigned to a context.
    pub(crate) const SENTINEL: Self = Self(0);

    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Numeric value, useful for logging.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "ctx-{}", self.0)
    }
}

/// Server-side state of one connection.
#[derive(Debug)]
pub struct ConnectionContext {
    id: ContextId,
    bulk_size: NonZeroUsize,
    pending: Vec<String>,
    tail: Vec<u8>,
    retired: bool,
}

impl ConnectionContext {
    pub(crate) fn new(id: ContextId, bulk_size: NonZeroUsize) -> Self {
        Self {
            id,
            bulk_size,
            pending: Vec::with_capacity(bulk_size.get()),
            tail: Vec::new(),
            retired: false,
        }
    }

    /// Identifier assigned by the registry.
    #[must_use]
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Commands collected per block.
    #[must_use]
    pub const fn bulk_size(&self) -> NonZeroUsize {
        self.bulk_size
    }

    /// Commands accumulated since the last flush.
    #[must_use]
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Bytes of the incomplete trailing line.
    #[must_use]
    pub fn tail(&self) -> &[u8] {
        &self.tail
    }

    /// True once the registry has moved the state out of this context.
    #[must_use]
    pub const fn is_retired(&self) -> bool {
        self.retired
    }

    /// Moves the accumulated state out, leaving a retired shell behind.
    ///
    /// A retired context ignores every later chunk, so a reader still
    /// holding the shared handle cannot accumulate commands nobody flushes.
    pub(crate) fn retire(&mut self) -> Self {
        let mut shell = Self::new(self.id, self.bulk_size);
        shell.retired = true;
        mem::replace(self, shell)
    }

    /// Feeds one chunk and returns every block it completed, oldest first.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<CommandBlock> {
        let mut completed = Vec::new();
        if chunk.is_empty() || self.retired {
            return completed;
        }

        let mut buffer = mem::take(&mut self.tail);
        buffer.extend_from_slice(chunk);
        let Some(last_newline) = buffer.iter().rposition(|byte| *byte == b'\n') else {
            self.tail = buffer;
            return completed;
        };

        // Everything after the final newline, measured on the whole buffer,
        // is the new tail.
        self.tail = buffer.split_off(last_newline + 1);
        for line in buffer.split(|byte| *byte == b'\n') {
            if let Some(block) = self.accept_line(line) {
                completed.push(block);
            }
        }
        completed
    }

    /// Consumes the context, flushing the tail and any pending commands.
    pub(crate) fn finish(mut self) -> Option<CommandBlock> {
        let tail = mem::take(&mut self.tail);
        if !tail.is_empty() {
            self.pending.push(decode(&tail));
        }
        if self.pending.is_empty() {
            None
        } else {
            Some(CommandBlock::new(self.id, self.pending))
        }
    }

    fn accept_line(&mut self, line: &[u8]) -> Option<CommandBlock> {
        if line.is_empty() {
            return None;
        }
        self.pending.push(decode(line));
        if self.pending.len() < self.bulk_size.get() {
            return None;
        }
        let commands = mem::replace(&mut self.pending, Vec::with_capacity(self.bulk_size.get()));
        Some(CommandBlock::new(self.id, commands))
    }
}

fn decode(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}
