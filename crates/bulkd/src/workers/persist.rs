//! One-file-per-block persistence.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::block::CommandBlock;

/// Errors raised while persisting a block.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The block file could not be created.
    #[error("failed to create block file '{path}': {source}")]
    Create {
        /// Target file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the commands failed after the file was created.
    #[error("failed to write block file '{path}': {source}")]
    Write {
        /// Target file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Writes blocks beneath a fixed output directory.
#[derive(Debug, Clone)]
pub struct BlockFileWriter {
    output_dir: PathBuf,
}

impl BlockFileWriter {
    /// Creates a writer targeting `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Directory receiving block files.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File name for a block: `<timestamp>_<worker>_<sequence>.log`.
    #[must_use]
    pub fn file_name(block: &CommandBlock, worker: u64, sequence: u64) -> String {
        format!("{}_{worker}_{sequence}.log", block.timestamp_micros())
    }

    /// Writes the block's commands, one per line, to a new file.
    ///
    /// Existing files are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] when the file cannot be created or written.
    pub fn write(
        &self,
        block: &CommandBlock,
        worker: u64,
        sequence: u64,
    ) -> Result<PathBuf, PersistError> {
        let path = self
            .output_dir
            .join(Self::file_name(block, worker, sequence));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| PersistError::Create {
                path: path.clone(),
                source,
            })?;

        let mut writer = BufWriter::new(file);
        let written = block
            .commands()
            .iter()
            .try_for_each(|command| writeln!(writer, "{command}"))
            .and_then(|()| writer.flush());
        match written {
            Ok(()) => Ok(path),
            Err(source) => Err(PersistError::Write { path, source }),
        }
    }
}
