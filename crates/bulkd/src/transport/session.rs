//! Per-connection glue between a byte stream and the [`Server`].

use std::io::{self, Read};
use std::net::TcpStream;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::debug;

use super::LISTENER_TARGET;
use crate::context::ContextId;
use crate::server::Server;

const READ_CHUNK_BYTES: usize = 4096;

/// Handles accepted socket connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream);
}

/// One registered connection.
///
/// Dropping the session disconnects it, so whatever ends the read loop
/// (EOF, an IO error or a panic) still flushes the leftover commands.
pub struct Session {
    server: Arc<Server>,
    id: ContextId,
}

impl Session {
    /// Registers a new connection with the server.
    pub fn open(server: Arc<Server>, bulk_size: NonZeroUsize) -> Self {
        let id = server.connect(bulk_size);
        Self { server, id }
    }

    /// Identifier assigned to this connection.
    #[must_use]
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Forwards one chunk of received bytes.
    pub fn receive(&self, chunk: &[u8]) {
        self.server.receive(self.id, chunk);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.server.disconnect(self.id);
    }
}

/// Connection handler that feeds every connection into a shared [`Server`].
pub struct SessionHandler {
    server: Arc<Server>,
    bulk_size: NonZeroUsize,
}

impl SessionHandler {
    /// Creates a handler applying `bulk_size` to every connection.
    pub const fn new(server: Arc<Server>, bulk_size: NonZeroUsize) -> Self {
        Self { server, bulk_size }
    }

    /// Runs one session to completion over any byte source.
    pub fn serve<R: Read>(&self, mut reader: R) {
        let session = Session::open(Arc::clone(&self.server), self.bulk_size);
        let mut chunk = [0_u8; READ_CHUNK_BYTES];
        loop {
            match read_chunk_with_retry(&mut reader, &mut chunk) {
                Ok(0) => break,
                Ok(read) => session.receive(chunk.get(..read).unwrap_or_default()),
                Err(error) => {
                    debug!(
                        target: LISTENER_TARGET,
                        context = %session.id(),
                        error = %error,
                        "connection read failed"
                    );
                    break;
                }
            }
        }
    }
}

impl ConnectionHandler for SessionHandler {
    fn handle(&self, stream: TcpStream) {
        self.serve(stream);
    }
}

fn read_chunk_with_retry<R: Read>(reader: &mut R, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::{PoolSettings, RecordingAudit};
    use rstest::rstest;

    /// Reader returning scripted chunks, then an optional error.
    struct ScriptedReader {
        chunks: Vec<&'static [u8]>,
        interrupt_first: bool,
        fail_at_end: bool,
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt_first {
                self.interrupt_first = false;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            if self.chunks.is_empty() {
                return if self.fail_at_end {
                    Err(io::Error::from(io::ErrorKind::ConnectionReset))
                } else {
                    Ok(0)
                };
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    fn run(reader: ScriptedReader) -> Vec<String> {
        let dir = tempfile::tempdir().expect("temp dir");
        let audit = Arc::new(RecordingAudit::default());
        let settings = PoolSettings::new(NonZeroUsize::MIN, dir.path());
        let server = Arc::new(Server::new(settings, audit.clone()));
        let handler = SessionHandler::new(Arc::clone(&server), NonZeroUsize::new(2).expect("bulk"));
        handler.serve(reader);
        server.join_workers().expect("workers join cleanly");
        assert!(!server.is_running());
        assert_eq!(server.active_connections(), 0);
        audit.lines()
    }

    #[rstest]
    #[case::clean_eof(false)]
    #[case::reset(true)]
    fn session_end_flushes_leftovers(#[case] fail_at_end: bool) {
        let lines = run(ScriptedReader {
            chunks: vec![b"a\nb", b"\nc\nd"],
            interrupt_first: true,
            fail_at_end,
        });
        assert_eq!(lines, vec!["bulk: a, b", "bulk: c, d"]);
    }
}
