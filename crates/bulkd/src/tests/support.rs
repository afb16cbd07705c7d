//! Shared fixtures for the server test suites.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rstest::fixture;
use tempfile::TempDir;

use crate::server::Server;
use crate::workers::{PoolSettings, RecordingAudit};

/// Server wired to an in-memory audit sink and a temporary output directory.
pub(crate) struct TestServer {
    pub(crate) server: Arc<Server>,
    pub(crate) audit: Arc<RecordingAudit>,
    pub(crate) dir: TempDir,
}

impl TestServer {
    pub(crate) fn new(persist_workers: usize) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let audit = Arc::new(RecordingAudit::default());
        let settings = PoolSettings::new(bulk(persist_workers), dir.path());
        let server = Arc::new(Server::new(settings, audit.clone()));
        Self { server, audit, dir }
    }

    pub(crate) fn audit_lines(&self) -> Vec<String> {
        self.audit.lines()
    }

    pub(crate) fn wait_for_lines(&self, expected: usize) -> bool {
        wait_until(|| self.audit.lines().len() >= expected)
    }

    pub(crate) fn block_files(&self) -> Vec<String> {
        block_files(self.dir.path())
    }
}

#[fixture]
pub(crate) fn test_server() -> TestServer {
    TestServer::new(2)
}

pub(crate) fn bulk(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).expect("non-zero size")
}

/// Polls `condition` for up to two seconds.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Bodies of every block file in `dir`, sorted.
pub(crate) fn block_files(dir: &Path) -> Vec<String> {
    let mut bodies: Vec<String> = std::fs::read_dir(dir)
        .expect("read output dir")
        .map(|entry| {
            let path = entry.expect("dir entry").path();
            assert_eq!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("log"),
                "unexpected file {path:?}"
            );
            std::fs::read_to_string(&path).expect("read block file")
        })
        .collect();
    bodies.sort();
    bodies
}
