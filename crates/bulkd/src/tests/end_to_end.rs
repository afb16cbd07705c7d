//! Exercises the full stack over real TCP connections.

use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use bulk_config::Config;

use crate::process::{
    LaunchError, RunningServer, ShutdownError, ShutdownSignal, run_server_with, start,
};
use crate::workers::{PanickingAudit, RecordingAudit};

use super::support::{block_files, wait_until};

struct Harness {
    running: RunningServer,
    audit: Arc<RecordingAudit>,
    dir: TempDir,
}

fn config(dir: &TempDir, bulk_size: &str) -> Config {
    let output = dir.path().join("blocks");
    Config::load_from_iter([
        "bulkd".into(),
        "0".into(),
        bulk_size.into(),
        "--host".into(),
        "127.0.0.1".into(),
        "--output-dir".into(),
        output.into_os_string(),
    ])
    .expect("valid configuration")
}

#[fixture]
fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let audit = Arc::new(RecordingAudit::default());
    let running = start(&config(&dir, "3"), audit.clone()).expect("server starts");
    Harness {
        running,
        audit,
        dir,
    }
}

impl Harness {
    fn connect(&self) -> TcpStream {
        TcpStream::connect(self.running.local_addr()).expect("connect client")
    }

    fn wait_for_idle(&self) -> bool {
        let server = self.running.server();
        wait_until(|| server.active_connections() == 0 && !server.is_running())
    }

    fn files(&self) -> Vec<String> {
        block_files(&self.dir.path().join("blocks"))
    }
}

#[rstest]
fn blocks_flow_from_socket_to_sinks(harness: Harness) {
    let mut client = harness.connect();
    client
        .write_all(b"cmd1\ncmd2\ncmd3\ncmd4\n")
        .expect("write commands");
    assert!(
        wait_until(|| harness.audit.lines().len() == 1),
        "full block should be audited while the client is connected"
    );

    client.shutdown(Shutdown::Both).expect("close client");
    drop(client);
    assert!(harness.wait_for_idle(), "session did not disconnect");
    harness.running.server().join_workers().expect("workers join cleanly");

    assert_eq!(
        harness.audit.lines(),
        vec!["bulk: cmd1, cmd2, cmd3", "bulk: cmd4"]
    );
    assert_eq!(harness.files(), vec!["cmd1\ncmd2\ncmd3\n", "cmd4\n"]);
    let Harness { running, .. } = harness;
    running.stop().expect("stop server");
}

#[rstest]
fn byte_at_a_time_writes_are_reassembled(harness: Harness) {
    let mut client = harness.connect();
    client.set_nodelay(true).expect("nodelay");
    for byte in b"alpha\nbeta\ngam" {
        client.write_all(&[*byte]).expect("write byte");
        thread::sleep(Duration::from_millis(1));
    }
    drop(client);
    assert!(harness.wait_for_idle());
    harness.running.server().join_workers().expect("workers join cleanly");

    assert_eq!(harness.audit.lines(), vec!["bulk: alpha, beta, gam"]);
}

#[rstest]
fn stop_drains_clients_that_are_still_connected(harness: Harness) {
    let mut client = harness.connect();
    client
        .write_all(b"a\nb\nc\npending\n")
        .expect("write commands");
    assert!(wait_until(|| harness.audit.lines().len() == 1));
    // Allow a trailing segment of a split read to arrive as well.
    thread::sleep(Duration::from_millis(100));
    let server = Arc::clone(harness.running.server());
    assert_eq!(server.active_connections(), 1);

    let Harness { running, audit, .. } = harness;
    running.stop().expect("stop server");
    assert_eq!(audit.lines(), vec!["bulk: a, b, c", "bulk: pending"]);
    assert!(!server.is_running());
    drop(client);
}

#[rstest]
fn stop_reports_a_panicked_worker() {
    let dir = tempfile::tempdir().expect("temp dir");
    let running = start(&config(&dir, "1"), Arc::new(PanickingAudit)).expect("server starts");
    let mut client = TcpStream::connect(running.local_addr()).expect("connect client");
    client.write_all(b"boom\n").expect("write command");
    let server = Arc::clone(running.server());
    assert!(wait_until(|| server.stats().persisted == 1));

    match running.stop().expect_err("audit worker panicked") {
        LaunchError::Workers(failure) => assert_eq!(failure.workers().len(), 1),
        other => panic!("expected a worker failure, got {other:?}"),
    }
    drop(client);
}

struct ImmediateShutdown;

impl ShutdownSignal for ImmediateShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        Ok(())
    }
}

#[rstest]
fn run_server_with_returns_after_the_signal() {
    let dir = tempfile::tempdir().expect("temp dir");
    let audit = Arc::new(RecordingAudit::default());
    run_server_with(&config(&dir, "2"), audit.clone(), &ImmediateShutdown)
        .expect("server runs and stops");
    assert!(audit.lines().is_empty());
    assert!(dir.path().join("blocks").is_dir(), "output dir is created");
}
