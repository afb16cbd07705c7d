//! Behaviour of the connect/receive/disconnect entry points.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rstest::rstest;

use crate::context::ContextId;
use crate::server::Server;

use super::support::{TestServer, bulk, test_server, wait_until};

#[rstest]
fn full_block_is_emitted_before_disconnect(test_server: TestServer) {
    let server = &test_server.server;
    let id = server.connect(bulk(3));
    server.receive(id, b"cmd1\ncmd2\ncmd3\ncmd4\n");

    assert!(test_server.wait_for_lines(1), "first block not audited");
    assert_eq!(test_server.audit_lines(), vec!["bulk: cmd1, cmd2, cmd3"]);

    server.disconnect(id);
    server.join_workers().expect("workers join cleanly");
    assert_eq!(
        test_server.audit_lines(),
        vec!["bulk: cmd1, cmd2, cmd3", "bulk: cmd4"]
    );
    assert_eq!(
        test_server.block_files(),
        vec!["cmd1\ncmd2\ncmd3\n", "cmd4\n"]
    );
}

#[rstest]
fn split_reads_match_a_single_read(test_server: TestServer) {
    let server = &test_server.server;
    let split = server.connect(bulk(1));
    server.receive(split, b"ab");
    server.receive(split, b"c\n");
    let whole = server.connect(bulk(1));
    server.receive(whole, b"abc\n");
    server.disconnect(split);
    server.disconnect(whole);
    server.join_workers().expect("workers join cleanly");

    assert_eq!(test_server.audit_lines(), vec!["bulk: abc", "bulk: abc"]);
}

#[rstest]
fn repeated_disconnect_emits_at_most_one_block(test_server: TestServer) {
    let server = &test_server.server;
    let id = server.connect(bulk(4));
    server.receive(id, b"only\n");
    server.disconnect(id);
    server.disconnect(id);
    server.receive(id, b"late\n");
    server.join_workers().expect("workers join cleanly");

    assert_eq!(test_server.audit_lines(), vec!["bulk: only"]);
    assert_eq!(server.stats().persisted, 1);
}

#[rstest]
fn unknown_handles_are_ignored(test_server: TestServer) {
    let server = &test_server.server;
    let stale = ContextId::from_raw(999);
    server.receive(stale, b"x\n");
    server.disconnect(stale);
    assert!(!server.is_running());
    assert!(test_server.audit_lines().is_empty());
}

#[rstest]
fn empty_connection_emits_nothing(test_server: TestServer) {
    let server = &test_server.server;
    let id = server.connect(bulk(2));
    server.receive(id, b"\n\n\n");
    server.disconnect(id);
    server.join_workers().expect("workers join cleanly");
    assert!(test_server.audit_lines().is_empty());
    assert!(test_server.block_files().is_empty());
}

#[rstest]
fn workers_follow_connection_lifetime(test_server: TestServer) {
    let server = &test_server.server;
    assert!(!server.is_running(), "workers must start lazily");

    let first = server.connect(bulk(2));
    let second = server.connect(bulk(2));
    assert!(server.is_running());

    server.disconnect(first);
    assert!(server.is_running(), "one connection is still open");
    server.disconnect(second);
    assert!(!server.is_running());
    server.join_workers().expect("workers join cleanly");

    // A fresh connection starts a new generation.
    let third = server.connect(bulk(1));
    assert!(server.is_running());
    server.receive(third, b"again\n");
    server.disconnect(third);
    server.join_workers().expect("workers join cleanly");
    assert_eq!(test_server.audit_lines(), vec!["bulk: again"]);
}

#[rstest]
fn close_flushes_open_connections(test_server: TestServer) {
    let server = &test_server.server;
    let id = server.connect(bulk(5));
    server.receive(id, b"a\nb");
    server.close().expect("workers join cleanly");

    assert!(!server.is_running());
    assert_eq!(server.active_connections(), 0);
    assert_eq!(test_server.audit_lines(), vec!["bulk: a, b"]);

    // The session thread may still report data and its disconnect.
    server.receive(id, b"c\n");
    server.disconnect(id);
    assert_eq!(test_server.audit_lines(), vec!["bulk: a, b"]);
}

#[rstest]
fn close_racing_a_receive_loses_no_blocks() {
    for _ in 0..100 {
        let test_server = TestServer::new(2);
        let server = &test_server.server;
        let id = server.connect(bulk(1));
        let feeding = Barrier::new(2);
        let stop = AtomicBool::new(false);

        let delivered = thread::scope(|scope| {
            let feeder = scope.spawn(|| {
                feeding.wait();
                while !stop.load(Ordering::SeqCst) {
                    server.receive(id, b"x\n");
                }
            });
            feeding.wait();
            server.close().expect("workers join cleanly");
            let delivered = server.stats();
            stop.store(true, Ordering::SeqCst);
            feeder.join().expect("feeder thread");
            delivered
        });
        assert_eq!(delivered.audited, delivered.persisted);

        // A new generation drains anything still queued behind the markers.
        let later = server.connect(bulk(1));
        server.disconnect(later);
        server.join_workers().expect("workers join cleanly");
        assert_eq!(server.stats(), delivered, "blocks outlived close");
        let audited = usize::try_from(delivered.audited).expect("block count");
        assert_eq!(test_server.audit_lines().len(), audited);
        assert_eq!(test_server.block_files().len(), audited);
    }
}

#[rstest]
fn concurrent_connections_never_share_a_block(test_server: TestServer) {
    const CLIENTS: usize = 8;
    const COMMANDS: usize = 53;
    const BULK: usize = 5;
    let server: &Arc<Server> = &test_server.server;

    thread::scope(|scope| {
        for client in 0..CLIENTS {
            scope.spawn(move || {
                let id = server.connect(bulk(BULK));
                let payload: String = (0..COMMANDS)
                    .map(|index| format!("c{client}-{index}\n"))
                    .collect();
                // Feed in uneven chunks so lines straddle reads.
                for chunk in payload.as_bytes().chunks(7 + client) {
                    server.receive(id, chunk);
                }
                server.disconnect(id);
            });
        }
    });
    assert!(wait_until(|| !server.is_running()));
    server.join_workers().expect("workers join cleanly");

    let mut per_client: HashMap<String, Vec<usize>> = HashMap::new();
    let lines = test_server.audit_lines();
    for line in &lines {
        let commands = line.strip_prefix("bulk: ").expect("audit prefix");
        let mut owners = Vec::new();
        for command in commands.split(", ") {
            let (owner, index) = command.split_once('-').expect("owner-index");
            owners.push(owner.to_owned());
            per_client
                .entry(owner.to_owned())
                .or_default()
                .push(index.parse().expect("numeric index"));
        }
        owners.dedup();
        assert_eq!(owners.len(), 1, "block mixes clients: {line}");
    }

    // Every client produced 10 full blocks and one block of three.
    assert_eq!(lines.len(), CLIENTS * COMMANDS.div_ceil(BULK));
    assert_eq!(per_client.len(), CLIENTS);
    for indices in per_client.values() {
        assert_eq!(indices, &(0..COMMANDS).collect::<Vec<_>>());
    }
    assert_eq!(test_server.block_files().len(), lines.len());
}
