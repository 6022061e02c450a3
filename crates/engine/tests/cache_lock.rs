//! Cross-engine cache-lock behaviour: two engines listing the same
//! directory on the same server serialise their LIST traffic.

mod support;

use engine::{Command, EngineOptions, ListFlags, Notification, PathSyntax, Protocol, ServerPath};
use std::time::{Duration, Instant};
use support::{anonymous_logon_steps, spawn_ftp_server, test_server, EventLog, Harness, Step};

#[test]
fn concurrent_lists_of_the_same_directory_serialise() {
    let log = EventLog::default();

    // Session A's transfer holds the 226 back for a while, keeping the
    // list lock on /pub occupied.
    let mut script_a = anonymous_logon_steps(&["211-Features:", "211 End"]);
    script_a.extend([
        Step::Expect {
            command: "CWD /pub",
            reply: "250 Directory changed",
        },
        Step::Expect {
            command: "TYPE I",
            reply: "200 Type set",
        },
        Step::Pasv,
        Step::DataSend {
            command: "LIST",
            payload: b"-rw-r--r-- 1 ftp ftp 1 Jan  1  2024 a\r\n",
            delay_complete: Duration::from_millis(400),
        },
    ]);

    let mut script_b = anonymous_logon_steps(&["211-Features:", "211 End"]);
    script_b.extend([
        Step::Expect {
            command: "CWD /pub",
            reply: "250 Directory changed",
        },
        Step::Expect {
            command: "TYPE I",
            reply: "200 Type set",
        },
        Step::Pasv,
        Step::DataSend {
            command: "LIST",
            payload: b"-rw-r--r-- 1 ftp ftp 1 Jan  1  2024 a\r\n",
            delay_complete: Duration::ZERO,
        },
    ]);

    let address = spawn_ftp_server(vec![script_a, script_b], log.clone());

    let ctx = engine::EngineContext::new(EngineOptions::default());
    let harness_a = Harness::on_context(&ctx);
    let harness_b = Harness::on_context(&ctx);

    let server = test_server(address, Protocol::InsecureFtp);
    let (code, _) = harness_a.run(Command::Connect {
        server: server.clone(),
        retry: false,
    });
    assert!(code.is_ok(), "A connect failed: {code:?}");
    let (code, _) = harness_b.run(Command::Connect {
        server,
        retry: false,
    });
    assert!(code.is_ok(), "B connect failed: {code:?}");

    let path = ServerPath::parse(PathSyntax::Unix, "/pub").expect("valid path");
    let list = |flags: ListFlags| Command::List {
        path: Some(path.clone()),
        subdir: String::new(),
        flags,
    };

    // Start A's list, then immediately race B's refresh of the same
    // directory. B must wait for A's lock.
    let code_a = harness_a.engine.execute(list(ListFlags::REFRESH));
    assert!(code_a.would_block());
    // Give A a head start so it wins the lock deterministically.
    std::thread::sleep(Duration::from_millis(150));
    let code_b = harness_b.engine.execute(list(ListFlags::REFRESH));
    assert!(code_b.would_block());

    let (code_a, _) = harness_a.drain_current();
    let (code_b, _) = harness_b.drain_current();
    assert!(code_a.is_ok(), "A list failed: {code_a:?}");
    assert!(code_b.is_ok(), "B list failed: {code_b:?}");

    // The second LIST reaches the wire only after the first transfer
    // completed (lock released at 226 + pop).
    let events = log.snapshot();
    let list_indices: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, event)| event.starts_with("recv LIST"))
        .map(|(index, _)| index)
        .collect();
    let complete_index = log.position("sent 226").expect("first 226 logged");
    assert_eq!(list_indices.len(), 2, "both engines listed: {events:?}");
    assert!(
        list_indices[1] > complete_index,
        "second LIST must wait for the lock: {events:?}"
    );
}

#[test]
fn directory_change_notifies_peer_engines() {
    let log = EventLog::default();
    let listing_line: &[u8] = b"drwxr-xr-x 2 ftp ftp 512 Jan  1  2024 y\r\n";

    let mut script_a = anonymous_logon_steps(&["211-Features:", "211 End"]);
    script_a.extend([
        Step::Expect {
            command: "CWD /x",
            reply: "250 Directory changed",
        },
        Step::Expect {
            command: "TYPE I",
            reply: "200 Type set",
        },
        Step::Pasv,
        Step::DataSend {
            command: "LIST",
            payload: listing_line,
            delay_complete: Duration::ZERO,
        },
        // The rmdir skips CWD because the socket already sits in /x.
        Step::Expect {
            command: "RMD y",
            reply: "250 Directory removed",
        },
    ]);

    let mut script_b = anonymous_logon_steps(&["211-Features:", "211 End"]);
    script_b.extend([
        Step::Expect {
            command: "CWD /x",
            reply: "250 Directory changed",
        },
        Step::Expect {
            command: "TYPE I",
            reply: "200 Type set",
        },
        Step::Pasv,
        Step::DataSend {
            command: "LIST",
            payload: listing_line,
            delay_complete: Duration::ZERO,
        },
    ]);

    let address = spawn_ftp_server(vec![script_a, script_b], log.clone());

    let ctx = engine::EngineContext::new(EngineOptions::default());
    let harness_a = Harness::on_context(&ctx);
    let harness_b = Harness::on_context(&ctx);
    let server = test_server(address, Protocol::InsecureFtp);

    let (code, _) = harness_a.run(Command::Connect {
        server: server.clone(),
        retry: false,
    });
    assert!(code.is_ok());
    let path = ServerPath::parse(PathSyntax::Unix, "/x").expect("valid path");
    let (code, _) = harness_a.run(Command::List {
        path: Some(path.clone()),
        subdir: String::new(),
        flags: ListFlags::REFRESH,
    });
    assert!(code.is_ok());

    let (code, _) = harness_b.run(Command::Connect {
        server,
        retry: false,
    });
    assert!(code.is_ok());
    let (code, _) = harness_b.run(Command::List {
        path: Some(path.clone()),
        subdir: String::new(),
        flags: ListFlags::REFRESH,
    });
    assert!(code.is_ok());

    // A removes /x/y; B looked at /x last, so B must hear about it.
    let (code, _) = harness_a.run(Command::RemoveDir {
        path: path.clone(),
        subdir: "y".into(),
    });
    assert!(code.is_ok(), "rmdir failed: {code:?}");

    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Some(Notification::ListingUpdated {
            path: changed,
            modified: true,
            ..
        }) = harness_b.engine.next_notification()
        {
            assert_eq!(changed.to_string(), "/x");
            break;
        }
        assert!(
            Instant::now() < deadline,
            "peer engine never heard about the change"
        );
        std::thread::sleep(Duration::from_millis(20));
    }
}
