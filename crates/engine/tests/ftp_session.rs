//! End-to-end FTP scenarios against scripted in-process servers.

mod support;

use engine::{Command, EngineOptions, ListFlags, Notification, PathSyntax, Protocol, ServerPath};
use logging::MessageKind;
use std::time::Duration;
use support::{anonymous_logon_steps, spawn_ftp_server, test_server, EventLog, Harness, Step};

const BARE_FEAT: &[&str] = &["211-Features:", "211 End"];

fn unix_path(path: &str) -> ServerPath {
    ServerPath::parse(PathSyntax::Unix, path).expect("valid test path")
}

#[test]
fn plain_logon_sends_the_expected_sequence() {
    let log = EventLog::default();
    let script = anonymous_logon_steps(&[
        "211-Features:",
        " UTF8",
        " CLNT",
        "211 End",
    ]);
    let address = spawn_ftp_server(
        vec![{
            let mut script = script;
            script.push(Step::Expect {
                command: "CLNT",
                reply: "200 Noted",
            });
            script.push(Step::Expect {
                command: "OPTS UTF8 ON",
                reply: "200 Always in UTF8 mode",
            });
            script
        }],
        log.clone(),
    );

    let harness = Harness::new();
    let server = test_server(address, Protocol::InsecureFtp);
    let (code, _) = harness.run(Command::Connect {
        server,
        retry: false,
    });
    assert!(code.is_ok(), "logon failed: {code:?}");

    let commands: Vec<String> = log
        .snapshot()
        .into_iter()
        .filter_map(|event| event.strip_prefix("recv ").map(str::to_owned))
        .map(|line| {
            line.split_whitespace()
                .next()
                .unwrap_or_default()
                .to_owned()
        })
        .collect();
    assert_eq!(
        commands,
        vec!["USER", "PASS", "SYST", "FEAT", "CLNT", "OPTS"],
        "logon order mismatch"
    );
}

#[test]
fn list_fetches_once_then_serves_from_cache() {
    let log = EventLog::default();
    let mut script = anonymous_logon_steps(BARE_FEAT);
    script.extend([
        Step::Expect {
            command: "CWD /pub",
            reply: "250 Directory changed",
        },
        Step::Expect {
            command: "TYPE I",
            reply: "200 Type set to I",
        },
        Step::Pasv,
        Step::DataSend {
            command: "LIST",
            payload: b"-rw-r--r-- 1 ftp ftp 42 Jan  1  2024 README\r\n",
            delay_complete: Duration::ZERO,
        },
    ]);
    let address = spawn_ftp_server(vec![script], log.clone());

    let harness = Harness::new();
    let server = test_server(address, Protocol::InsecureFtp);
    let (code, _) = harness.run(Command::Connect {
        server,
        retry: false,
    });
    assert!(code.is_ok());

    let list = Command::List {
        path: Some(unix_path("/pub")),
        subdir: String::new(),
        flags: ListFlags::empty(),
    };
    let (code, notifications) = harness.run(list.clone());
    assert!(code.is_ok(), "first list failed: {code:?}");
    assert!(notifications.iter().any(|n| matches!(
        n,
        Notification::ListingUpdated { failed: false, .. }
    )));

    let listing = harness
        .engine
        .cache_lookup(&unix_path("/pub"))
        .expect("listing cached");
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.entries[0].name, "README");
    assert_eq!(listing.entries[0].size, 42);

    // The second list must not touch the wire: the engine answers
    // synchronously from the cache.
    let code = harness.engine.execute(list);
    assert!(code.is_ok(), "cache hit must complete synchronously");
    assert_eq!(log.count_received("LIST"), 1, "second LIST hit the wire");
    let cached = harness
        .engine
        .next_notification()
        .expect("listing notification");
    assert!(matches!(cached, Notification::ListingUpdated { .. }));
}

#[test]
fn mlsd_is_preferred_when_advertised() {
    let log = EventLog::default();
    let mut script = anonymous_logon_steps(&[
        "211-Features:",
        " MLST type*;size*;modify*;",
        "211 End",
    ]);
    script.extend([
        Step::Expect {
            command: "CWD /",
            reply: "250 Directory changed",
        },
        Step::Expect {
            command: "TYPE I",
            reply: "200 Type set to I",
        },
        Step::Pasv,
        Step::DataSend {
            command: "MLSD",
            payload: b"type=file;size=5;modify=20240101120000; data.bin\r\n",
            delay_complete: Duration::ZERO,
        },
    ]);
    let address = spawn_ftp_server(vec![script], log.clone());

    let harness = Harness::new();
    let (code, _) = harness.run(Command::Connect {
        server: test_server(address, Protocol::InsecureFtp),
        retry: false,
    });
    assert!(code.is_ok());

    let (code, _) = harness.run(Command::List {
        path: Some(unix_path("/")),
        subdir: String::new(),
        flags: ListFlags::REFRESH,
    });
    assert!(code.is_ok());
    assert_eq!(log.count_received("MLSD"), 1);
    assert_eq!(log.count_received("LIST"), 0);

    let listing = harness
        .engine
        .cache_lookup(&unix_path("/"))
        .expect("cached");
    assert_eq!(listing.entries[0].name, "data.bin");
}

#[test]
fn connect_retries_until_the_server_accepts() {
    let log = EventLog::default();
    // Two sessions die right after the banner, the third one works.
    let address = spawn_ftp_server(
        vec![
            vec![Step::Hangup],
            vec![Step::Hangup],
            anonymous_logon_steps(BARE_FEAT),
        ],
        log.clone(),
    );

    let harness = Harness::with_options(EngineOptions {
        reconnect_count: 3,
        reconnect_delay: Duration::from_millis(300),
        ..EngineOptions::default()
    });
    let started = std::time::Instant::now();
    let (code, notifications) = harness.run(Command::Connect {
        server: test_server(address, Protocol::InsecureFtp),
        retry: true,
    });
    assert!(code.is_ok(), "third attempt should succeed: {code:?}");
    assert!(harness.engine.is_connected());

    let waiting_messages = notifications
        .iter()
        .filter(|n| {
            matches!(
                n,
                Notification::Log { kind: MessageKind::Status, text }
                    if text.starts_with("Waiting to retry")
            )
        })
        .count();
    assert_eq!(waiting_messages, 2);
    // Two backoff periods of 300 ms each must have elapsed.
    assert!(started.elapsed() >= Duration::from_millis(600));
    let finished = notifications
        .iter()
        .filter(|n| matches!(n, Notification::OperationFinished { .. }))
        .count();
    assert_eq!(finished, 1, "exactly one terminal notification");
}

#[test]
fn delete_updates_cache_and_reports_per_file_failures() {
    let log = EventLog::default();
    let mut script = anonymous_logon_steps(BARE_FEAT);
    script.extend([
        Step::Expect {
            command: "CWD /pub",
            reply: "250 Directory changed",
        },
        Step::Expect {
            command: "DELE gone.txt",
            reply: "250 Deleted",
        },
        Step::Expect {
            command: "DELE missing.txt",
            reply: "550 No such file",
        },
    ]);
    let address = spawn_ftp_server(vec![script], log.clone());

    let harness = Harness::new();
    let (code, _) = harness.run(Command::Connect {
        server: test_server(address, Protocol::InsecureFtp),
        retry: false,
    });
    assert!(code.is_ok());

    let (code, _) = harness.run(Command::Delete {
        path: unix_path("/pub"),
        files: vec!["gone.txt".into(), "missing.txt".into()],
    });
    assert!(code.failed(), "one failed delete must fail the command");
    assert_eq!(log.count_received("DELE"), 2, "all files are attempted");
}

#[test]
fn rename_issues_rnfr_rnto() {
    let log = EventLog::default();
    let mut script = anonymous_logon_steps(BARE_FEAT);
    script.extend([
        Step::Expect {
            command: "CWD /pub",
            reply: "250 Directory changed",
        },
        Step::Expect {
            command: "RNFR old.txt",
            reply: "350 Ready for destination",
        },
        Step::Expect {
            command: "RNTO new.txt",
            reply: "250 Renamed",
        },
    ]);
    let address = spawn_ftp_server(vec![script], log.clone());

    let harness = Harness::new();
    let (code, _) = harness.run(Command::Connect {
        server: test_server(address, Protocol::InsecureFtp),
        retry: false,
    });
    assert!(code.is_ok());

    let (code, _) = harness.run(Command::Rename {
        from_path: unix_path("/pub"),
        from: "old.txt".into(),
        to_path: unix_path("/pub"),
        to: "new.txt".into(),
    });
    assert!(code.is_ok(), "rename failed: {code:?}");
}

#[test]
fn raw_command_requires_a_successful_reply() {
    let log = EventLog::default();
    let mut script = anonymous_logon_steps(BARE_FEAT);
    script.push(Step::Expect {
        command: "SITE IDLE 60",
        reply: "500 Unknown command",
    });
    let address = spawn_ftp_server(vec![script], log.clone());

    let harness = Harness::new();
    let (code, _) = harness.run(Command::Connect {
        server: test_server(address, Protocol::InsecureFtp),
        retry: false,
    });
    assert!(code.is_ok());

    let (code, _) = harness.run(Command::Raw("SITE IDLE 60".into()));
    assert!(code.failed());
}
