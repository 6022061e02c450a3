//! Facade-contract tests: command serialisation, precondition replies,
//! terminal notifications, cancellation.

mod support;

use engine::{Command, ListFlags, Notification, PathSyntax, Protocol, ReplyCode, ServerPath};
use std::time::Duration;
use support::{anonymous_logon_steps, spawn_ftp_server, test_server, EventLog, Harness, Step};

#[test]
fn commands_require_a_connection() {
    let harness = Harness::new();
    let code = harness.engine.execute(Command::List {
        path: None,
        subdir: String::new(),
        flags: ListFlags::empty(),
    });
    assert_eq!(code, ReplyCode::NOT_CONNECTED);
    assert!(!harness.engine.is_busy());
}

#[test]
fn invalid_parameters_are_rejected_before_any_wire_activity() {
    let harness = Harness::new();
    let code = harness.engine.execute(Command::Raw(String::new()));
    assert_eq!(code, ReplyCode::SYNTAX_ERROR);

    let code = harness.engine.execute(Command::List {
        path: Some(ServerPath::parse(PathSyntax::Unix, "/x").expect("valid")),
        subdir: String::new(),
        flags: ListFlags::REFRESH | ListFlags::AVOID,
    });
    assert_eq!(code, ReplyCode::SYNTAX_ERROR);
}

#[test]
fn only_one_command_is_in_flight() {
    let log = EventLog::default();
    // A server that accepts USER and then goes quiet keeps the connect
    // command in flight.
    let address = spawn_ftp_server(
        vec![vec![
            Step::Expect {
                command: "USER",
                reply: "331 ok",
            },
            Step::Sleep(Duration::from_secs(10)),
        ]],
        log,
    );

    let harness = Harness::new();
    let code = harness.engine.execute(Command::Connect {
        server: test_server(address, Protocol::InsecureFtp),
        retry: false,
    });
    assert!(code.would_block());
    assert!(harness.engine.is_busy());

    let second = harness.engine.execute(Command::Connect {
        server: test_server(address, Protocol::InsecureFtp),
        retry: false,
    });
    assert_eq!(second, ReplyCode::BUSY);

    // Cancel resolves the in-flight connect with a canceled terminal
    // notification.
    let cancel = harness.engine.cancel();
    assert!(cancel.would_block());
    let (code, notifications) = harness.drain_current();
    assert!(code.was_canceled());
    let finished = notifications
        .iter()
        .filter(|n| matches!(n, Notification::OperationFinished { .. }))
        .count();
    assert_eq!(finished, 1);
    assert!(!harness.engine.is_busy());
}

#[test]
fn disconnect_is_idempotent() {
    let harness = Harness::new();
    assert!(harness.engine.execute(Command::Disconnect).is_ok());
}

#[test]
fn connect_while_connected_is_rejected() {
    let log = EventLog::default();
    let address = spawn_ftp_server(
        vec![anonymous_logon_steps(&["211-Features:", "211 End"])],
        log,
    );

    let harness = Harness::new();
    let server = test_server(address, Protocol::InsecureFtp);
    let (code, _) = harness.run(Command::Connect {
        server: server.clone(),
        retry: false,
    });
    assert!(code.is_ok());
    assert!(harness.engine.is_connected());

    let code = harness.engine.execute(Command::Connect {
        server,
        retry: false,
    });
    assert_eq!(code, ReplyCode::ALREADY_CONNECTED);
}

#[test]
fn watchdog_times_a_silent_server_out() {
    let log = EventLog::default();
    // The server answers USER and then goes silent forever.
    let address = spawn_ftp_server(
        vec![vec![
            Step::Expect {
                command: "USER",
                reply: "331 Password required",
            },
            Step::Expect {
                command: "PASS",
                reply: "230-Welcome",
            },
            Step::Sleep(Duration::from_secs(10)),
        ]],
        log,
    );

    let harness = Harness::with_options(engine::EngineOptions {
        timeout: Duration::from_millis(500),
        reconnect_count: 0,
        ..engine::EngineOptions::default()
    });
    let (code, _) = harness.run(Command::Connect {
        server: test_server(address, Protocol::InsecureFtp),
        retry: false,
    });
    assert!(code.contains(ReplyCode::TIMEOUT), "expected timeout, got {code:?}");
}
