//! HTTP download scenarios: chunked bodies, ignored resume, redirects.

mod support;

use engine::{Command, Notification, PathSyntax, Protocol, ServerPath, TransferDirection,
    TransferSettings};
use support::{spawn_http_server, test_server, EventLog, Harness};

fn transfer(local: std::path::PathBuf, remote: &str, resume: bool) -> Command {
    let full = ServerPath::parse(PathSyntax::Unix, remote).expect("valid path");
    let name = full.last_segment().expect("file name").to_owned();
    Command::Transfer {
        local,
        remote_path: full.parent().expect("parent"),
        remote_file: name,
        direction: TransferDirection::Download,
        settings: TransferSettings {
            ascii: false,
            resume,
        },
    }
}

#[test]
fn chunked_body_with_trailer_is_reassembled() {
    let log = EventLog::default();
    let response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
5\r\nhello\r\n6\r\n world\r\n0\r\nX-Md5: deadbeef\r\n\r\n"
        .to_vec();
    let address = spawn_http_server(vec![response], log.clone());

    let harness = Harness::new();
    let (code, _) = harness.run(Command::Connect {
        server: test_server(address, Protocol::Http),
        retry: false,
    });
    assert!(code.is_ok(), "http connect is immediate");

    // An empty local path delivers the body as in-memory data chunks.
    let (code, notifications) = harness.run(transfer(std::path::PathBuf::new(), "/file", false));
    assert!(code.is_ok(), "chunked download failed: {code:?}");

    let body: Vec<u8> = notifications
        .iter()
        .filter_map(|n| match n {
            Notification::DataChunk(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(body, b"hello world");
}

#[test]
fn ignored_range_restarts_from_zero() {
    let log = EventLog::default();
    let payload = vec![b'x'; 5000];
    let mut response =
        format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", payload.len())
            .into_bytes();
    response.extend_from_slice(&payload);
    let address = spawn_http_server(vec![response], log.clone());

    let dir = tempfile::tempdir().expect("tempdir");
    let local = dir.path().join("partial.bin");
    std::fs::write(&local, vec![b'y'; 1000]).expect("seed partial file");

    let harness = Harness::new();
    let (code, _) = harness.run(Command::Connect {
        server: test_server(address, Protocol::Http),
        retry: false,
    });
    assert!(code.is_ok());

    let (code, _) = harness.run(transfer(local.clone(), "/partial.bin", true));
    assert!(code.is_ok(), "download failed: {code:?}");

    // The request carried the range, the server ignored it, and the
    // local file holds the complete body.
    assert!(log
        .snapshot()
        .iter()
        .any(|event| event.starts_with("recv Range: bytes=1000-")));
    let written = std::fs::read(&local).expect("read result");
    assert_eq!(written.len(), 5000);
    assert!(written.iter().all(|&b| b == b'x'));
}

#[test]
fn redirects_are_followed_up_to_the_cap() {
    let log = EventLog::default();
    let first = b"HTTP/1.1 302 Found\r\nLocation: /elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec();
    let second =
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".to_vec();
    let address = spawn_http_server(vec![first, second], log.clone());

    let harness = Harness::new();
    let (code, _) = harness.run(Command::Connect {
        server: test_server(address, Protocol::Http),
        retry: false,
    });
    assert!(code.is_ok());

    let (code, notifications) =
        harness.run(transfer(std::path::PathBuf::new(), "/start", false));
    assert!(code.is_ok(), "redirected download failed: {code:?}");

    let body: Vec<u8> = notifications
        .iter()
        .filter_map(|n| match n {
            Notification::DataChunk(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(body, b"ok");
    assert!(log
        .snapshot()
        .iter()
        .any(|event| event.starts_with("recv GET /elsewhere")));
}
