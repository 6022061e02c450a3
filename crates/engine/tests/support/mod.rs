//! Scripted in-process servers and an engine harness for the
//! end-to-end tests. The servers speak just enough of their protocol
//! to satisfy one scripted session and record everything they see.

use engine::{
    AsyncReply, Command, Engine, EngineContext, EngineOptions, FileExistsAction, LogonType,
    Notification, Protocol, ReplyCode, Server,
};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One step of a scripted FTP control conversation.
pub enum Step {
    /// Expect a command starting with `command`, answer with `reply`
    /// (CRLF appended).
    Expect {
        command: &'static str,
        reply: &'static str,
    },
    /// Like `Expect` with a multiline reply.
    ExpectMulti {
        command: &'static str,
        reply_lines: &'static [&'static str],
    },
    /// Expect `PASV`, open a data listener and advertise it.
    Pasv,
    /// Expect a transfer command; run the data connection: send `150`,
    /// write `payload` on the accepted data socket, close it, then send
    /// the completion reply after `delay_complete` (which keeps the
    /// control connection busy long enough for lock tests).
    DataSend {
        command: &'static str,
        payload: &'static [u8],
        delay_complete: Duration,
    },
    /// Drop the control connection immediately.
    Hangup,
    /// Keep the connection open without answering anything.
    Sleep(Duration),
}

/// Shared record of everything the scripted servers saw, in order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Index of the first event equal to `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.snapshot().iter().position(|event| event == needle)
    }

    /// Count of received commands starting with `prefix`.
    pub fn count_received(&self, prefix: &str) -> usize {
        self.snapshot()
            .iter()
            .filter(|event| {
                event
                    .strip_prefix("recv ")
                    .is_some_and(|rest| rest.starts_with(prefix))
            })
            .count()
    }
}

/// Spawns an FTP server that serves one scripted session per entry in
/// `scripts`, concurrently.
pub fn spawn_ftp_server(scripts: Vec<Vec<Step>>, log: EventLog) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
    let address = listener.local_addr().expect("test server address");

    std::thread::spawn(move || {
        let mut sessions = Vec::new();
        for script in scripts {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let log = log.clone();
            sessions.push(std::thread::spawn(move || {
                serve_ftp_session(stream, script, &log);
            }));
        }
        for session in sessions {
            let _ = session.join();
        }
    });
    address
}

fn serve_ftp_session(stream: TcpStream, script: Vec<Step>, log: &EventLog) {
    let mut writer = stream.try_clone().expect("clone control stream");
    let mut reader = BufReader::new(stream);
    send_line(&mut writer, "220 scripted server ready");

    let mut data_listener: Option<TcpListener> = None;
    for step in script {
        match step {
            Step::Expect { command, reply } => {
                let line = read_line(&mut reader);
                assert_command(&line, command, log);
                send_line(&mut writer, reply);
            }
            Step::ExpectMulti {
                command,
                reply_lines,
            } => {
                let line = read_line(&mut reader);
                assert_command(&line, command, log);
                for reply in reply_lines {
                    send_line(&mut writer, reply);
                }
            }
            Step::Pasv => {
                let line = read_line(&mut reader);
                assert_command(&line, "PASV", log);
                let listener = TcpListener::bind("127.0.0.1:0").expect("bind data listener");
                let port = listener.local_addr().expect("data address").port();
                data_listener = Some(listener);
                send_line(
                    &mut writer,
                    &format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{})",
                        port / 256,
                        port % 256
                    ),
                );
            }
            Step::DataSend {
                command,
                payload,
                delay_complete,
            } => {
                let line = read_line(&mut reader);
                assert_command(&line, command, log);
                send_line(&mut writer, "150 Opening data connection");
                let listener = data_listener.take().expect("PASV before transfer");
                let (mut data, _) = listener.accept().expect("data connection");
                data.write_all(payload).expect("write data payload");
                drop(data);
                if !delay_complete.is_zero() {
                    std::thread::sleep(delay_complete);
                }
                send_line(&mut writer, "226 Transfer complete");
                log.push("sent 226");
            }
            Step::Hangup => return,
            Step::Sleep(duration) => std::thread::sleep(duration),
        }
    }
    // Keep the control connection up so the client side never races an
    // unexpected close while it processes the final reply.
    std::thread::sleep(Duration::from_secs(2));
}

fn assert_command(line: &str, expected_prefix: &str, log: &EventLog) {
    log.push(format!("recv {line}"));
    assert!(
        line.starts_with(expected_prefix),
        "scripted server expected `{expected_prefix}`, got `{line}`"
    );
}

fn send_line(writer: &mut TcpStream, line: &str) {
    writer
        .write_all(format!("{line}\r\n").as_bytes())
        .expect("write control reply");
}

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read control command");
    line.trim_end_matches(['\r', '\n']).to_owned()
}

/// Spawns an HTTP server answering one scripted raw response per
/// connection.
pub fn spawn_http_server(responses: Vec<Vec<u8>>, log: EventLog) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind http server");
    let address = listener.local_addr().expect("http server address");

    std::thread::spawn(move || {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut request = Vec::new();
            let mut byte = [0u8; 1];
            while !request.ends_with(b"\r\n\r\n") {
                match stream.read(&mut byte) {
                    Ok(1) => request.push(byte[0]),
                    _ => break,
                }
            }
            let head = String::from_utf8_lossy(&request);
            for line in head.lines() {
                if !line.is_empty() {
                    log.push(format!("recv {line}"));
                }
            }
            stream.write_all(&response).expect("write http response");
            let _ = stream.flush();
        }
    });
    address
}

/// Engine + context + wakeup plumbing for one test.
pub struct Harness {
    pub ctx: EngineContext,
    pub engine: Engine,
    wake: mpsc::Receiver<()>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        let ctx = EngineContext::new(options);
        Self::on_context(&ctx)
    }

    /// A second engine sharing an existing context.
    pub fn on_context(ctx: &EngineContext) -> Self {
        let (wake_tx, wake_rx) = mpsc::channel::<()>();
        let engine = Engine::new(
            ctx,
            Box::new(move || {
                let _ = wake_tx.send(());
            }),
        );
        Self {
            ctx: ctx.clone(),
            engine,
            wake: wake_rx,
        }
    }

    /// Runs one command to completion, auto-answering prompts with
    /// `overwrite` and trusting all certificates/host keys. Returns the
    /// terminal code and every notification seen on the way.
    pub fn run(&self, command: Command) -> (ReplyCode, Vec<Notification>) {
        let submitted = self.engine.execute(command);
        if !submitted.would_block() {
            return (submitted, Vec::new());
        }
        self.drain_current()
    }

    /// Drains notifications until the in-flight command finishes.
    pub fn drain_current(&self) -> (ReplyCode, Vec<Notification>) {
        let deadline = Instant::now() + Duration::from_secs(15);
        let mut seen = Vec::new();
        loop {
            assert!(
                Instant::now() < deadline,
                "command did not finish; notifications so far: {seen:?}"
            );
            let _ = self.wake.recv_timeout(Duration::from_millis(50));
            while let Some(notification) = self.engine.next_notification() {
                match &notification {
                    Notification::OperationFinished { code, .. } => {
                        let code = *code;
                        seen.push(notification);
                        return (code, seen);
                    }
                    Notification::AsyncRequest(request) => {
                        let reply = match &request.request {
                            engine::AsyncRequest::Certificate { .. } => {
                                AsyncReply::Certificate { trust: true }
                            }
                            engine::AsyncRequest::HostKey { .. } => {
                                AsyncReply::HostKey { trust: true }
                            }
                            engine::AsyncRequest::FileExists(_) => {
                                AsyncReply::FileExists(FileExistsAction::Overwrite)
                            }
                            engine::AsyncRequest::InteractiveLogin { .. } => {
                                AsyncReply::InteractiveLogin {
                                    password: "secret".to_owned(),
                                }
                            }
                            engine::AsyncRequest::SftpEncryption { .. } => AsyncReply::Dismissed,
                        };
                        assert!(self
                            .engine
                            .set_async_request_reply(request.request_id, reply));
                        seen.push(notification);
                    }
                    _ => seen.push(notification),
                }
            }
        }
    }
}

/// An anonymous server description for a scripted endpoint.
pub fn test_server(address: SocketAddr, protocol: Protocol) -> Server {
    Server {
        protocol,
        host: address.ip().to_string(),
        port: address.port(),
        logon_type: LogonType::Anonymous,
        ..Server::default()
    }
}

/// The logon steps a scripted plain-FTP server answers for the default
/// anonymous test server (no TLS, no features beyond the given FEAT
/// lines).
pub fn anonymous_logon_steps(feat_lines: &'static [&'static str]) -> Vec<Step> {
    vec![
        Step::Expect {
            command: "USER anonymous",
            reply: "331 Password required",
        },
        Step::Expect {
            command: "PASS",
            reply: "230 Logged in",
        },
        Step::Expect {
            command: "SYST",
            reply: "215 UNIX Type: L8",
        },
        Step::ExpectMulti {
            command: "FEAT",
            reply_lines: feat_lines,
        },
    ]
}
