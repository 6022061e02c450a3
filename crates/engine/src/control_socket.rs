//! The generic control socket: transport plumbing, TLS layering, the
//! operation stack and the driver loop that runs whichever operation is
//! on top.

use crate::ftp::FtpState;
use crate::http::HttpState;
use crate::notification::AsyncReply;
use crate::operation::{OpCtx, Operation, WireEvent};
use crate::services::Services;
use crate::sftp::SftpState;
use logging::MessageKind;
use protocol::{PathSyntax, ReplyCode, Server, ServerPath, TransferDirection};
use std::net::TcpStream;
use std::time::{Duration, Instant};
use transport::{Backend, SocketEvent, SocketEventKind, SocketSource, TlsSession};

/// Transport plumbing of the control connection: backend, optional TLS
/// layer, decrypted receive buffer and the no-I/O watchdog.
pub(crate) struct Connection {
    backend: Option<Backend>,
    pub tls: Option<TlsSession>,
    proxy: Option<transport::ProxyNegotiator>,
    pub recv: Vec<u8>,
    timeout: Duration,
    watchdog: Option<Instant>,
    watchdog_suspended: bool,
}

/// Outcome of feeding received bytes through the layer stack.
#[derive(Default)]
pub(crate) struct IngestResult {
    pub tls_handshake_done: bool,
    pub proxy_done: bool,
    pub closed: bool,
}

impl Connection {
    pub fn new(timeout: Duration) -> Self {
        Self {
            backend: None,
            tls: None,
            proxy: None,
            recv: Vec::new(),
            timeout,
            watchdog: None,
            watchdog_suspended: false,
        }
    }

    /// Installs a proxy negotiator; received bytes are routed into the
    /// handshake until it completes.
    pub fn set_proxy(&mut self, negotiator: transport::ProxyNegotiator) {
        self.proxy = Some(negotiator);
    }

    /// Sends the proxy handshake's opening bytes; call once the TCP
    /// connection to the proxy is up.
    pub fn kick_proxy(&mut self) -> Result<(), ReplyCode> {
        let Some(proxy) = self.proxy.as_mut() else {
            return Ok(());
        };
        let request = proxy
            .initial_request()
            .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
        let backend = self
            .backend
            .as_mut()
            .ok_or(ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
        backend
            .send_all(&request)
            .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
        self.set_alive();
        Ok(())
    }

    /// Returns `true` while a proxy handshake is still in progress.
    pub fn proxy_handshaking(&self) -> bool {
        self.proxy.is_some()
    }

    /// Installs the backend of a socket that started connecting.
    pub fn set_backend(&mut self, backend: Backend) {
        self.backend = Some(backend);
        self.arm_watchdog();
    }

    /// Attaches the connected stream's write half.
    pub fn attach_stream(&mut self, stream: TcpStream) {
        if let Some(backend) = self.backend.as_mut() {
            backend.attach(stream);
        }
        self.set_alive();
    }

    pub fn is_connected(&self) -> bool {
        self.backend.as_ref().is_some_and(Backend::is_connected)
    }

    /// Sends one protocol line, appending CRLF, through TLS when active.
    pub fn send_line(&mut self, line: &str) -> Result<(), ReplyCode> {
        let mut wire = Vec::with_capacity(line.len() + 2);
        wire.extend_from_slice(line.as_bytes());
        wire.extend_from_slice(b"\r\n");
        self.send_raw(&wire)
    }

    /// Sends raw bytes through TLS when active.
    pub fn send_raw(&mut self, data: &[u8]) -> Result<(), ReplyCode> {
        let backend = self
            .backend
            .as_mut()
            .ok_or(ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
        let result = match self.tls.as_mut() {
            Some(tls) => {
                let wire = tls
                    .write_plain(data)
                    .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
                backend.send_all(&wire)
            }
            None => backend.send_all(data),
        };
        result.map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
        self.set_alive();
        Ok(())
    }

    /// Starts a TLS handshake on the control connection.
    pub fn start_tls(&mut self, server_name: &str) -> Result<(), ReplyCode> {
        let mut tls = TlsSession::new(server_name)
            .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
        let hello = tls
            .take_wire()
            .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
        let backend = self
            .backend
            .as_mut()
            .ok_or(ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
        backend
            .send_all(&hello)
            .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
        self.tls = Some(tls);
        Ok(())
    }

    /// Pushes received wire bytes through the TLS layer (when present)
    /// into the receive buffer.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<IngestResult, ReplyCode> {
        self.set_alive();
        let mut result = IngestResult::default();

        // The proxy layer sits below everything else; until its
        // handshake completes, every received byte belongs to it.
        let proxied;
        let bytes = if let Some(mut proxy) = self.proxy.take() {
            let step = proxy
                .advance(bytes)
                .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
            match step {
                transport::ProxyStep::Send(outgoing) => {
                    self.proxy = Some(proxy);
                    let backend = self
                        .backend
                        .as_mut()
                        .ok_or(ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
                    backend
                        .send_all(&outgoing)
                        .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
                    return Ok(result);
                }
                transport::ProxyStep::Continue => {
                    self.proxy = Some(proxy);
                    return Ok(result);
                }
                transport::ProxyStep::Done { leftover } => {
                    result.proxy_done = true;
                    proxied = leftover;
                    proxied.as_slice()
                }
            }
        } else {
            bytes
        };

        match self.tls.as_mut() {
            Some(tls) => {
                let status = tls
                    .read_wire(bytes)
                    .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
                self.recv.extend_from_slice(&status.plaintext);
                result.tls_handshake_done = status.handshake_complete;
                result.closed = status.closed;
                // Handshake records produced in response must go out.
                let outgoing = tls
                    .take_wire()
                    .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
                if !outgoing.is_empty() {
                    if let Some(backend) = self.backend.as_mut() {
                        backend
                            .send_all(&outgoing)
                            .map_err(|_| ReplyCode::ERROR | ReplyCode::DISCONNECTED)?;
                    }
                }
            }
            None => self.recv.extend_from_slice(bytes),
        }
        Ok(result)
    }

    /// Re-arms the no-I/O watchdog; called on every successful read or
    /// write.
    pub fn set_alive(&mut self) {
        if !self.watchdog_suspended {
            self.arm_watchdog();
        }
    }

    fn arm_watchdog(&mut self) {
        if self.timeout > Duration::ZERO {
            self.watchdog = Some(Instant::now() + self.timeout);
        }
    }

    /// Pauses the watchdog while an async request or lock wait is
    /// outstanding.
    pub fn suspend_watchdog(&mut self, suspended: bool) {
        self.watchdog_suspended = suspended;
        if suspended {
            self.watchdog = None;
        } else {
            self.arm_watchdog();
        }
    }

    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.watchdog
    }

    /// Drops the transport.
    pub fn close(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.close();
        }
        self.tls = None;
        self.recv.clear();
        self.watchdog = None;
    }

    /// Takes everything received so far (byte-oriented protocols).
    pub fn take_recv(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.recv)
    }
}

/// Protocol-specific session state.
pub(crate) enum ProtocolState {
    Ftp(FtpState),
    Http(HttpState),
    Sftp(SftpState),
}

impl ProtocolState {
    pub fn ftp_mut(&mut self) -> Option<&mut FtpState> {
        match self {
            Self::Ftp(state) => Some(state),
            _ => None,
        }
    }

    pub fn http_mut(&mut self) -> Option<&mut HttpState> {
        match self {
            Self::Http(state) => Some(state),
            _ => None,
        }
    }

    pub fn sftp_mut(&mut self) -> Option<&mut SftpState> {
        match self {
            Self::Sftp(state) => Some(state),
            _ => None,
        }
    }
}

/// Session identity and the protocol driver's state.
pub(crate) struct SessionState {
    pub server: Server,
    pub syntax: PathSyntax,
    pub current_path: Option<ServerPath>,
    pub protocol: ProtocolState,
    pub logged_in: bool,
}

/// What the driver loop reports back to the engine.
#[derive(Debug)]
pub(crate) enum DriveOutcome {
    /// Nothing to do (empty stack).
    Idle,
    /// The top operation is parked on a suspension point.
    Parked,
    /// The whole stack unwound; the command is finished.
    Finished {
        code: ReplyCode,
        command: &'static str,
    },
}

impl DriveOutcome {
    pub fn finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// One control socket: connection, session state, operation stack.
pub(crate) struct ControlSocket {
    pub conn: Connection,
    pub session: SessionState,
    stack: Vec<Box<dyn Operation>>,
}

impl ControlSocket {
    pub fn new(server: Server, protocol: ProtocolState, timeout: Duration) -> Self {
        let syntax = PathSyntax::for_server(server.server_type);
        Self {
            conn: Connection::new(timeout),
            session: SessionState {
                server,
                syntax,
                current_path: None,
                protocol,
                logged_in: false,
            },
            stack: Vec::new(),
        }
    }

    pub fn in_command(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Pushes the initial operation of a command and starts driving it.
    pub fn start(&mut self, services: &Services, op: Box<dyn Operation>) -> DriveOutcome {
        self.stack.push(op);
        let (code, pushed) = self.call_top(services, |op, cx| op.send(cx));
        self.advance(services, code, pushed)
    }

    /// Delivers a wire event to the operation on top of the stack.
    pub fn deliver(&mut self, services: &Services, event: WireEvent<'_>) -> DriveOutcome {
        if self.stack.is_empty() {
            return DriveOutcome::Idle;
        }
        let (code, pushed) = self.call_top(services, |op, cx| op.on_event(cx, event));
        self.advance(services, code, pushed)
    }

    /// Delivers an async-request reply to the waiting operation.
    pub fn deliver_async_reply(&mut self, services: &Services, reply: AsyncReply) -> DriveOutcome {
        if self.stack.is_empty() {
            return DriveOutcome::Idle;
        }
        self.conn.suspend_watchdog(false);
        let (code, pushed) = self.call_top(services, |op, cx| op.on_async_reply(cx, reply));
        self.advance(services, code, pushed)
    }

    /// Routes a raw socket event: attaches streams, runs the TLS and
    /// framing layers, and feeds the resulting wire events to the top
    /// operation.
    pub fn handle_socket_event(
        &mut self,
        services: &Services,
        event: SocketEvent,
    ) -> DriveOutcome {
        match event.source {
            SocketSource::Control => self.handle_control_event(services, event.kind),
            SocketSource::Data => self.handle_data_event(services, event.kind),
        }
    }

    fn handle_control_event(
        &mut self,
        services: &Services,
        kind: SocketEventKind,
    ) -> DriveOutcome {
        match kind {
            SocketEventKind::Resolved { addresses } => {
                if let Some(address) = addresses.first() {
                    services.log(
                        MessageKind::Status,
                        format!("Resolved address of {} to {}", self.session.server.host, address),
                    );
                }
                DriveOutcome::Parked
            }
            SocketEventKind::Connecting { address } => {
                services.log(MessageKind::Status, format!("Connecting to {address}..."));
                DriveOutcome::Parked
            }
            SocketEventKind::Connected { stream } => {
                self.conn.attach_stream(stream);
                self.deliver(services, WireEvent::Connected)
            }
            SocketEventKind::Data { bytes } => {
                let ingested = match self.conn.ingest(&bytes) {
                    Ok(result) => result,
                    Err(code) => return self.tear_down(services, code),
                };
                let mut outcome = DriveOutcome::Parked;
                if ingested.proxy_done {
                    outcome = self.deliver(services, WireEvent::ProxyHandshakeDone);
                    if outcome.finished() {
                        return outcome;
                    }
                }
                if ingested.tls_handshake_done {
                    outcome = self.deliver(services, WireEvent::TlsHandshakeDone);
                    if outcome.finished() {
                        return outcome;
                    }
                }
                let outcome2 = self.dispatch_received(services);
                if outcome2.finished() {
                    return outcome2;
                }
                if ingested.closed {
                    return self.deliver(services, WireEvent::Closed { error: None });
                }
                if matches!(outcome2, DriveOutcome::Idle) {
                    outcome
                } else {
                    outcome2
                }
            }
            SocketEventKind::Closed { error } => {
                self.deliver(services, WireEvent::Closed { error })
            }
        }
    }

    /// Turns buffered decrypted bytes into protocol-level events.
    fn dispatch_received(&mut self, services: &Services) -> DriveOutcome {
        if matches!(self.session.protocol, ProtocolState::Ftp(_)) {
            loop {
                let reply = {
                    let Some(ftp) = self.session.protocol.ftp_mut() else {
                        return DriveOutcome::Idle;
                    };
                    ftp.framing.extract(&mut self.conn.recv)
                };
                let Some(reply) = reply else {
                    return DriveOutcome::Idle;
                };
                for line in &reply.lines {
                    services.log(MessageKind::Response, line.clone());
                }
                let outcome = self.deliver(services, WireEvent::FtpReply(&reply));
                if outcome.finished() || self.stack.is_empty() {
                    return outcome;
                }
            }
        } else if matches!(self.session.protocol, ProtocolState::Http(_)) {
            if self.conn.recv.is_empty() {
                return DriveOutcome::Idle;
            }
            let bytes = self.conn.take_recv();
            self.deliver(services, WireEvent::Bytes(&bytes))
        } else {
            DriveOutcome::Idle
        }
    }

    fn handle_data_event(&mut self, services: &Services, kind: SocketEventKind) -> DriveOutcome {
        match kind {
            SocketEventKind::Resolved { .. } | SocketEventKind::Connecting { .. } => {
                DriveOutcome::Parked
            }
            SocketEventKind::Connected { stream } => {
                let host = self.session.server.host.clone();
                let attach_failed = {
                    let Some(data) = self
                        .session
                        .protocol
                        .ftp_mut()
                        .and_then(|ftp| ftp.data.as_mut())
                    else {
                        return DriveOutcome::Idle;
                    };
                    data.backend.attach(stream);
                    data.connected = true;
                    if data.protected {
                        // PROT P: the data channel gets its own TLS
                        // session.
                        match TlsSession::new(&host) {
                            Ok(mut tls) => {
                                if let Ok(hello) = tls.take_wire() {
                                    let _ = data.backend.send_all(&hello);
                                }
                                data.tls = Some(tls);
                                false
                            }
                            Err(_) => true,
                        }
                    } else {
                        false
                    }
                };
                if attach_failed {
                    return self.tear_down(services, ReplyCode::ERROR | ReplyCode::DISCONNECTED);
                }
                self.conn.set_alive();
                self.deliver(services, WireEvent::DataConnected)
            }
            SocketEventKind::Data { bytes } => {
                self.conn.set_alive();
                services.set_activity(TransferDirection::Download);
                let plaintext = {
                    let Some(data) = self
                        .session
                        .protocol
                        .ftp_mut()
                        .and_then(|ftp| ftp.data.as_mut())
                    else {
                        return DriveOutcome::Idle;
                    };
                    match data.tls.as_mut() {
                        Some(tls) => match tls.read_wire(&bytes) {
                            Ok(status) => {
                                let outgoing = tls.take_wire().unwrap_or_default();
                                if !outgoing.is_empty() {
                                    let _ = data.backend.send_all(&outgoing);
                                }
                                Some(status.plaintext)
                            }
                            Err(_) => None,
                        },
                        None => Some(bytes),
                    }
                };
                match plaintext {
                    Some(plaintext) if plaintext.is_empty() => DriveOutcome::Parked,
                    Some(plaintext) => self.deliver(services, WireEvent::DataBytes(&plaintext)),
                    None => self.tear_down(services, ReplyCode::ERROR | ReplyCode::DISCONNECTED),
                }
            }
            SocketEventKind::Closed { error } => {
                self.deliver(services, WireEvent::DataClosed { error })
            }
        }
    }

    /// Forcibly unwinds the stack (cancel, timeout, catastrophic
    /// failure). Locks and resources of every operation are released.
    pub fn tear_down(&mut self, services: &Services, code: ReplyCode) -> DriveOutcome {
        let mut command = None;
        while let Some(mut op) = self.stack.pop() {
            self.release_op(services, op.as_mut());
            command = Some(op.command_name());
        }
        self.conn.close();
        self.session.logged_in = false;
        self.session.current_path = None;
        match command {
            Some(command) => DriveOutcome::Finished { code, command },
            None => DriveOutcome::Idle,
        }
    }

    /// The watchdog fired: time out unless the top operation is inside
    /// one of the watchdog-exempt suspension points.
    pub fn watchdog_expired(&mut self, services: &Services) -> Option<DriveOutcome> {
        let exempt = self
            .stack
            .last()
            .is_some_and(|op| op.waiting_for_async() || op.waiting_for_lock());
        if exempt {
            self.conn.set_alive();
            return None;
        }
        services.log(
            MessageKind::Error,
            "Connection timed out after inactivity".to_owned(),
        );
        Some(self.tear_down(services, ReplyCode::TIMEOUT))
    }

    fn release_op(&mut self, services: &Services, op: &mut dyn Operation) {
        if let Some((reason, path)) = op.held_lock() {
            let key = crate::cache::ServerKey::of(&self.session.server);
            services
                .ctx
                .locks()
                .unlock(&key, &path, reason, services.engine_id);
        }
        let mut cx = OpCtx {
            conn: &mut self.conn,
            session: &mut self.session,
            services,
            pending_push: Vec::new(),
        };
        op.release_resources(&mut cx);
    }

    fn call_top(
        &mut self,
        services: &Services,
        call: impl FnOnce(&mut dyn Operation, &mut OpCtx<'_>) -> ReplyCode,
    ) -> (ReplyCode, bool) {
        let Some(mut op) = self.stack.pop() else {
            return (ReplyCode::INTERNAL_ERROR, false);
        };
        let mut cx = OpCtx {
            conn: &mut self.conn,
            session: &mut self.session,
            services,
            pending_push: Vec::new(),
        };
        let code = call(op.as_mut(), &mut cx);
        let pushes = std::mem::take(&mut cx.pending_push);
        let pushed = !pushes.is_empty();
        self.stack.push(op);
        self.stack.extend(pushes);
        // Async waits pause the watchdog until the reply arrives.
        let waiting = self
            .stack
            .last()
            .is_some_and(|top| top.waiting_for_async());
        self.conn.suspend_watchdog(waiting);
        (code, pushed)
    }

    /// The driver loop: interprets an operation's return code, runs
    /// newly pushed sub-operations, pops finished ones and invokes the
    /// parents' `subcommand_result`.
    fn advance(&mut self, services: &Services, mut code: ReplyCode, mut pushed: bool) -> DriveOutcome {
        loop {
            if pushed {
                // A sub-operation was scheduled; start it.
                let (child_code, child_pushed) = self.call_top(services, |op, cx| op.send(cx));
                code = child_code;
                pushed = child_pushed;
                continue;
            }
            if code.is_continue() {
                let (next, next_pushed) = self.call_top(services, |op, cx| op.send(cx));
                code = next;
                pushed = next_pushed;
                continue;
            }
            if code.would_block() {
                return DriveOutcome::Parked;
            }

            // Terminal for the top operation: pop it.
            let Some(mut finished_op) = self.stack.pop() else {
                return DriveOutcome::Idle;
            };
            self.release_op(services, finished_op.as_mut());

            if self.stack.is_empty() {
                return DriveOutcome::Finished {
                    code,
                    command: finished_op.command_name(),
                };
            }
            let (parent_code, parent_pushed) = self.call_top(services, |op, cx| {
                op.subcommand_result(cx, code, finished_op)
            });
            code = parent_code;
            pushed = parent_pushed;
        }
    }
}
