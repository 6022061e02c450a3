//! FTP connect and logon: socket setup, proxy tunnelling, TLS upgrade,
//! the credential sequence with its five proxy variants, and the
//! post-login capability negotiation.

use super::{failure_code, send_command, Features, FtpReply};
use crate::context::CertTrust;
use crate::notification::{AsyncReply, AsyncRequest};
use crate::operation::{OpCtx, Operation, WireEvent};
use crate::options::{FtpProxySettings, FtpProxyType};
use logging::MessageKind;
use protocol::{CharsetEncoding, LogonType, Protocol, ReplyCode, Server, ServerType};
use std::any::Any;
use transport::{Backend, ProxyNegotiator, Socket, SocketSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Connect,
    WaitConnect,
    WaitProxy,
    WaitImplicitTls,
    Welcome,
    AuthTls,
    AuthSsl,
    WaitTls,
    CertPrompt,
    Pbsz,
    Prot,
    Login,
    Syst,
    Feat,
    Clnt,
    OptsUtf8,
    OptsMlst,
    CustomCommands,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LineKind {
    User,
    Pass,
    Account,
    Other,
}

pub(crate) struct LoginLine {
    kind: LineKind,
    /// Command template; `%p` is substituted at send time so an
    /// interactive prompt can still supply the password.
    command: String,
    optional: bool,
    hide: bool,
}

/// Connect + logon as one operation, mirroring the shape of the
/// protocol: a linear sequence of steps where the configuration decides
/// which steps apply.
pub(crate) struct LogonOp {
    server: Server,
    state: State,
    sequence: Vec<LoginLine>,
    sequence_index: usize,
    custom_index: usize,
    waiting_async: bool,
    password_override: Option<String>,
    tried_auth_ssl: bool,
    tls_active_target: State,
    restarted_with_latin1: bool,
    behind_ftp_proxy: bool,
    /// A reply that arrived while the certificate prompt was open.
    deferred_reply: Option<FtpReply>,
}

impl LogonOp {
    pub fn new(server: Server) -> Self {
        Self {
            server,
            state: State::Connect,
            sequence: Vec::new(),
            sequence_index: 0,
            custom_index: 0,
            waiting_async: false,
            password_override: None,
            tried_auth_ssl: false,
            tls_active_target: State::Welcome,
            restarted_with_latin1: false,
            behind_ftp_proxy: false,
            deferred_reply: None,
        }
    }

    /// Moves to the next applicable step and returns `CONTINUE` so the
    /// driver calls `send` again, or `OK` when the sequence is done.
    fn advance(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        loop {
            let next = match self.state {
                State::Welcome => State::AuthTls,
                State::AuthTls | State::AuthSsl | State::CertPrompt => State::Pbsz,
                State::Pbsz => State::Prot,
                State::Prot => State::Login,
                State::Login => State::Syst,
                State::Syst => State::Feat,
                State::Feat => State::Clnt,
                State::Clnt => State::OptsUtf8,
                State::OptsUtf8 => State::OptsMlst,
                State::OptsMlst => State::CustomCommands,
                State::CustomCommands => {
                    cx.log(MessageKind::Status, "Logged in".to_owned());
                    cx.session.logged_in = true;
                    return ReplyCode::OK;
                }
                // send() drives the pre-login states explicitly.
                other => other,
            };
            self.state = next;
            if self.step_applies(cx) {
                return ReplyCode::CONTINUE;
            }
            if self.state == State::CustomCommands {
                cx.log(MessageKind::Status, "Logged in".to_owned());
                cx.session.logged_in = true;
                return ReplyCode::OK;
            }
        }
    }

    fn step_applies(&self, cx: &mut OpCtx<'_>) -> bool {
        let tls_active = cx.conn.tls.is_some();
        let Some(ftp) = cx.session.protocol.ftp_mut() else {
            return false;
        };
        match self.state {
            State::AuthTls => {
                matches!(self.server.protocol, Protocol::Ftp | Protocol::Ftpes) && !tls_active
            }
            State::Pbsz | State::Prot => tls_active,
            State::Clnt => ftp.use_utf8 && ftp.features.clnt,
            State::OptsUtf8 => ftp.use_utf8 && ftp.features.utf8,
            State::OptsMlst => {
                ftp.features.mlsd && !opts_mlst_argument(&ftp.features.mlst_facts).is_empty()
            }
            State::CustomCommands => !self.server.post_login_commands.is_empty(),
            _ => true,
        }
    }

    fn start_certificate_prompt(&mut self, cx: &mut OpCtx<'_>, next: State) -> ReplyCode {
        self.tls_active_target = next;
        let Some(tls) = cx.conn.tls.as_ref() else {
            return ReplyCode::INTERNAL_ERROR;
        };
        let chain = tls.peer_chain();
        let leaf = chain.first().cloned().unwrap_or_default();
        match cx
            .services
            .ctx
            .check_certificate(&self.server.host, self.server.port, &leaf)
        {
            CertTrust::Trusted => {
                cx.log(
                    MessageKind::Status,
                    format!("TLS connection established: {}", tls.describe()),
                );
                self.state = next;
                if self.step_applies(cx) {
                    ReplyCode::CONTINUE
                } else {
                    self.advance(cx)
                }
            }
            verdict => {
                let session_info = tls.describe();
                let warnings = tls.warnings().bits();
                self.state = State::CertPrompt;
                self.waiting_async = true;
                if verdict == CertTrust::Changed {
                    cx.log(
                        MessageKind::Status,
                        "Server certificate changed since the last session".to_owned(),
                    );
                }
                cx.request_async(AsyncRequest::Certificate {
                    chain,
                    session_info,
                    warnings,
                });
                ReplyCode::WOULDBLOCK
            }
        }
    }

    fn password_for_login(&self) -> Option<String> {
        if let Some(password) = &self.password_override {
            return Some(password.clone());
        }
        match self.server.logon_type {
            LogonType::Ask | LogonType::Interactive => None,
            _ => Some(self.server.logon_pass().to_owned()),
        }
    }

    fn send_login_line(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        let (template, hide) = match self.sequence.get(self.sequence_index) {
            Some(line) => (line.command.clone(), line.hide),
            None => return ReplyCode::INTERNAL_ERROR,
        };
        let command = if template.contains("%p") {
            let Some(password) = self.password_for_login() else {
                self.waiting_async = true;
                cx.request_async(AsyncRequest::InteractiveLogin {
                    challenge: format!(
                        "Password for {}@{}",
                        self.server.logon_user(),
                        self.server.host
                    ),
                });
                return ReplyCode::WOULDBLOCK;
            };
            template.replace("%p", &password)
        } else {
            template
        };
        match send_command(cx, &command, hide) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }

    fn on_login_reply(&mut self, cx: &mut OpCtx<'_>, reply: &FtpReply) -> ReplyCode {
        let line_kind = self
            .sequence
            .get(self.sequence_index)
            .map_or(LineKind::Other, |line| line.kind);

        if reply.is_success() {
            self.sequence_index += 1;
            if self.sequence_index >= self.sequence.len() {
                return self.advance(cx);
            }
            return ReplyCode::CONTINUE;
        }

        if reply.is_intermediate() {
            self.sequence_index += 1;
            if self.sequence_index >= self.sequence.len() {
                cx.log(
                    MessageKind::Error,
                    "Login sequence fully executed yet not logged in".to_owned(),
                );
                if self.server.account.is_empty() {
                    cx.log(
                        MessageKind::Error,
                        "Server might require an account. Try specifying an account using the Site Manager"
                            .to_owned(),
                    );
                }
                return ReplyCode::CRITICAL_ERROR;
            }
            return ReplyCode::CONTINUE;
        }

        // Permanent or transient failure.
        if let Some(line) = self.sequence.get(self.sequence_index) {
            if line.optional {
                self.sequence_index += 1;
                if self.sequence_index >= self.sequence.len() {
                    return self.advance(cx);
                }
                return ReplyCode::CONTINUE;
            }
        }

        // Auto-charset fallback: a rejected login with non-ASCII
        // credentials on an auto-detect session restarts in Latin-1.
        let non_ascii = !self.server.user.is_ascii() || !self.server.pass.is_ascii();
        let auto = self.server.encoding == CharsetEncoding::Auto;
        let use_utf8 = cx
            .session
            .protocol
            .ftp_mut()
            .is_some_and(|ftp| ftp.use_utf8);
        if auto && use_utf8 && non_ascii && !self.restarted_with_latin1 && !self.behind_ftp_proxy {
            cx.log(
                MessageKind::Status,
                "Login failed, retrying with local charset".to_owned(),
            );
            if let Some(ftp) = cx.session.protocol.ftp_mut() {
                ftp.use_utf8 = false;
            }
            self.restarted_with_latin1 = true;
            self.sequence_index = 0;
            return ReplyCode::CONTINUE;
        }

        if line_kind == LineKind::Pass && reply.is_permanent_failure() {
            return ReplyCode::CRITICAL_ERROR | ReplyCode::PASSWORD_FAILED;
        }
        failure_code(reply)
    }
}

impl Operation for LogonOp {
    fn command_name(&self) -> &'static str {
        "connect"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        match self.state {
            State::Connect => {
                let options = cx.services.ctx.options();
                self.behind_ftp_proxy =
                    options.ftp_proxy.proxy_type != FtpProxyType::None && !self.server.bypass_proxy;
                self.sequence = build_login_sequence(&self.server, &options.ftp_proxy);

                let socket_proxy = options
                    .proxy
                    .clone()
                    .filter(|_| !self.server.bypass_proxy);
                let (host, port) = match &socket_proxy {
                    Some(proxy) => (proxy.host.clone(), proxy.port),
                    None => (self.server.host.clone(), self.server.port),
                };
                cx.log(
                    MessageKind::Status,
                    format!("Connecting to {}:{}...", self.server.host, self.server.port),
                );
                if let Some(settings) = socket_proxy {
                    cx.conn.set_proxy(ProxyNegotiator::new(
                        settings,
                        self.server.host.clone(),
                        self.server.port,
                    ));
                }
                let socket = Socket::connect(
                    host,
                    port,
                    SocketSource::Control,
                    cx.services.socket_options(),
                    cx.services.ctx.limiter().clone(),
                    cx.services.socket_sink(),
                );
                cx.conn.set_backend(Backend::new(socket));
                self.state = State::WaitConnect;
                ReplyCode::WOULDBLOCK
            }
            State::Login => self.send_login_line(cx),
            State::AuthTls => match send_command(cx, "AUTH TLS", false) {
                Ok(()) => ReplyCode::WOULDBLOCK,
                Err(code) => code,
            },
            State::AuthSsl => match send_command(cx, "AUTH SSL", false) {
                Ok(()) => ReplyCode::WOULDBLOCK,
                Err(code) => code,
            },
            State::Pbsz => match send_command(cx, "PBSZ 0", false) {
                Ok(()) => ReplyCode::WOULDBLOCK,
                Err(code) => code,
            },
            State::Prot => match send_command(cx, "PROT P", false) {
                Ok(()) => ReplyCode::WOULDBLOCK,
                Err(code) => code,
            },
            State::Syst => match send_command(cx, "SYST", false) {
                Ok(()) => ReplyCode::WOULDBLOCK,
                Err(code) => code,
            },
            State::Feat => match send_command(cx, "FEAT", false) {
                Ok(()) => ReplyCode::WOULDBLOCK,
                Err(code) => code,
            },
            State::Clnt => match send_command(cx, "CLNT oc-ferry", false) {
                Ok(()) => ReplyCode::WOULDBLOCK,
                Err(code) => code,
            },
            State::OptsUtf8 => match send_command(cx, "OPTS UTF8 ON", false) {
                Ok(()) => ReplyCode::WOULDBLOCK,
                Err(code) => code,
            },
            State::OptsMlst => {
                let argument = cx
                    .session
                    .protocol
                    .ftp_mut()
                    .map(|ftp| opts_mlst_argument(&ftp.features.mlst_facts))
                    .unwrap_or_default();
                match send_command(cx, &format!("OPTS MLST {argument}"), false) {
                    Ok(()) => ReplyCode::WOULDBLOCK,
                    Err(code) => code,
                }
            }
            State::CustomCommands => {
                let Some(command) = self
                    .server
                    .post_login_commands
                    .get(self.custom_index)
                    .cloned()
                else {
                    return ReplyCode::INTERNAL_ERROR;
                };
                match send_command(cx, &command, false) {
                    Ok(()) => ReplyCode::WOULDBLOCK,
                    Err(code) => code,
                }
            }
            // The waiting states have nothing to send.
            _ => ReplyCode::WOULDBLOCK,
        }
    }

    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode {
        match event {
            WireEvent::Connected => {
                if cx.conn.proxy_handshaking() {
                    self.state = State::WaitProxy;
                    if let Err(code) = cx.conn.kick_proxy() {
                        return code;
                    }
                    return ReplyCode::WOULDBLOCK;
                }
                self.after_tunnel(cx)
            }
            WireEvent::ProxyHandshakeDone => self.after_tunnel(cx),
            WireEvent::TlsHandshakeDone => {
                let next = if self.state == State::WaitImplicitTls {
                    State::Welcome
                } else {
                    State::Pbsz
                };
                self.start_certificate_prompt(cx, next)
            }
            WireEvent::Closed { error } => {
                if let Some(error) = error {
                    cx.log(
                        MessageKind::Error,
                        format!("Could not connect to server: {error:?}"),
                    );
                }
                ReplyCode::ERROR | ReplyCode::DISCONNECTED
            }
            WireEvent::FtpReply(reply) => self.on_reply(cx, reply),
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn on_async_reply(&mut self, cx: &mut OpCtx<'_>, reply: AsyncReply) -> ReplyCode {
        self.waiting_async = false;
        match reply {
            AsyncReply::Certificate { trust } => {
                if !trust {
                    cx.log(MessageKind::Error, "Certificate rejected".to_owned());
                    return ReplyCode::ERROR | ReplyCode::DISCONNECTED | ReplyCode::CRITICAL_ERROR;
                }
                if let Some(tls) = cx.conn.tls.as_ref() {
                    if let Some(leaf) = tls.peer_chain().first().cloned() {
                        cx.services.ctx.pin_certificate(
                            &self.server.host,
                            self.server.port,
                            leaf,
                        );
                    }
                    cx.log(
                        MessageKind::Status,
                        format!("TLS connection established: {}", tls.describe()),
                    );
                }
                self.state = self.tls_active_target;
                if let Some(deferred) = self.deferred_reply.take() {
                    return self.on_reply(cx, &deferred);
                }
                if self.state == State::Welcome {
                    // The banner may already be buffered behind the
                    // handshake; nothing to send until it arrives.
                    return ReplyCode::WOULDBLOCK;
                }
                if self.step_applies(cx) {
                    ReplyCode::CONTINUE
                } else {
                    self.advance(cx)
                }
            }
            AsyncReply::InteractiveLogin { password } => {
                self.password_override = Some(password);
                ReplyCode::CONTINUE
            }
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn waiting_for_async(&self) -> bool {
        self.waiting_async
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

impl LogonOp {
    /// The transport below the control connection is ready (TCP and,
    /// when configured, the proxy tunnel).
    fn after_tunnel(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.server.protocol == Protocol::Ftps {
            self.state = State::WaitImplicitTls;
            if let Err(code) = cx.conn.start_tls(&self.server.host) {
                return code;
            }
            return ReplyCode::WOULDBLOCK;
        }
        self.state = State::Welcome;
        ReplyCode::WOULDBLOCK
    }

    fn on_reply(&mut self, cx: &mut OpCtx<'_>, reply: &FtpReply) -> ReplyCode {
        match self.state {
            // A banner racing the TLS handshake or the trust prompt is
            // held until the session is ready for it.
            State::WaitImplicitTls | State::WaitTls | State::CertPrompt => {
                self.deferred_reply = Some(reply.clone());
                ReplyCode::WOULDBLOCK
            }
            State::Welcome => {
                if reply.is_permanent_failure() {
                    return ReplyCode::CRITICAL_ERROR;
                }
                if !reply.is_success() {
                    return failure_code(reply);
                }
                self.advance(cx)
            }
            State::AuthTls => {
                if reply.is_success() {
                    if let Err(code) = cx.conn.start_tls(&self.server.host) {
                        return code;
                    }
                    self.state = State::WaitTls;
                    return ReplyCode::WOULDBLOCK;
                }
                if self.server.protocol == Protocol::Ftp {
                    // Legacy servers may only know AUTH SSL.
                    if !self.tried_auth_ssl {
                        self.tried_auth_ssl = true;
                        self.state = State::AuthSsl;
                        return ReplyCode::CONTINUE;
                    }
                }
                failure_code(reply)
            }
            State::AuthSsl => {
                if reply.is_success() {
                    if let Err(code) = cx.conn.start_tls(&self.server.host) {
                        return code;
                    }
                    self.state = State::WaitTls;
                    return ReplyCode::WOULDBLOCK;
                }
                // Plain FTP may continue without TLS; the protected
                // variants must not.
                if self.server.protocol == Protocol::Ftp {
                    cx.log(
                        MessageKind::Status,
                        "Server does not support TLS, continuing unencrypted".to_owned(),
                    );
                    self.state = State::Login;
                    return ReplyCode::CONTINUE;
                }
                ReplyCode::CRITICAL_ERROR
            }
            State::Pbsz => {
                // PBSZ failures are not fatal on their own.
                self.advance(cx)
            }
            State::Prot => {
                if reply.is_success() || reply.is_intermediate() {
                    if let Some(ftp) = cx.session.protocol.ftp_mut() {
                        ftp.protect_data_channel = true;
                    }
                }
                self.advance(cx)
            }
            State::Login => self.on_login_reply(cx, reply),
            State::Syst => {
                if reply.is_success() {
                    let system = reply.text().to_owned();
                    if self.server.server_type == ServerType::Default {
                        let upper = system.to_ascii_uppercase();
                        let detected = if upper.starts_with("MVS") {
                            Some(ServerType::Mvs)
                        } else if upper.starts_with("Z/VM") {
                            Some(ServerType::Zvm)
                        } else if upper.starts_with("NONSTOP") {
                            Some(ServerType::HpNonStop)
                        } else {
                            None
                        };
                        if let Some(server_type) = detected {
                            self.server.server_type = server_type;
                            cx.session.server.server_type = server_type;
                            cx.session.syntax = protocol::PathSyntax::for_server(server_type);
                        }
                    }
                }
                self.advance(cx)
            }
            State::Feat => {
                let mut advertises_utf8 = false;
                if reply.is_success() {
                    let features = Features::from_feat(reply);
                    let implies_utc = features.mlsd;
                    advertises_utf8 = features.utf8;
                    if let Some(ftp) = cx.session.protocol.ftp_mut() {
                        ftp.features = features;
                    }
                    if implies_utc {
                        // Machine listings are UTC by definition.
                        cx.session.server.timezone_offset = 0;
                        self.server.timezone_offset = 0;
                    }
                }
                match self.server.encoding {
                    CharsetEncoding::Auto if !advertises_utf8 => {
                        cx.services.log(
                            MessageKind::Status,
                            "Server does not support non-ASCII characters".to_owned(),
                        );
                        if let Some(ftp) = cx.session.protocol.ftp_mut() {
                            ftp.use_utf8 = false;
                        }
                    }
                    CharsetEncoding::Utf8 => {
                        if let Some(ftp) = cx.session.protocol.ftp_mut() {
                            ftp.use_utf8 = true;
                        }
                    }
                    CharsetEncoding::Custom(_) => {
                        if let Some(ftp) = cx.session.protocol.ftp_mut() {
                            ftp.use_utf8 = false;
                        }
                    }
                    _ => {}
                }
                self.advance(cx)
            }
            State::Clnt | State::OptsUtf8 | State::OptsMlst => {
                // Best-effort negotiation; failures are tolerated.
                self.advance(cx)
            }
            State::CustomCommands => {
                if !reply.is_success() {
                    cx.log(
                        MessageKind::Error,
                        format!("Post-login command failed: {}", reply.text()),
                    );
                }
                self.custom_index += 1;
                if self.custom_index < self.server.post_login_commands.len() {
                    return ReplyCode::CONTINUE;
                }
                self.advance(cx)
            }
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }
}

/// Builds the login command sequence for the configured FTP proxy
/// variant.
pub(crate) fn build_login_sequence(server: &Server, proxy: &FtpProxySettings) -> Vec<LoginLine> {
    let user = server.logon_user().to_owned();
    let host_port = format!("{}:{}", server.host, server.port);
    let mut sequence = Vec::new();

    let proxy_type = if server.bypass_proxy {
        FtpProxyType::None
    } else {
        proxy.proxy_type
    };

    let push_proxy_auth = |sequence: &mut Vec<LoginLine>| {
        if !proxy.user.is_empty() {
            sequence.push(LoginLine {
                kind: LineKind::Other,
                command: format!("USER {}", proxy.user),
                optional: false,
                hide: false,
            });
            sequence.push(LoginLine {
                kind: LineKind::Other,
                command: format!("PASS {}", proxy.pass),
                optional: false,
                hide: true,
            });
        }
    };
    let push_user_pass_acct =
        |sequence: &mut Vec<LoginLine>, user_command: String| {
            sequence.push(LoginLine {
                kind: LineKind::User,
                command: user_command,
                optional: false,
                hide: false,
            });
            sequence.push(LoginLine {
                kind: LineKind::Pass,
                command: "PASS %p".to_owned(),
                optional: matches!(server.logon_type, LogonType::Anonymous),
                hide: true,
            });
            if !server.account.is_empty() {
                sequence.push(LoginLine {
                    kind: LineKind::Account,
                    command: format!("ACCT {}", server.account),
                    optional: true,
                    hide: false,
                });
            }
        };

    match proxy_type {
        FtpProxyType::None => {
            push_user_pass_acct(&mut sequence, format!("USER {user}"));
        }
        FtpProxyType::UserAtHost => {
            push_proxy_auth(&mut sequence);
            push_user_pass_acct(&mut sequence, format!("USER {user}@{host_port}"));
        }
        FtpProxyType::Site => {
            push_proxy_auth(&mut sequence);
            sequence.push(LoginLine {
                kind: LineKind::Other,
                command: format!("SITE {host_port}"),
                optional: false,
                hide: false,
            });
            push_user_pass_acct(&mut sequence, format!("USER {user}"));
        }
        FtpProxyType::Open => {
            push_proxy_auth(&mut sequence);
            sequence.push(LoginLine {
                kind: LineKind::Other,
                command: format!("OPEN {host_port}"),
                optional: false,
                hide: false,
            });
            push_user_pass_acct(&mut sequence, format!("USER {user}"));
        }
        FtpProxyType::Custom => {
            for template in &proxy.login_sequence {
                let references_account = template.contains("%a");
                if references_account && server.account.is_empty() {
                    continue;
                }
                let references_proxy_user = template.contains("%s") || template.contains("%w");
                let references_target =
                    template.contains("%h") || template.contains("%u");
                if references_proxy_user && proxy.user.is_empty() && !references_target {
                    continue;
                }
                let expanded = expand_template(template, server, proxy, &host_port);
                let hide = expanded.contains("%p") || template.contains("%w");
                let kind = if template.contains("%p") {
                    LineKind::Pass
                } else if template.contains("%u") {
                    LineKind::User
                } else if template.contains("%a") {
                    LineKind::Account
                } else {
                    LineKind::Other
                };
                sequence.push(LoginLine {
                    kind,
                    command: expanded,
                    optional: false,
                    hide,
                });
            }
        }
    }
    sequence
}

/// Expands every placeholder except `%p`, which stays for send time.
fn expand_template(
    template: &str,
    server: &Server,
    proxy: &FtpProxySettings,
    host_port: &str,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('h') => out.push_str(host_port),
            Some('u') => out.push_str(server.logon_user()),
            Some('p') => out.push_str("%p"),
            Some('a') => out.push_str(&server.account),
            Some('s') => out.push_str(&proxy.user),
            Some('w') => out.push_str(&proxy.pass),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

/// The `OPTS MLST` argument: every fact both sides understand, empty
/// when all wanted facts are already enabled by default.
fn opts_mlst_argument(advertised: &str) -> String {
    const WANTED: &[&str] = &[
        "type",
        "size",
        "modify",
        "perm",
        "unix.mode",
        "unix.owner",
        "unix.ownername",
        "unix.group",
        "unix.groupname",
        "unix.user",
        "unix.uid",
        "unix.gid",
        "x.hidden",
    ];
    let mut supported = Vec::new();
    let mut needs_opts = false;
    for raw_fact in advertised.split(';') {
        let raw_fact = raw_fact.trim();
        if raw_fact.is_empty() {
            continue;
        }
        let (fact, enabled) = match raw_fact.strip_suffix('*') {
            Some(fact) => (fact, true),
            None => (raw_fact, false),
        };
        if WANTED.contains(&fact) {
            supported.push(fact);
            if !enabled {
                needs_opts = true;
            }
        }
    }
    if !needs_opts {
        return String::new();
    }
    let mut argument = String::new();
    for fact in supported {
        argument.push_str(fact);
        argument.push(';');
    }
    argument
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> Server {
        Server {
            host: "example.com".into(),
            port: 21,
            logon_type: LogonType::Normal,
            user: "alice".into(),
            pass: "secret".into(),
            ..Server::default()
        }
    }

    fn commands(sequence: &[LoginLine]) -> Vec<&str> {
        sequence.iter().map(|l| l.command.as_str()).collect()
    }

    #[test]
    fn plain_login_sequence() {
        let sequence = build_login_sequence(&server(), &FtpProxySettings::default());
        assert_eq!(commands(&sequence), vec!["USER alice", "PASS %p"]);
    }

    #[test]
    fn account_rows_are_added_when_configured() {
        let mut server = server();
        server.account = "acct1".into();
        let sequence = build_login_sequence(&server, &FtpProxySettings::default());
        assert_eq!(
            commands(&sequence),
            vec!["USER alice", "PASS %p", "ACCT acct1"]
        );
    }

    #[test]
    fn user_at_host_variant_with_proxy_credentials() {
        let proxy = FtpProxySettings {
            proxy_type: FtpProxyType::UserAtHost,
            host: "proxy:2121".into(),
            user: "pxuser".into(),
            pass: "pxpass".into(),
            login_sequence: Vec::new(),
        };
        let sequence = build_login_sequence(&server(), &proxy);
        assert_eq!(
            commands(&sequence),
            vec![
                "USER pxuser",
                "PASS pxpass",
                "USER alice@example.com:21",
                "PASS %p",
            ]
        );
    }

    #[test]
    fn site_and_open_variants() {
        for (proxy_type, verb) in [(FtpProxyType::Site, "SITE"), (FtpProxyType::Open, "OPEN")] {
            let proxy = FtpProxySettings {
                proxy_type,
                ..FtpProxySettings::default()
            };
            let sequence = build_login_sequence(&server(), &proxy);
            assert_eq!(
                commands(&sequence),
                vec![
                    format!("{verb} example.com:21"),
                    "USER alice".to_owned(),
                    "PASS %p".to_owned(),
                ]
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn custom_sequence_expands_placeholders_and_skips_empty_rows() {
        let proxy = FtpProxySettings {
            proxy_type: FtpProxyType::Custom,
            host: "proxy".into(),
            user: String::new(),
            pass: String::new(),
            login_sequence: vec![
                "USER %s".into(),          // skipped: empty proxy user, no %h/%u
                "USER %u@%h".into(),
                "PASS %p".into(),
                "ACCT %a".into(),          // skipped: empty account
                "SITE 100%% %h".into(),
            ],
        };
        let sequence = build_login_sequence(&server(), &proxy);
        assert_eq!(
            commands(&sequence),
            vec![
                "USER alice@example.com:21",
                "PASS %p",
                "SITE 100% example.com:21",
            ]
        );
    }

    #[test]
    fn bypass_proxy_falls_back_to_the_plain_sequence() {
        let mut server = server();
        server.bypass_proxy = true;
        let proxy = FtpProxySettings {
            proxy_type: FtpProxyType::Site,
            ..FtpProxySettings::default()
        };
        let sequence = build_login_sequence(&server, &proxy);
        assert_eq!(commands(&sequence), vec!["USER alice", "PASS %p"]);
    }

    #[test]
    fn opts_mlst_only_when_a_wanted_fact_is_disabled() {
        assert_eq!(opts_mlst_argument("type*;size*;modify*;"), "");
        assert_eq!(
            opts_mlst_argument("type*;size*;modify*;perm;unix.mode;media-type;"),
            "type;size;modify;perm;unix.mode;"
        );
        assert_eq!(opts_mlst_argument(""), "");
    }
}
