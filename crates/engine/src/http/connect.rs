//! Internal connect sub-operation: establishes (or reuses) the HTTP
//! connection a request needs, including TLS and the trust prompt.

use crate::context::CertTrust;
use crate::notification::{AsyncReply, AsyncRequest};
use crate::operation::{OpCtx, Operation, WireEvent};
use logging::MessageKind;
use protocol::ReplyCode;
use std::any::Any;
use transport::{Backend, ProxyNegotiator, Socket, SocketSource};

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    WaitConnect,
    WaitProxy,
    WaitTls,
    CertPrompt,
}

pub(crate) struct InternalConnectOp {
    host: String,
    port: u16,
    tls: bool,
    state: State,
    waiting_async: bool,
}

impl InternalConnectOp {
    pub fn new(host: String, port: u16, tls: bool) -> Self {
        Self {
            host,
            port,
            tls,
            state: State::Start,
            waiting_async: false,
        }
    }

    fn finish(&self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if let Some(http) = cx.session.protocol.http_mut() {
            http.connected_to = Some((self.host.clone(), self.port, self.tls));
        }
        ReplyCode::OK
    }

    fn after_tunnel(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if !self.tls {
            return self.finish(cx);
        }
        self.state = State::WaitTls;
        match cx.conn.start_tls(&self.host) {
            Ok(()) => ReplyCode::WOULDBLOCK,
            Err(code) => code,
        }
    }
}

impl Operation for InternalConnectOp {
    fn command_name(&self) -> &'static str {
        "connect"
    }

    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode {
        if self.state != State::Start {
            return ReplyCode::WOULDBLOCK;
        }
        let reusable = cx
            .session
            .protocol
            .http_mut()
            .and_then(|http| http.connected_to.clone())
            .is_some_and(|(host, port, tls)| {
                host == self.host && port == self.port && tls == self.tls
            })
            && cx.conn.is_connected();
        if reusable {
            return ReplyCode::OK;
        }

        cx.conn.close();
        if let Some(http) = cx.session.protocol.http_mut() {
            http.connected_to = None;
        }

        let socket_proxy = cx
            .services
            .ctx
            .options()
            .proxy
            .clone()
            .filter(|_| !cx.session.server.bypass_proxy);
        let (connect_host, connect_port) = match &socket_proxy {
            Some(proxy) => (proxy.host.clone(), proxy.port),
            None => (self.host.clone(), self.port),
        };
        if let Some(settings) = socket_proxy {
            cx.conn
                .set_proxy(ProxyNegotiator::new(settings, self.host.clone(), self.port));
        }
        cx.log(
            MessageKind::Status,
            format!("Connecting to {}:{}...", self.host, self.port),
        );
        let socket = Socket::connect(
            connect_host,
            connect_port,
            SocketSource::Control,
            cx.services.socket_options(),
            cx.services.ctx.limiter().clone(),
            cx.services.socket_sink(),
        );
        cx.conn.set_backend(Backend::new(socket));
        self.state = State::WaitConnect;
        ReplyCode::WOULDBLOCK
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
                let Some(tls) = cx.conn.tls.as_ref() else {
                    return ReplyCode::INTERNAL_ERROR;
                };
                let chain = tls.peer_chain();
                let leaf = chain.first().cloned().unwrap_or_default();
                match cx
                    .services
                    .ctx
                    .check_certificate(&self.host, self.port, &leaf)
                {
                    CertTrust::Trusted => self.finish(cx),
                    _ => {
                        let session_info = tls.describe();
                        let warnings = tls.warnings().bits();
                        self.state = State::CertPrompt;
                        self.waiting_async = true;
                        cx.request_async(AsyncRequest::Certificate {
                            chain,
                            session_info,
                            warnings,
                        });
                        ReplyCode::WOULDBLOCK
                    }
                }
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
            _ => ReplyCode::INTERNAL_ERROR,
        }
    }

    fn on_async_reply(&mut self, cx: &mut OpCtx<'_>, reply: AsyncReply) -> ReplyCode {
        self.waiting_async = false;
        match reply {
            AsyncReply::Certificate { trust: true } => {
                if let Some(tls) = cx.conn.tls.as_ref() {
                    if let Some(leaf) = tls.peer_chain().first().cloned() {
                        cx.services.ctx.pin_certificate(&self.host, self.port, leaf);
                    }
                }
                self.finish(cx)
            }
            AsyncReply::Certificate { trust: false } => {
                cx.log(MessageKind::Error, "Certificate rejected".to_owned());
                ReplyCode::ERROR | ReplyCode::DISCONNECTED | ReplyCode::CRITICAL_ERROR
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
