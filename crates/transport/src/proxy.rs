//! Sans-IO proxy handshakes. The connect operation sends whatever
//! [`ProxyNegotiator::initial_request`] produces, feeds every received
//! chunk into [`ProxyNegotiator::advance`], and treats the layer as
//! transparent once [`ProxyStep::Done`] is returned.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::net::{IpAddr, ToSocketAddrs};
use thiserror::Error;

/// Supported proxy protocols.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyType {
    /// `CONNECT host:port HTTP/1.1` with optional basic auth.
    HttpConnect,
    /// SOCKS4; the target must resolve to an IPv4 address locally.
    Socks4,
    /// SOCKS5 with optional username/password sub-negotiation.
    Socks5,
}

/// Proxy endpoint and credentials from the engine options.
#[derive(Clone, Debug)]
pub struct ProxySettings {
    /// Which handshake to run.
    pub proxy_type: ProxyType,
    /// Proxy host.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// Username, empty for none.
    pub user: String,
    /// Password, empty for none.
    pub pass: String,
}

/// What the caller should do next.
#[derive(Debug, PartialEq, Eq)]
pub enum ProxyStep {
    /// Send these bytes to the proxy.
    Send(Vec<u8>),
    /// Need more input.
    Continue,
    /// Handshake finished; `leftover` already belongs to the tunnelled
    /// protocol.
    Done {
        /// Bytes received past the end of the handshake.
        leftover: Vec<u8>,
    },
}

/// Handshake failures.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The proxy rejected the CONNECT request.
    #[error("proxy rejected CONNECT: {0}")]
    ConnectRejected(String),
    /// Malformed data where a proxy reply was expected.
    #[error("malformed proxy response")]
    Malformed,
    /// SOCKS4 needs an IPv4 address and none could be resolved.
    #[error("cannot resolve hostname to an IPv4 address for SOCKS4")]
    NoIpv4Address,
    /// The SOCKS server refused the request or the authentication.
    #[error("SOCKS request failed with code {0}")]
    SocksRejected(u8),
    /// The server requires an authentication method we cannot offer.
    #[error("proxy requires an unsupported authentication method")]
    NoAcceptableAuth,
    /// Username or password exceed the SOCKS5 length limit.
    #[error("SOCKS5 usernames and passwords are limited to 255 bytes")]
    CredentialsTooLong,
}

enum State {
    HttpWait,
    Socks5Method,
    Socks5Auth,
    Socks5Request { reply_needed: usize },
    Socks4Reply,
    Done,
}

/// One proxy handshake in progress.
pub struct ProxyNegotiator {
    settings: ProxySettings,
    target_host: String,
    target_port: u16,
    state: State,
    buffer: Vec<u8>,
}

impl ProxyNegotiator {
    /// Prepares a handshake tunnelling to `target_host:target_port`.
    #[must_use]
    pub fn new(settings: ProxySettings, target_host: String, target_port: u16) -> Self {
        let state = match settings.proxy_type {
            ProxyType::HttpConnect => State::HttpWait,
            ProxyType::Socks4 => State::Socks4Reply,
            ProxyType::Socks5 => State::Socks5Method,
        };
        Self {
            settings,
            target_host,
            target_port,
            state,
            buffer: Vec::new(),
        }
    }

    /// Host the raw socket must connect to (the proxy, not the target).
    #[must_use]
    pub fn endpoint(&self) -> (&str, u16) {
        (&self.settings.host, self.settings.port)
    }

    /// The first bytes to send once the proxy connection is up.
    pub fn initial_request(&mut self) -> Result<Vec<u8>, ProxyError> {
        match self.settings.proxy_type {
            ProxyType::HttpConnect => {
                let mut request = format!(
                    "CONNECT {0}:{1} HTTP/1.1\r\nHost: {0}:{1}\r\n",
                    self.target_host, self.target_port
                );
                if !self.settings.user.is_empty() {
                    let credentials =
                        BASE64.encode(format!("{}:{}", self.settings.user, self.settings.pass));
                    request.push_str("Proxy-Authorization: Basic ");
                    request.push_str(&credentials);
                    request.push_str("\r\n");
                }
                request.push_str("\r\n");
                Ok(request.into_bytes())
            }
            ProxyType::Socks4 => {
                let ip = resolve_ipv4(&self.target_host, self.target_port)?;
                let mut request = vec![4, 1];
                request.extend_from_slice(&self.target_port.to_be_bytes());
                request.extend_from_slice(&ip);
                request.push(0);
                Ok(request)
            }
            ProxyType::Socks5 => {
                if self.settings.user.len() > 255 || self.settings.pass.len() > 255 {
                    return Err(ProxyError::CredentialsTooLong);
                }
                Ok(if self.settings.user.is_empty() {
                    vec![5, 1, 0]
                } else {
                    vec![5, 2, 0, 2]
                })
            }
        }
    }

    /// Feeds received bytes into the state machine.
    pub fn advance(&mut self, input: &[u8]) -> Result<ProxyStep, ProxyError> {
        self.buffer.extend_from_slice(input);
        match self.state {
            State::HttpWait => self.advance_http(),
            State::Socks5Method => self.advance_socks5_method(),
            State::Socks5Auth => self.advance_socks5_auth(),
            State::Socks5Request { reply_needed } => self.advance_socks5_request(reply_needed),
            State::Socks4Reply => self.advance_socks4(),
            State::Done => Ok(ProxyStep::Done {
                leftover: std::mem::take(&mut self.buffer),
            }),
        }
    }

    fn advance_http(&mut self) -> Result<ProxyStep, ProxyError> {
        let Some(end) = find_header_end(&self.buffer) else {
            return Ok(ProxyStep::Continue);
        };
        let header = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
        let status = header.lines().next().unwrap_or_default();
        if !status
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("HTTP/"))
        {
            return Err(ProxyError::Malformed);
        }
        let code = status.split_whitespace().nth(1).unwrap_or_default();
        if !code.starts_with('2') {
            return Err(ProxyError::ConnectRejected(status.to_owned()));
        }
        let leftover = self.buffer.split_off(end + 4);
        self.state = State::Done;
        Ok(ProxyStep::Done { leftover })
    }

    fn advance_socks4(&mut self) -> Result<ProxyStep, ProxyError> {
        if self.buffer.len() < 8 {
            return Ok(ProxyStep::Continue);
        }
        if self.buffer[0] != 0 {
            return Err(ProxyError::Malformed);
        }
        if self.buffer[1] != 0x5a {
            return Err(ProxyError::SocksRejected(self.buffer[1]));
        }
        let leftover = self.buffer.split_off(8);
        self.state = State::Done;
        Ok(ProxyStep::Done { leftover })
    }

    fn advance_socks5_method(&mut self) -> Result<ProxyStep, ProxyError> {
        if self.buffer.len() < 2 {
            return Ok(ProxyStep::Continue);
        }
        if self.buffer[0] != 5 {
            return Err(ProxyError::Malformed);
        }
        let method = self.buffer[1];
        self.buffer.drain(..2);
        match method {
            0 => {
                self.state = State::Socks5Request { reply_needed: 0 };
                Ok(ProxyStep::Send(self.socks5_connect_request()?))
            }
            2 => {
                if self.settings.user.is_empty() {
                    return Err(ProxyError::NoAcceptableAuth);
                }
                self.state = State::Socks5Auth;
                let mut request = vec![1, self.settings.user.len() as u8];
                request.extend_from_slice(self.settings.user.as_bytes());
                request.push(self.settings.pass.len() as u8);
                request.extend_from_slice(self.settings.pass.as_bytes());
                Ok(ProxyStep::Send(request))
            }
            _ => Err(ProxyError::NoAcceptableAuth),
        }
    }

    fn advance_socks5_auth(&mut self) -> Result<ProxyStep, ProxyError> {
        if self.buffer.len() < 2 {
            return Ok(ProxyStep::Continue);
        }
        if self.buffer[1] != 0 {
            return Err(ProxyError::SocksRejected(self.buffer[1]));
        }
        self.buffer.drain(..2);
        self.state = State::Socks5Request { reply_needed: 0 };
        Ok(ProxyStep::Send(self.socks5_connect_request()?))
    }

    fn advance_socks5_request(&mut self, reply_needed: usize) -> Result<ProxyStep, ProxyError> {
        // First figure out how long the reply is: 4 byte header, then an
        // address whose length depends on its type, then the port.
        let mut needed = reply_needed;
        if needed == 0 {
            if self.buffer.len() < 5 {
                return Ok(ProxyStep::Continue);
            }
            if self.buffer[0] != 5 {
                return Err(ProxyError::Malformed);
            }
            if self.buffer[1] != 0 {
                return Err(ProxyError::SocksRejected(self.buffer[1]));
            }
            needed = match self.buffer[3] {
                1 => 10,
                3 => 7 + usize::from(self.buffer[4]),
                4 => 22,
                _ => return Err(ProxyError::Malformed),
            };
            self.state = State::Socks5Request {
                reply_needed: needed,
            };
        }
        if self.buffer.len() < needed {
            return Ok(ProxyStep::Continue);
        }
        let leftover = self.buffer.split_off(needed);
        self.buffer.clear();
        self.state = State::Done;
        Ok(ProxyStep::Done { leftover })
    }

    fn socks5_connect_request(&self) -> Result<Vec<u8>, ProxyError> {
        let host = self.target_host.as_bytes();
        if host.len() > 255 {
            return Err(ProxyError::Malformed);
        }
        let mut request = vec![5, 1, 0];
        match self.target_host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => {
                request.push(1);
                request.extend_from_slice(&ip.octets());
            }
            Ok(IpAddr::V6(ip)) => {
                request.push(4);
                request.extend_from_slice(&ip.octets());
            }
            Err(_) => {
                request.push(3);
                request.push(host.len() as u8);
                request.extend_from_slice(host);
            }
        }
        request.extend_from_slice(&self.target_port.to_be_bytes());
        Ok(request)
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn resolve_ipv4(host: &str, port: u16) -> Result<[u8; 4], ProxyError> {
    let addresses = (host, port)
        .to_socket_addrs()
        .map_err(|_| ProxyError::NoIpv4Address)?;
    for address in addresses {
        if let IpAddr::V4(ip) = address.ip() {
            return Ok(ip.octets());
        }
    }
    Err(ProxyError::NoIpv4Address)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(proxy_type: ProxyType, user: &str, pass: &str) -> ProxySettings {
        ProxySettings {
            proxy_type,
            host: "proxy.example".into(),
            port: 3128,
            user: user.into(),
            pass: pass.into(),
        }
    }

    #[test]
    fn http_connect_round_trip() {
        let mut negotiator = ProxyNegotiator::new(
            settings(ProxyType::HttpConnect, "u", "p"),
            "target.example".into(),
            21,
        );
        let request = negotiator.initial_request().expect("request builds");
        let text = String::from_utf8(request).expect("ascii request");
        assert!(text.starts_with("CONNECT target.example:21 HTTP/1.1\r\n"));
        assert!(text.contains("Proxy-Authorization: Basic dTpw\r\n"));
        assert!(text.ends_with("\r\n\r\n"));

        let step = negotiator
            .advance(b"HTTP/1.0 200 Connection established\r\n\r\n220 hi\r\n")
            .expect("accepted");
        assert_eq!(
            step,
            ProxyStep::Done {
                leftover: b"220 hi\r\n".to_vec()
            }
        );
    }

    #[test]
    fn http_connect_rejection_is_an_error() {
        let mut negotiator = ProxyNegotiator::new(
            settings(ProxyType::HttpConnect, "", ""),
            "t".into(),
            21,
        );
        let _ = negotiator.initial_request().expect("request builds");
        assert!(negotiator
            .advance(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
            .is_err());
    }

    #[test]
    fn split_responses_keep_state() {
        let mut negotiator = ProxyNegotiator::new(
            settings(ProxyType::HttpConnect, "", ""),
            "t".into(),
            21,
        );
        let _ = negotiator.initial_request().expect("request builds");
        assert_eq!(
            negotiator.advance(b"HTTP/1.1 200 OK\r\n").expect("partial"),
            ProxyStep::Continue
        );
        assert_eq!(
            negotiator.advance(b"\r\n").expect("complete"),
            ProxyStep::Done { leftover: vec![] }
        );
    }

    #[test]
    fn socks5_anonymous_flow() {
        let mut negotiator = ProxyNegotiator::new(
            settings(ProxyType::Socks5, "", ""),
            "target.example".into(),
            2121,
        );
        assert_eq!(
            negotiator.initial_request().expect("greeting"),
            vec![5, 1, 0]
        );

        let step = negotiator.advance(&[5, 0]).expect("method selected");
        let ProxyStep::Send(request) = step else {
            panic!("expected a connect request");
        };
        assert_eq!(&request[..4], &[5, 1, 0, 3]);
        assert_eq!(request[4] as usize, "target.example".len());
        assert_eq!(&request[request.len() - 2..], &2121u16.to_be_bytes());

        // IPv4-bound reply plus tunnelled payload in the same chunk.
        let mut reply = vec![5, 0, 0, 1, 127, 0, 0, 1, 0, 21];
        reply.extend_from_slice(b"220");
        let step = negotiator.advance(&reply).expect("connected");
        assert_eq!(
            step,
            ProxyStep::Done {
                leftover: b"220".to_vec()
            }
        );
    }

    #[test]
    fn socks5_password_subnegotiation() {
        let mut negotiator = ProxyNegotiator::new(
            settings(ProxyType::Socks5, "user", "secret"),
            "t".into(),
            21,
        );
        assert_eq!(
            negotiator.initial_request().expect("greeting"),
            vec![5, 2, 0, 2]
        );
        let ProxyStep::Send(auth) = negotiator.advance(&[5, 2]).expect("auth requested") else {
            panic!("expected auth packet");
        };
        assert_eq!(auth[0], 1);
        assert_eq!(&auth[2..6], b"user");

        let ProxyStep::Send(_) = negotiator.advance(&[1, 0]).expect("auth ok") else {
            panic!("expected connect request");
        };
        assert!(negotiator.advance(&[5, 1, 0, 1, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn socks4_rejection_code_is_surfaced() {
        let mut negotiator = ProxyNegotiator::new(
            settings(ProxyType::Socks4, "", ""),
            "127.0.0.1".into(),
            21,
        );
        let request = negotiator.initial_request().expect("request builds");
        assert_eq!(&request[..2], &[4, 1]);
        assert_eq!(&request[2..4], &21u16.to_be_bytes());
        assert_eq!(&request[4..8], &[127, 0, 0, 1]);

        match negotiator.advance(&[0, 0x5b, 0, 0, 0, 0, 0, 0]) {
            Err(ProxyError::SocksRejected(0x5b)) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
