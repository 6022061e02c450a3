#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `transport` is the byte-moving bottom of the engine: a blocking TCP
//! [`Socket`](socket::Socket) whose reader thread posts received chunks
//! into the owning engine's event queue, a [`Backend`](backend::Backend)
//! that accounts every byte against the process-wide rate limiter, a
//! sans-IO [`TlsSession`](tls::TlsSession) built on rustls with
//! trust-on-first-use verification, and sans-IO
//! [`ProxyNegotiator`](proxy::ProxyNegotiator)s for HTTP CONNECT, SOCKS4
//! and SOCKS5.
//!
//! The TLS and proxy pieces never touch a socket themselves: they consume
//! and produce byte buffers, which keeps the layering testable and lets
//! the operation code stack them in any order the handshake requires.

pub mod backend;
pub mod proxy;
pub mod socket;
pub mod tls;

pub use backend::Backend;
pub use proxy::{ProxyError, ProxyNegotiator, ProxySettings, ProxyStep, ProxyType};
pub use socket::{Socket, SocketError, SocketEvent, SocketEventKind, SocketOptions, SocketSource};
pub use tls::{AlgorithmWarnings, TlsError, TlsSession, TlsStatus};
