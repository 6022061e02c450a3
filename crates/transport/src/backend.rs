//! Engine-facing facade over a [`Socket`].
//!
//! Operations talk to exactly one backend; whether the bytes then pass
//! through TLS or a proxy is decided by the connect operation stacking
//! the sans-IO layers above this.

use crate::socket::{Socket, SocketError, SocketSource};
use std::net::TcpStream;

/// A connected (or connecting) byte stream with rate accounting.
pub struct Backend {
    socket: Socket,
}

impl Backend {
    /// Wraps a socket that has begun connecting.
    #[must_use]
    pub const fn new(socket: Socket) -> Self {
        Self { socket }
    }

    /// Installs the writer handle delivered by the `Connected` event.
    pub fn attach(&mut self, stream: TcpStream) {
        self.socket.attach(stream);
    }

    /// Returns `true` once the transport is writable.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.socket.is_connected()
    }

    /// Which connection this backend drives.
    #[must_use]
    pub const fn source(&self) -> SocketSource {
        self.socket.source()
    }

    /// Writes as much as the limiter allows; callers keep the remainder
    /// buffered and retry.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, SocketError> {
        self.socket.send(data)
    }

    /// Writes all of `data`, looping over rate-limit grants.
    pub fn send_all(&mut self, data: &[u8]) -> Result<(), SocketError> {
        let mut remaining = data;
        while !remaining.is_empty() {
            let written = self.socket.send(remaining)?;
            remaining = &remaining[written..];
        }
        Ok(())
    }

    /// Tears the connection down.
    pub fn close(&mut self) {
        self.socket.close();
    }
}
