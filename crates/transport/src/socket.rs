//! Blocking TCP socket with a reader thread that feeds the engine loop.
//!
//! The engine thread owns the [`Socket`] value and performs all writes;
//! the reader thread claims inbound tokens from the rate limiter, reads,
//! and posts [`SocketEvent`]s through the sink the engine installed.
//! Connecting also happens on the worker thread so slow name resolution
//! never stalls the engine loop.

use bandwidth::{Direction, RateLimiter, TransportToken};
use socket2::{SockRef, TcpKeepalive};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Read chunk ceiling; also the largest single rate-limiter claim.
const READ_CHUNK: usize = 64 * 1024;

/// Which connection of a session a socket belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketSource {
    /// The control (or only) connection.
    Control,
    /// An FTP data connection.
    Data,
}

/// Events a socket worker posts to its owning engine.
#[derive(Debug)]
pub struct SocketEvent {
    /// Which socket produced the event.
    pub source: SocketSource,
    /// What happened.
    pub kind: SocketEventKind,
}

/// Socket event payloads.
#[derive(Debug)]
pub enum SocketEventKind {
    /// Name resolution finished.
    Resolved {
        /// Candidate addresses in resolver order.
        addresses: Vec<SocketAddr>,
    },
    /// A connection attempt to `address` is starting.
    Connecting {
        /// Target of this attempt.
        address: SocketAddr,
    },
    /// The TCP connection is established; `stream` is the write handle
    /// for the engine thread.
    Connected {
        /// Write half handed to the engine.
        stream: TcpStream,
    },
    /// Bytes arrived on the wire.
    Data {
        /// The received chunk, already rate-accounted.
        bytes: Vec<u8>,
    },
    /// The connection ended; `error` is `None` on an orderly EOF.
    Closed {
        /// I/O error kind for abnormal closes.
        error: Option<std::io::ErrorKind>,
    },
}

/// Sink the worker threads deliver events through.
pub type EventSink = Arc<dyn Fn(SocketEvent) + Send + Sync>;

/// Socket-level failures surfaced to operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The socket is not connected.
    #[error("socket is not connected")]
    NotConnected,
    /// An I/O error from the kernel.
    #[error("socket I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Tuning knobs applied to every new connection.
#[derive(Clone, Debug)]
pub struct SocketOptions {
    /// TCP connect timeout per candidate address.
    pub connect_timeout: Duration,
    /// Keep-alive probe interval; `None` leaves keep-alive off.
    pub keepalive: Option<Duration>,
    /// Kernel receive buffer size; `None` keeps the default.
    pub recv_buffer_size: Option<usize>,
    /// Kernel send buffer size; `None` keeps the default.
    pub send_buffer_size: Option<usize>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            keepalive: Some(Duration::from_secs(30)),
            recv_buffer_size: None,
            send_buffer_size: None,
        }
    }
}

/// One TCP connection plus its reader thread.
pub struct Socket {
    source: SocketSource,
    limiter: RateLimiter,
    token: Arc<TransportToken>,
    writer: Option<TcpStream>,
    shutdown: Arc<AtomicBool>,
}

impl Socket {
    /// Starts resolving and connecting to `host:port` on a worker
    /// thread. Progress and data arrive through `sink`.
    #[must_use]
    pub fn connect(
        host: String,
        port: u16,
        source: SocketSource,
        options: SocketOptions,
        limiter: RateLimiter,
        sink: EventSink,
    ) -> Self {
        let token = Arc::new(limiter.register());
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_limiter = limiter.clone();
        let worker_token = Arc::clone(&token);
        let worker_shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            worker(
                &host,
                port,
                source,
                &options,
                &worker_limiter,
                &worker_token,
                &worker_shutdown,
                &sink,
            );
        });

        Self {
            source,
            limiter,
            token,
            writer: None,
            shutdown,
        }
    }

    /// Installs the write half once the `Connected` event arrives.
    pub fn attach(&mut self, stream: TcpStream) {
        self.writer = Some(stream);
    }

    /// Returns `true` once [`Socket::attach`] has run.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    /// Which connection this socket carries.
    #[must_use]
    pub const fn source(&self) -> SocketSource {
        self.source
    }

    /// Writes as much of `data` as the rate limiter currently allows,
    /// returning the number of bytes accepted by the kernel.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, SocketError> {
        let stream = self.writer.as_mut().ok_or(SocketError::NotConnected)?;
        if data.is_empty() {
            return Ok(0);
        }
        self.limiter.wait(&self.token, Direction::Outbound);
        let budget = self.limiter.available(&self.token, Direction::Outbound);
        let len = if budget < 0 {
            data.len()
        } else {
            data.len().min(usize::try_from(budget).unwrap_or(usize::MAX))
        };
        let written = stream.write(&data[..len])?;
        self.limiter
            .used(&self.token, Direction::Outbound, written as u64);
        Ok(written)
    }

    /// Shuts the connection down and stops the reader thread.
    pub fn close(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(stream) = self.writer.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.close();
    }
}

#[allow(clippy::too_many_arguments)]
fn worker(
    host: &str,
    port: u16,
    source: SocketSource,
    options: &SocketOptions,
    limiter: &RateLimiter,
    token: &TransportToken,
    shutdown: &AtomicBool,
    sink: &EventSink,
) {
    let post = |kind: SocketEventKind| (**sink)(SocketEvent { source, kind });

    let addresses: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(iterator) => iterator.collect(),
        Err(error) => {
            tracing::debug!(host, port, %error, "address resolution failed");
            post(SocketEventKind::Closed {
                error: Some(error.kind()),
            });
            return;
        }
    };
    post(SocketEventKind::Resolved {
        addresses: addresses.clone(),
    });

    let mut last_error = std::io::ErrorKind::AddrNotAvailable;
    let mut connected = None;
    for address in addresses {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        post(SocketEventKind::Connecting { address });
        match TcpStream::connect_timeout(&address, options.connect_timeout) {
            Ok(stream) => {
                connected = Some(stream);
                break;
            }
            Err(error) => {
                tracing::debug!(%address, %error, "connection attempt failed");
                last_error = error.kind();
            }
        }
    }

    let Some(stream) = connected else {
        post(SocketEventKind::Closed {
            error: Some(last_error),
        });
        return;
    };

    configure(&stream, options);

    let reader = match stream.try_clone() {
        Ok(writer) => {
            post(SocketEventKind::Connected { stream: writer });
            stream
        }
        Err(error) => {
            post(SocketEventKind::Closed {
                error: Some(error.kind()),
            });
            return;
        }
    };

    read_loop(reader, limiter, token, shutdown, &post);
}

fn configure(stream: &TcpStream, options: &SocketOptions) {
    let _ = stream.set_nodelay(true);
    let socket = SockRef::from(stream);
    if let Some(interval) = options.keepalive {
        let _ = socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(interval));
    }
    if let Some(size) = options.recv_buffer_size {
        let _ = socket.set_recv_buffer_size(size);
    }
    if let Some(size) = options.send_buffer_size {
        let _ = socket.set_send_buffer_size(size);
    }
}

fn read_loop(
    mut stream: TcpStream,
    limiter: &RateLimiter,
    token: &TransportToken,
    shutdown: &AtomicBool,
    post: &impl Fn(SocketEventKind),
) {
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        limiter.wait(token, Direction::Inbound);
        let budget = limiter.available(token, Direction::Inbound);
        let want = if budget < 0 {
            READ_CHUNK
        } else if budget == 0 {
            continue;
        } else {
            READ_CHUNK.min(usize::try_from(budget).unwrap_or(READ_CHUNK))
        };

        match stream.read(&mut buffer[..want]) {
            Ok(0) => {
                post(SocketEventKind::Closed { error: None });
                return;
            }
            Ok(bytes_read) => {
                limiter.used(token, Direction::Inbound, bytes_read as u64);
                post(SocketEventKind::Data {
                    bytes: buffer[..bytes_read].to_vec(),
                });
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
            Err(error) => {
                if !shutdown.load(Ordering::SeqCst) {
                    post(SocketEventKind::Closed {
                        error: Some(error.kind()),
                    });
                }
                return;
            }
        }
    }
}
