//! HTTP(S) protocol driver: lazy internal connect, the request/response
//! state machine, and the download operation built on top of it.

mod connect;
mod filetransfer;
mod request;

pub(crate) use connect::InternalConnectOp;
pub(crate) use filetransfer::HttpFileTransferOp;

use crate::operation::Operation;
use protocol::{Command, TransferDirection, Uri};

/// Session state of an HTTP control socket.
pub(crate) struct HttpState {
    /// Identity of the current connection, for reuse across requests
    /// and redirects: `(host, port, tls)`.
    pub connected_to: Option<(String, u16, bool)>,
}

impl HttpState {
    pub fn new() -> Self {
        Self { connected_to: None }
    }
}

/// Maps an engine command onto an HTTP operation; everything except
/// downloads is unsupported on this protocol.
pub(crate) fn make_operation(command: &Command) -> Option<Box<dyn Operation>> {
    match command {
        Command::Transfer {
            local,
            remote_path,
            remote_file,
            direction: TransferDirection::Download,
            settings,
        } => Some(Box::new(HttpFileTransferOp::new(
            local.clone(),
            remote_path.format_filename(remote_file),
            *settings,
        ))),
        _ => None,
    }
}

/// Builds the request URI for a server-relative path.
pub(crate) fn uri_for(server: &protocol::Server, path: &str) -> Uri {
    Uri {
        scheme: server.protocol.prefix().to_owned(),
        host: server.host.clone(),
        port: if server.port == server.protocol.default_port() {
            0
        } else {
            server.port
        },
        path: path.to_owned(),
        ..Uri::default()
    }
}
