//! The operation abstraction: one entry on the control socket's stack,
//! implementing one wire exchange as a small state machine.

use crate::control_socket::{Connection, SessionState};
use crate::lock::LockReason;
use crate::notification::{AsyncReply, AsyncRequest, Notification};
use crate::services::Services;
use crate::sftp::SftpEvent;
use logging::MessageKind;
use protocol::{ReplyCode, ServerPath};
use std::any::Any;

/// What the driver feeds into the operation on top of the stack.
#[derive(Debug)]
pub(crate) enum WireEvent<'a> {
    /// The control TCP connection is established.
    Connected,
    /// The control connection closed.
    Closed {
        /// `None` on orderly EOF.
        error: Option<std::io::ErrorKind>,
    },
    /// The proxy tunnel on the control connection is established.
    ProxyHandshakeDone,
    /// The control-connection TLS handshake completed.
    TlsHandshakeDone,
    /// A complete FTP reply (all lines of a multiline reply).
    FtpReply(&'a crate::ftp::FtpReply),
    /// Decrypted bytes for byte-oriented protocols (HTTP).
    Bytes(&'a [u8]),
    /// The FTP data connection is established.
    DataConnected,
    /// Decrypted bytes from the FTP data connection.
    DataBytes(&'a [u8]),
    /// The FTP data connection closed.
    DataClosed {
        /// `None` on orderly EOF.
        error: Option<std::io::ErrorKind>,
    },
    /// One parsed line from the SFTP helper.
    Sftp(&'a SftpEvent),
    /// The SFTP helper went away.
    SftpClosed,
    /// A previously contended cache lock is now held.
    LockGranted,
    /// Self-scheduled continuation of an upload pump.
    UploadTick,
}

/// Context handed to every operation call. Pushing onto `pending_push`
/// schedules a sub-operation; the driver activates it after the current
/// call returns.
pub(crate) struct OpCtx<'a> {
    pub conn: &'a mut Connection,
    pub session: &'a mut SessionState,
    pub services: &'a Services,
    pub pending_push: Vec<Box<dyn Operation>>,
}

impl OpCtx<'_> {
    /// Schedules `op` as a sub-operation of the caller.
    pub fn push(&mut self, op: Box<dyn Operation>) {
        self.pending_push.push(op);
    }

    /// Queues a notification for the embedding application.
    pub fn notify(&self, notification: Notification) {
        self.services.notify(notification);
    }

    /// Writes a log line (file sink and notification queue).
    pub fn log(&self, kind: MessageKind, text: impl Into<String>) {
        self.services.log(kind, text.into());
    }

    /// Issues an async request and returns its correlation id. The
    /// operation must report itself as waiting until the reply arrives.
    pub fn request_async(&self, request: AsyncRequest) -> u64 {
        self.services.request_async(request)
    }
}

/// One stack entry. `send` advances the state machine by emitting wire
/// traffic; `on_event` consumes whatever arrived. Both return a
/// [`ReplyCode`]: `OK` pops with success, `WOULDBLOCK` parks,
/// `CONTINUE` asks the driver to call `send` again, anything with the
/// error bit unwinds.
pub(crate) trait Operation: Send {
    /// Name of the engine command this operation implements, for the
    /// terminal notification.
    fn command_name(&self) -> &'static str;

    /// Emits the next wire message(s) for the current sub-state.
    fn send(&mut self, cx: &mut OpCtx<'_>) -> ReplyCode;

    /// Consumes an event aimed at this operation.
    fn on_event(&mut self, cx: &mut OpCtx<'_>, event: WireEvent<'_>) -> ReplyCode;

    /// Invoked on the parent when a sub-operation completed; `child` is
    /// the popped operation for result extraction.
    fn subcommand_result(
        &mut self,
        _cx: &mut OpCtx<'_>,
        _code: ReplyCode,
        _child: Box<dyn Operation>,
    ) -> ReplyCode {
        ReplyCode::INTERNAL_ERROR
    }

    /// Delivers the answer to the async request this operation raised.
    fn on_async_reply(&mut self, _cx: &mut OpCtx<'_>, _reply: AsyncReply) -> ReplyCode {
        ReplyCode::INTERNAL_ERROR
    }

    /// The operation is suspended on an async request; the watchdog is
    /// paused while this holds.
    fn waiting_for_async(&self) -> bool {
        false
    }

    /// The operation is suspended waiting for a cache lock.
    fn waiting_for_lock(&self) -> bool {
        false
    }

    /// Lock held by this operation, released when it pops.
    fn held_lock(&self) -> Option<(LockReason, ServerPath)> {
        None
    }

    /// Releases owned resources (open files, data connections) during a
    /// forced teardown.
    fn release_resources(&mut self, _cx: &mut OpCtx<'_>) {}

    /// Downcast support so parents can take results out of popped
    /// children.
    fn as_any(&mut self) -> &mut dyn Any;
}
