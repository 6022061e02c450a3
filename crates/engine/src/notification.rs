//! Notifications streamed to the embedding application and the async
//! requests that suspend an operation until the user answers.

use chrono::NaiveDateTime;
use logging::MessageKind;
use protocol::{ReplyCode, ServerPath, TransferDirection};
use std::path::PathBuf;

/// The user's answer to a file-exists conflict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileExistsAction {
    /// Replace the target unconditionally.
    Overwrite,
    /// Replace only when the source is newer.
    OverwriteNewer,
    /// Replace only when the sizes differ.
    OverwriteSize,
    /// Replace when the source is newer or the sizes differ.
    OverwriteSizeOrNewer,
    /// Append to the partial target.
    Resume,
    /// Transfer under a different target name.
    Rename(String),
    /// Leave the target untouched; the transfer reports `OK`.
    Skip,
}

/// Details shown in the file-exists prompt.
#[derive(Clone, Debug)]
pub struct FileExistsPrompt {
    /// Transfer direction.
    pub download: bool,
    /// Local file path.
    pub local_path: PathBuf,
    /// Remote path and name.
    pub remote_path: ServerPath,
    /// Remote file name.
    pub remote_file: String,
    /// Local size, `-1` unknown.
    pub local_size: i64,
    /// Remote size, `-1` unknown.
    pub remote_size: i64,
    /// Local mtime when known.
    pub local_time: Option<NaiveDateTime>,
    /// Remote mtime when known.
    pub remote_time: Option<NaiveDateTime>,
    /// Whether resume is possible for this pair.
    pub resume_possible: bool,
    /// ASCII-mode transfer (resume unsafe).
    pub ascii: bool,
}

/// A decision point that suspends the operation until
/// `Engine::set_async_request_reply` delivers the answer.
#[derive(Clone, Debug)]
pub enum AsyncRequest {
    /// Target exists; how should the transfer proceed?
    FileExists(FileExistsPrompt),
    /// The server asked for a password or a keyboard-interactive
    /// response.
    InteractiveLogin {
        /// Challenge text from the server.
        challenge: String,
    },
    /// SFTP host key verification (trust on first use).
    HostKey {
        /// Host and port the key belongs to.
        host: String,
        /// Port.
        port: u16,
        /// Fingerprint as reported by the helper.
        fingerprint: String,
        /// The stored key differs from the presented one.
        changed: bool,
    },
    /// TLS certificate verification (trust on first use).
    Certificate {
        /// DER chain, leaf first.
        chain: Vec<Vec<u8>>,
        /// Negotiated protocol and cipher for display.
        session_info: String,
        /// Deprecated-algorithm warning bits.
        warnings: u8,
    },
    /// SFTP negotiated-algorithm details, informational.
    SftpEncryption {
        /// Key/value pairs as reported by the helper.
        details: Vec<(String, String)>,
    },
}

/// Answer to an [`AsyncRequest`].
#[derive(Clone, Debug)]
pub enum AsyncReply {
    /// Answer to [`AsyncRequest::FileExists`].
    FileExists(FileExistsAction),
    /// Password for [`AsyncRequest::InteractiveLogin`].
    InteractiveLogin {
        /// The password or challenge response.
        password: String,
    },
    /// Trust decision for a host key.
    HostKey {
        /// Proceed with the connection.
        trust: bool,
    },
    /// Trust decision for a certificate chain.
    Certificate {
        /// Proceed with the connection.
        trust: bool,
    },
    /// Acknowledges an informational request.
    Dismissed,
}

/// An async request paired with its correlation number.
#[derive(Clone, Debug)]
pub struct AsyncRequestNotification {
    /// Must be echoed in the reply.
    pub request_id: u64,
    /// What is being asked.
    pub request: AsyncRequest,
}

/// One entry of the engine's notification queue.
#[derive(Clone, Debug)]
pub enum Notification {
    /// A log line.
    Log {
        /// Severity / channel.
        kind: MessageKind,
        /// Message text.
        text: String,
    },
    /// A command reached its terminal state.
    OperationFinished {
        /// Accumulated reply code.
        code: ReplyCode,
        /// `Command::name()` of the finished command.
        command: &'static str,
    },
    /// A directory listing changed (or failed to be obtained).
    ListingUpdated {
        /// Directory the notification is about.
        path: ServerPath,
        /// The list operation failed.
        failed: bool,
        /// Content actually changed (peers should refresh views).
        modified: bool,
    },
    /// Edge-triggered activity tick for the traffic indicators.
    ActiveTransfer {
        /// Direction of the activity.
        direction: TransferDirection,
    },
    /// The transfer status snapshot changed.
    TransferStatusChanged,
    /// A user decision is needed.
    AsyncRequest(AsyncRequestNotification),
    /// In-memory HTTP body chunk.
    DataChunk(
        /// The received bytes.
        Vec<u8>,
    ),
    /// A local directory was created while preparing a download target.
    LocalDirCreated(
        /// The created directory.
        PathBuf,
    ),
}
