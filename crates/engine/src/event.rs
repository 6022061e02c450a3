//! Events processed by an engine's worker loop. Everything that can
//! happen to an engine arrives here: commands from the facade, socket
//! chunks from the reader threads, SFTP helper lines, lock grants and
//! peer notifications.

use crate::cache::ServerKey;
use crate::lock::LockReason;
use crate::notification::AsyncReply;
use protocol::{Command, ServerPath};
use transport::SocketEvent;

/// One unit of work for the engine loop.
#[derive(Debug)]
pub enum EngineEvent {
    /// A validated command from `Engine::execute`.
    Execute(Command),
    /// The user cancelled.
    Cancel,
    /// Answer to an outstanding async request.
    AsyncReply {
        /// Correlation number issued with the request.
        request_id: u64,
        /// The answer.
        reply: AsyncReply,
    },
    /// Control- or data-socket activity. The generation stamps which
    /// connection attempt the socket belongs to, so events from a torn
    /// down connection cannot leak into its successor.
    Socket {
        /// Connection-attempt generation at socket creation.
        generation: u64,
        /// The socket event.
        event: SocketEvent,
    },
    /// One line from the SFTP helper's stdout.
    SftpLine(String),
    /// The SFTP helper exited or its pipe broke.
    SftpClosed,
    /// A cache lock this engine was waiting on is now held.
    LockGranted {
        /// Lock reason.
        reason: LockReason,
        /// Locked directory.
        path: ServerPath,
    },
    /// A peer engine changed a directory both engines look at.
    PeerListingChanged {
        /// Server identity.
        server: ServerKey,
        /// Changed directory.
        path: ServerPath,
    },
    /// A peer removed or renamed a directory below our working
    /// directory.
    PeerInvalidatePath {
        /// Server identity.
        server: ServerKey,
        /// Removed subtree root.
        path: ServerPath,
    },
    /// Self-posted by an upload pump so the loop stays responsive
    /// between chunks.
    UploadTick,
    /// Engine is being dropped; exit the loop.
    Shutdown,
}
