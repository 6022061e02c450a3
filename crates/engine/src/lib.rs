#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `engine` is the protocol-agnostic transfer engine: one [`Engine`]
//! per session, driving FTP(S), SFTP (through a helper child process)
//! and HTTP(S) through per-protocol operation state machines, and
//! streaming notifications back to the embedding application.
//!
//! # Design
//!
//! - The facade ([`Engine`]) never blocks on protocol work: commands
//!   are validated, handed to the worker thread, and answered later
//!   through the notification queue.
//! - Each command runs as a stack of operations on the control socket;
//!   operations push sub-operations (change-directory, data transfer,
//!   internal connect) and receive wire events from the generic driver.
//! - Cross-session state — the directory cache, the `(server, path,
//!   reason)` lock table, the failed-login list and the rate limiter —
//!   lives in the shared [`EngineContext`].
//!
//! # Invariants
//!
//! - At most one command is in flight per engine.
//! - The operation stack is non-empty iff a command is in flight.
//! - Every accepted command produces exactly one
//!   [`Notification::OperationFinished`].
//! - Notifications are delivered in creation order; the wakeup callback
//!   fires once per idle-to-non-empty transition of the queue.

mod cache;
mod context;
mod control_socket;
mod engine;
mod event;
mod failed_login;
mod ftp;
mod http;
mod local_file;
mod lock;
mod notification;
mod operation;
mod options;
mod services;
mod sftp;
mod transfer_status;

pub use cache::{CacheHit, DirectoryCache, ServerKey};
pub use context::{CertTrust, EngineContext};
pub use engine::{Engine, EngineShared, WakeupFn};
pub use failed_login::FailedLoginList;
pub use lock::{LockReason, LockTable};
pub use notification::{
    AsyncReply, AsyncRequest, AsyncRequestNotification, FileExistsAction, FileExistsPrompt,
    Notification,
};
pub use options::{EngineOptions, FtpProxySettings, FtpProxyType};
pub use transfer_status::{TransferStatus, TransferStatusCell};

pub use protocol::{
    CharsetEncoding, Command, ListFlags, LogonType, PathSyntax, Protocol, ReplyCode, Server,
    ServerPath, ServerType, TransferDirection, TransferSettings, Uri,
};
