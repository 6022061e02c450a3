#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `protocol` holds the protocol-neutral data model shared by every other
//! crate in the workspace: the composable [`ReplyCode`] bitfield that every
//! operation resolves to, the structural [`Server`] identity, typed
//! [`ServerPath`]s in each server dialect, the validated [`Command`] set
//! accepted by the engine facade, and the [`Uri`] parser used for HTTP
//! targets and command-line input.
//!
//! # Design
//!
//! - Reply codes are flags, not an enum: an operation's outcome is the OR of
//!   everything the operation stack accumulated, and modifiers such as
//!   [`ReplyCode::CANCELED`] stay sticky across unwinding.
//! - Two [`Server`]s compare equal iff all identifying fields match; the
//!   display name is deliberately excluded so renaming a bookmark does not
//!   sever cache or failed-login association.
//! - [`ServerPath`] is syntax-aware. Path manipulation never round-trips
//!   through strings of an assumed dialect; callers pick the dialect once,
//!   when the server type becomes known.
//!
//! # Invariants
//!
//! - A default-constructed [`ReplyCode`] is `OK`.
//! - An empty [`ServerPath`] has no segments and formats to an empty string.
//! - `Uri::to_string` round-trips through `Uri::parse` for any URI without a
//!   scheme-default port, modulo percent-encoding normalisation.

mod command;
mod path;
mod reply;
mod server;
mod uri;

pub use command::{Command, CommandError, ListFlags, TransferDirection, TransferSettings};
pub use path::{PathSyntax, ServerPath};
pub use reply::ReplyCode;
pub use server::{CharsetEncoding, LogonType, Protocol, Server, ServerType};
pub use uri::{Uri, percent_decode, percent_encode};
