#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `listing` turns the raw text a server produces for `LIST`, `MLSD` or
//! their equivalents into typed [`ListingEntry`] values. Servers disagree
//! wildly about what a listing looks like, so the parser tries a fixed
//! sequence of dialect recognisers per line until one fully accepts it:
//! MLSD facts, EPLF, Unix `ls -l` (with and without the date columns),
//! DOS, VMS (with multi-line reassembly), IBM (z/VM-style), WFTP, MVS
//! data sets and PDS members, OS/9, and a bare-filename fallback.
//!
//! # Design
//!
//! - Each dialect is a pure function `&Line -> Option<ListingEntry>`;
//!   dialects must decide quickly and reject loudly so the next one gets
//!   its chance.
//! - A line that no dialect accepts is held back and retried concatenated
//!   with its successor, which reassembles the VMS habit of wrapping long
//!   entries over several lines.
//! - EBCDIC listings are detected from a byte histogram before any line
//!   splitting and remapped through a fixed table.
//!
//! The month-name table covers every language observed in the wild plus
//! the "name+number" hybrids some servers emit.

mod ebcdic;
mod entry;
mod months;
mod parser;
mod token;

pub use entry::{DirectoryListing, EntryTime, ListingEntry, TimePrecision, UnsureFlags};
pub use parser::{ListingParser, ParserOptions};
