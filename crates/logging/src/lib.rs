#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! The user-facing engine log.
//!
//! Every notification-worthy message an engine produces is tagged with a
//! [`MessageKind`] and routed through a [`LogSink`]. The file sink
//! writes the canonical line format
//!
//! ```text
//! YYYY-MM-DD HH:MM:SS <pid> <engine-id> <prefix> <utf8-text>
//! ```
//!
//! with platform line endings, renaming the file to `<file>.1` once it
//! exceeds the configured cap. Internal diagnostics additionally mirror
//! into `tracing` so `RUST_LOG`-style filtering works during
//! development.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Category of a log line; decides the prefix and filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Progress and state changes.
    Status,
    /// Failures shown to the user.
    Error,
    /// A line sent to the server (passwords already masked).
    Command,
    /// A line received from the server.
    Response,
    /// Internal tracing, shown at debug level 1 and above.
    Trace,
    /// Raw directory-listing lines, opt-in.
    Listing,
}

impl MessageKind {
    /// The line prefix, colon included.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Status => "Status:",
            Self::Error => "Error:",
            Self::Command => "Command:",
            Self::Response => "Response:",
            Self::Trace => "Trace:",
            Self::Listing => "Listing:",
        }
    }

    /// Whether a message of this kind passes the configured debug level
    /// and raw-listing switch.
    #[must_use]
    pub const fn passes(self, debug_level: u8, raw_listing: bool) -> bool {
        match self {
            Self::Status | Self::Error | Self::Command | Self::Response => true,
            Self::Trace => debug_level >= 1,
            Self::Listing => raw_listing,
        }
    }
}

/// Failures opening or rotating the log file.
#[derive(Debug, Error)]
pub enum LogError {
    /// Filesystem failure.
    #[error("log file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Receiver of formatted engine log lines.
pub trait LogSink: Send + Sync {
    /// Consumes one message from engine `engine_id`.
    fn log(&self, engine_id: u64, kind: MessageKind, text: &str);
}

/// Discards everything.
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _engine_id: u64, _kind: MessageKind, _text: &str) {}
}

/// Collects lines in memory; for tests and the CLI.
#[derive(Default)]
pub struct CaptureSink {
    lines: Mutex<Vec<(u64, MessageKind, String)>>,
}

impl CaptureSink {
    /// An empty capture sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    #[must_use]
    pub fn lines(&self) -> Vec<(u64, MessageKind, String)> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for CaptureSink {
    fn log(&self, engine_id: u64, kind: MessageKind, text: &str) {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((engine_id, kind, text.to_owned()));
    }
}

#[cfg(windows)]
const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
const LINE_ENDING: &str = "\n";

struct LogFileInner {
    file: Option<File>,
    written: u64,
}

/// Size-capped log file with `<file>.1` rotation.
pub struct LogFile {
    path: PathBuf,
    max_size: u64,
    inner: Mutex<LogFileInner>,
}

impl LogFile {
    /// Opens (appending) or creates the log file. A `max_size` of zero
    /// disables rotation.
    pub fn open(path: PathBuf, max_size: u64) -> Result<Self, LogError> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            max_size,
            inner: Mutex::new(LogFileInner {
                file: Some(file),
                written,
            }),
        })
    }

    fn rotate(&self, inner: &mut LogFileInner) -> Result<(), LogError> {
        inner.file = None;
        let mut rotated = self.path.clone().into_os_string();
        rotated.push(".1");
        // Replaces any previous .1; rotation depth is fixed at one.
        let _ = std::fs::remove_file(&rotated);
        std::fs::rename(&self.path, &rotated)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        inner.file = Some(file);
        inner.written = 0;
        Ok(())
    }
}

impl LogSink for LogFile {
    fn log(&self, engine_id: u64, kind: MessageKind, text: &str) {
        let line = format!(
            "{} {} {} {} {}{}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            std::process::id(),
            engine_id,
            kind.prefix(),
            text,
            LINE_ENDING,
        );
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if self.max_size > 0 && inner.written + line.len() as u64 > self.max_size {
            if let Err(error) = self.rotate(&mut inner) {
                tracing::warn!(%error, "log rotation failed");
            }
        }
        if let Some(file) = inner.file.as_mut() {
            if file.write_all(line.as_bytes()).is_ok() {
                inner.written += line.len() as u64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_match_the_documented_format() {
        assert_eq!(MessageKind::Status.prefix(), "Status:");
        assert_eq!(MessageKind::Listing.prefix(), "Listing:");
    }

    #[test]
    fn filtering_honours_debug_level_and_listing_switch() {
        assert!(MessageKind::Error.passes(0, false));
        assert!(!MessageKind::Trace.passes(0, false));
        assert!(MessageKind::Trace.passes(1, false));
        assert!(!MessageKind::Listing.passes(4, false));
        assert!(MessageKind::Listing.passes(0, true));
    }

    #[test]
    fn lines_carry_pid_engine_id_and_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.log");
        let log = LogFile::open(path.clone(), 0).expect("opens");
        log.log(7, MessageKind::Command, "USER anonymous");

        let contents = std::fs::read_to_string(&path).expect("readable");
        let line = contents.lines().next().expect("one line");
        let pid = std::process::id().to_string();
        assert!(line.contains(&pid));
        assert!(line.contains(" 7 Command: USER anonymous"));
    }

    #[test]
    fn oversized_log_rotates_to_dot_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.log");
        let log = LogFile::open(path.clone(), 120).expect("opens");

        for _ in 0..8 {
            log.log(1, MessageKind::Status, "a fairly long status message");
        }
        let rotated = dir.path().join("engine.log.1");
        assert!(rotated.exists(), "rotation must produce <file>.1");
        let current = std::fs::metadata(&path).expect("current file").len();
        assert!(current <= 120);
    }

    #[test]
    fn capture_sink_preserves_order() {
        let sink = CaptureSink::new();
        sink.log(1, MessageKind::Status, "first");
        sink.log(1, MessageKind::Response, "second");
        let lines = sink.lines();
        assert_eq!(lines[0].2, "first");
        assert_eq!(lines[1].2, "second");
    }
}
