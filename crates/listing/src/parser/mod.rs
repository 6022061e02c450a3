//! Dialect dispatch and the streaming assembly of listing lines.

mod date;
mod dos;
mod eplf;
mod mainframe;
mod mlsd;
mod other;
mod unix;
mod vms;

#[cfg(test)]
mod tests;

use crate::ebcdic;
use crate::entry::{DirectoryListing, ListingEntry};
use crate::token::Line;
use chrono::{NaiveDate, Utc};
use mlsd::MlsdOutcome;
use protocol::{PathSyntax, ServerPath, ServerType};

/// Static configuration of one parse run.
#[derive(Clone, Debug)]
pub struct ParserOptions {
    /// Server-type hint steering dialect preference.
    pub server_type: ServerType,
    /// Minutes to add to parsed timestamps (server clock compensation).
    /// Never applied to MLSD or EPLF, which are UTC by definition.
    pub timezone_offset_minutes: i32,
    /// Remove `;N` version suffixes from VMS file names.
    pub strip_vms_versions: bool,
    /// Reference date for year-less listings; `None` means the current
    /// date. Tests pin this for determinism.
    pub today: Option<NaiveDate>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            server_type: ServerType::Default,
            timezone_offset_minutes: 0,
            strip_vms_versions: false,
            today: None,
        }
    }
}

/// Accumulates raw listing bytes and produces a [`DirectoryListing`].
pub struct ListingParser {
    options: ParserOptions,
    data: Vec<u8>,
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum Dialect {
    Zvm,
    NonStop,
    Mlsd,
    Unix,
    Dos,
    Eplf,
    Vms,
    Ibm,
    Wfftp,
    Mvs,
    MvsPds,
    Os9,
    MvsMigrated,
    MvsPds2,
    UnixNoDate,
}

enum ParsedLine {
    Entry(ListingEntry),
    Skip,
    Rejected,
}

impl ListingParser {
    /// Creates a parser for one listing transfer.
    #[must_use]
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            data: Vec::new(),
        }
    }

    /// Appends raw bytes as they arrive from the data connection.
    pub fn add_data(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    /// Consumes the accumulated bytes and parses them into a listing for
    /// `path`.
    #[must_use]
    pub fn finish(mut self, path: ServerPath) -> DirectoryListing {
        if ebcdic::looks_like_ebcdic(&self.data) {
            ebcdic::remap(&mut self.data);
        }
        let text = decode_text(&self.data);

        let today = self
            .options
            .today
            .unwrap_or_else(|| Utc::now().date_naive());

        let mut entries = Vec::new();
        let mut held_back: Option<String> = None;
        for raw_line in text.split(['\r', '\n']) {
            let raw_line = raw_line.trim_end();
            if raw_line.trim().is_empty() {
                continue;
            }
            match self.parse_line(raw_line, today) {
                ParsedLine::Entry(entry) => {
                    flush_held_back(held_back.take(), &mut entries);
                    entries.push(entry);
                }
                ParsedLine::Skip => flush_held_back(held_back.take(), &mut entries),
                ParsedLine::Rejected => {
                    // Retry wrapped lines joined with their predecessor.
                    if let Some(prev) = held_back.take() {
                        let joined = format!("{prev} {raw_line}");
                        match self.parse_line(&joined, today) {
                            ParsedLine::Entry(entry) => {
                                entries.push(entry);
                                continue;
                            }
                            ParsedLine::Skip => continue,
                            ParsedLine::Rejected => {
                                flush_held_back(Some(prev), &mut entries);
                            }
                        }
                    }
                    held_back = Some(raw_line.to_owned());
                }
            }
        }
        flush_held_back(held_back.take(), &mut entries);

        if self.options.strip_vms_versions && path.syntax() == PathSyntax::Vms {
            for entry in &mut entries {
                strip_vms_version(&mut entry.name);
            }
        }

        DirectoryListing { path, entries }
    }

    fn parse_line(&self, raw: &str, today: NaiveDate) -> ParsedLine {
        let line = Line::new(raw);
        if line.token_count() == 0 {
            return ParsedLine::Skip;
        }

        match self.dispatch(&line, today) {
            DialectOutcome::Entry(dialect, mut entry) => {
                if entry.name == "." || entry.name == ".." {
                    return ParsedLine::Skip;
                }
                let utc_dialect = matches!(dialect, Dialect::Mlsd | Dialect::Eplf);
                if !utc_dialect && self.options.timezone_offset_minutes != 0 {
                    entry.time = entry.time.map(|t| {
                        t.shifted_minutes(i64::from(self.options.timezone_offset_minutes))
                    });
                }
                ParsedLine::Entry(entry)
            }
            DialectOutcome::Skip => ParsedLine::Skip,
            DialectOutcome::No => ParsedLine::Rejected,
        }
    }

    /// Tries the dialects in fixed order; the first full parse wins.
    fn dispatch(&self, line: &Line<'_>, today: NaiveDate) -> DialectOutcome {
        let server_type = self.options.server_type;

        if server_type == ServerType::Zvm {
            if let Some(entry) = mainframe::parse_zvm(line) {
                return DialectOutcome::Entry(Dialect::Zvm, entry);
            }
        }
        if server_type == ServerType::HpNonStop {
            if let Some(entry) = other::parse_nonstop(line) {
                return DialectOutcome::Entry(Dialect::NonStop, entry);
            }
        }
        match mlsd::parse(line) {
            MlsdOutcome::Entry(entry) => return DialectOutcome::Entry(Dialect::Mlsd, entry),
            MlsdOutcome::Skip => return DialectOutcome::Skip,
            MlsdOutcome::No => {}
        }
        if let Some(entry) = unix::parse(line, true, today) {
            return DialectOutcome::Entry(Dialect::Unix, entry);
        }
        if let Some(entry) = dos::parse(line) {
            return DialectOutcome::Entry(Dialect::Dos, entry);
        }
        if let Some(entry) = eplf::parse(line) {
            return DialectOutcome::Entry(Dialect::Eplf, entry);
        }
        if let Some(entry) = vms::parse(line) {
            return DialectOutcome::Entry(Dialect::Vms, entry);
        }
        if let Some(entry) = mainframe::parse_ibm(line) {
            return DialectOutcome::Entry(Dialect::Ibm, entry);
        }
        if let Some(entry) = other::parse_wfftp(line) {
            return DialectOutcome::Entry(Dialect::Wfftp, entry);
        }
        if let Some(entry) = mainframe::parse_mvs(line) {
            return DialectOutcome::Entry(Dialect::Mvs, entry);
        }
        if let Some(entry) = mainframe::parse_mvs_pds(line) {
            return DialectOutcome::Entry(Dialect::MvsPds, entry);
        }
        if let Some(entry) = other::parse_os9(line) {
            return DialectOutcome::Entry(Dialect::Os9, entry);
        }
        if server_type == ServerType::Mvs {
            if let Some(entry) = mainframe::parse_mvs_migrated(line) {
                return DialectOutcome::Entry(Dialect::MvsMigrated, entry);
            }
            if let Some(entry) = mainframe::parse_mvs_pds2(line) {
                return DialectOutcome::Entry(Dialect::MvsPds2, entry);
            }
        }
        if let Some(entry) = unix::parse(line, false, today) {
            return DialectOutcome::Entry(Dialect::UnixNoDate, entry);
        }
        DialectOutcome::No
    }
}

/// A line nothing could parse, alone or concatenated, still names a file
/// when it is a single bare token.
fn flush_held_back(held_back: Option<String>, entries: &mut Vec<ListingEntry>) {
    if let Some(line) = held_back {
        if let Some(entry) = other::parse_raw_name(&Line::new(&line)) {
            entries.push(entry);
        }
    }
}

enum DialectOutcome {
    Entry(Dialect, ListingEntry),
    Skip,
    No,
}

fn strip_vms_version(name: &mut String) {
    if let Some(pos) = name.rfind(';') {
        if pos + 1 < name.len() && name[pos + 1..].bytes().all(|b| b.is_ascii_digit()) {
            name.truncate(pos);
        }
    }
}

/// UTF-8 when valid, Latin-1 otherwise; listings never carry a BOM.
fn decode_text(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.to_owned(),
        Err(_) => data.iter().map(|&b| char::from(b)).collect(),
    }
}
