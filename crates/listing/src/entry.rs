use bitflags::bitflags;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use protocol::ServerPath;

bitflags! {
    /// Fields a dialect could not determine with confidence. A listing
    /// carrying any unsure flag is never served from cache without a
    /// refresh.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct UnsureFlags: u8 {
        /// Size column was absent or ambiguous.
        const SIZE = 1 << 0;
        /// No usable timestamp.
        const TIME = 1 << 1;
        /// Permissions not present in this dialect.
        const PERMISSIONS = 1 << 2;
        /// Owner/group not present in this dialect.
        const OWNER_GROUP = 1 << 3;
    }
}

/// Granularity of a parsed timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimePrecision {
    /// Only the calendar day is known.
    Day,
    /// Hours and minutes are known.
    Minute,
    /// Full seconds.
    Second,
}

/// Modification time with its known precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryTime {
    date: NaiveDate,
    time: Option<NaiveTime>,
    precision: TimePrecision,
}

impl EntryTime {
    /// A date-only timestamp.
    #[must_use]
    pub const fn from_date(date: NaiveDate) -> Self {
        Self {
            date,
            time: None,
            precision: TimePrecision::Day,
        }
    }

    /// A full timestamp; precision depends on whether seconds were given.
    #[must_use]
    pub const fn from_date_time(date: NaiveDate, time: NaiveTime, has_seconds: bool) -> Self {
        Self {
            date,
            time: Some(time),
            precision: if has_seconds {
                TimePrecision::Second
            } else {
                TimePrecision::Minute
            },
        }
    }

    /// Adds a time-of-day to a date-only stamp.
    #[must_use]
    pub const fn with_time(self, time: NaiveTime, has_seconds: bool) -> Self {
        Self::from_date_time(self.date, time, has_seconds)
    }

    /// The timestamp as a naive UTC datetime, midnight for day precision.
    #[must_use]
    pub fn as_datetime(&self) -> NaiveDateTime {
        self.date
            .and_time(self.time.unwrap_or(NaiveTime::MIN))
    }

    /// Shifts by whole minutes; used for the per-server timezone offset.
    #[must_use]
    pub fn shifted_minutes(self, minutes: i64) -> Self {
        if minutes == 0 {
            return self;
        }
        let shifted = self.as_datetime() + chrono::Duration::minutes(minutes);
        Self {
            date: shifted.date(),
            time: self.time.map(|_| shifted.time()),
            precision: self.precision,
        }
    }

    /// Known precision of this stamp.
    #[must_use]
    pub const fn precision(&self) -> TimePrecision {
        self.precision
    }
}

/// One parsed line of a directory listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingEntry {
    /// File or directory name, already unescaped.
    pub name: String,
    /// Size in bytes, `-1` when unknown.
    pub size: i64,
    /// Entry is a directory (links count as directories until resolved).
    pub is_dir: bool,
    /// Entry is a symlink.
    pub is_link: bool,
    /// Link target when the listing carried one.
    pub target: Option<String>,
    /// Modification time, if any column parsed.
    pub time: Option<EntryTime>,
    /// Raw permission string of the dialect, possibly empty.
    pub permissions: String,
    /// Raw owner/group string of the dialect, possibly empty.
    pub owner_group: String,
    /// Parse-confidence flags.
    pub unsure: UnsureFlags,
}

impl ListingEntry {
    pub(crate) fn unknown_size() -> Self {
        Self {
            size: -1,
            ..Self::default()
        }
    }
}

/// A complete listing of one remote directory.
#[derive(Clone, Debug, Default)]
pub struct DirectoryListing {
    /// Directory the entries live in.
    pub path: ServerPath,
    /// Entries in server order.
    pub entries: Vec<ListingEntry>,
}

impl DirectoryListing {
    /// Looks an entry up by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ListingEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Returns `true` when any entry has unsure parse bits.
    #[must_use]
    pub fn has_unsure_entries(&self) -> bool {
        self.entries.iter().any(|e| !e.unsure.is_empty())
    }
}
