//! Easily Parsed List Format: `+facts\tname`.

use crate::entry::{EntryTime, ListingEntry};
use crate::token::Line;
use chrono::DateTime;

pub(crate) fn parse(line: &Line<'_>) -> Option<ListingEntry> {
    let raw = line.raw().trim_end();
    let rest = raw.strip_prefix('+')?;
    let (facts, name) = rest.split_once('\t')?;
    if name.is_empty() {
        return None;
    }

    let mut entry = ListingEntry::unknown_size();
    entry.name = name.to_owned();

    for fact in facts.split(',') {
        let mut chars = fact.chars();
        match chars.next() {
            Some('/') => entry.is_dir = true,
            Some('s') => entry.size = fact[1..].parse().ok()?,
            Some('m') => {
                let seconds: i64 = fact[1..].parse().ok()?;
                if seconds < 0 {
                    return None;
                }
                let stamp = DateTime::from_timestamp(seconds, 0)?.naive_utc();
                entry.time = Some(EntryTime::from_date_time(
                    stamp.date(),
                    stamp.time(),
                    true,
                ));
            }
            Some('u') => {
                if let Some(permissions) = fact.strip_prefix("up") {
                    entry.permissions = permissions.to_owned();
                }
            }
            _ => {}
        }
    }

    Some(entry)
}
