//! IIS / DOS `dir` style listings: date, time, `<DIR>` or size, name.

use super::date::{parse_short_date, parse_time};
use crate::entry::{EntryTime, ListingEntry};
use crate::token::Line;

pub(crate) fn parse(line: &Line<'_>) -> Option<ListingEntry> {
    let date = parse_short_date(line.token(0)?, false)?;
    let (time, has_seconds) = parse_time(line.token(1)?)?;

    let mut entry = ListingEntry::unknown_size();
    entry.time = Some(EntryTime::from_date_time(date, time, has_seconds));

    let size_token = line.token(2)?;
    if size_token == "<DIR>" {
        entry.is_dir = true;
    } else {
        // Sizes may carry grouping separators.
        let mut size: i64 = 0;
        for c in size_token.chars() {
            match c {
                ',' | '.' => {}
                _ => {
                    let digit = c.to_digit(10)?;
                    size = size.checked_mul(10)?.checked_add(i64::from(digit))?;
                }
            }
        }
        entry.size = size;
    }

    entry.name = line.rest(3)?.to_owned();
    if entry.name.is_empty() {
        return None;
    }
    Some(entry)
}
