//! The long tail: WFTP, OS/9, HP NonStop and the bare-name fallback.

use super::date::{parse_short_date, parse_time};
use crate::entry::{EntryTime, ListingEntry, UnsureFlags};
use crate::token::{is_numeric, number, Line};

/// WFTP: `name size dd.mm.yy unused. hh:mm`.
pub(crate) fn parse_wfftp(line: &Line<'_>) -> Option<ListingEntry> {
    let name = line.token(0)?;
    let size = number(line.token(1)?)?;
    let date = parse_short_date(line.token(2)?, false)?;
    let marker = line.token(3)?;
    if !marker.ends_with('.') {
        return None;
    }
    let (time, has_seconds) = parse_time(line.token(4)?)?;
    if line.token(5).is_some() {
        return None;
    }

    let mut entry = ListingEntry::unknown_size();
    entry.name = name.to_owned();
    entry.size = size;
    entry.time = Some(EntryTime::from_date_time(date, time, has_seconds));
    Some(entry)
}

/// OS/9: `owner.group yy/mm/dd hhmm perms sector size name`.
pub(crate) fn parse_os9(line: &Line<'_>) -> Option<ListingEntry> {
    let owner = line.token(0)?;
    let dot = owner.find('.')?;
    if dot == 0 || dot == owner.len() - 1 {
        return None;
    }
    if !is_numeric(&owner[..dot]) || !is_numeric(&owner[dot + 1..]) {
        return None;
    }

    let date = parse_short_date(line.token(1)?, true)?;
    let _raw_time = line.token(2)?;
    let perms = line.token(3)?;
    let _sector = line.token(4)?;
    let size = number(line.token(5)?)?;
    let name = line.rest(6)?;
    if name.is_empty() {
        return None;
    }

    let mut entry = ListingEntry::unknown_size();
    entry.name = name.to_owned();
    entry.size = size;
    entry.is_dir = perms.starts_with('d');
    entry.time = Some(EntryTime::from_date(date));
    entry.permissions = perms.to_owned();
    entry.owner_group = owner.to_owned();
    Some(entry)
}

/// HP NonStop: `name code size date time owner perms`.
pub(crate) fn parse_nonstop(line: &Line<'_>) -> Option<ListingEntry> {
    let name = line.token(0)?;
    if !is_numeric(line.token(1)?) {
        return None;
    }
    let size = number(line.token(2)?)?;
    let date = parse_short_date(line.token(3)?, false)?;
    let (time, has_seconds) = parse_time(line.token(4)?)?;

    let mut index = 5;
    let mut owner = line.token(index)?.to_owned();
    if owner.ends_with(',') {
        index += 1;
        owner.push(' ');
        owner.push_str(line.token(index)?);
    }
    index += 1;
    let perms = line.token(index)?;
    if line.token(index + 1).is_some() {
        return None;
    }

    let mut entry = ListingEntry::unknown_size();
    entry.name = name.to_owned();
    entry.size = size;
    entry.time = Some(EntryTime::from_date_time(date, time, has_seconds));
    entry.owner_group = owner;
    entry.permissions = perms.to_owned();
    Some(entry)
}

/// Last resort: a line that is nothing but a file name. Only accepted
/// for single-token lines so prose and summary lines stay out.
pub(crate) fn parse_raw_name(line: &Line<'_>) -> Option<ListingEntry> {
    if line.token_count() != 1 {
        return None;
    }
    let name = line.token(0)?;
    if name == "total" {
        return None;
    }
    let mut entry = ListingEntry::unknown_size();
    entry.name = name.to_owned();
    entry.unsure = UnsureFlags::SIZE | UnsureFlags::TIME | UnsureFlags::PERMISSIONS | UnsureFlags::OWNER_GROUP;
    Some(entry)
}
