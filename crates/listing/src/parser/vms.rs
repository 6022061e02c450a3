//! OpenVMS listings: `NAME.TYPE;ver size date time [owner] (prot)`,
//! frequently wrapped over two lines.

use super::date::{parse_short_date, parse_time};
use crate::entry::{EntryTime, ListingEntry};
use crate::token::{complex_size, is_left_numeric, is_numeric, Line};

const VMS_BLOCK: i64 = 512;

pub(crate) fn parse(line: &Line<'_>) -> Option<ListingEntry> {
    let first = line.token(0)?;
    let pos = first.find(';')?;

    let mut entry = ListingEntry::unknown_size();

    if pos > 4 && first[..pos].ends_with(".DIR") {
        entry.is_dir = true;
        let stem = &first[..pos - 4];
        if &first[pos..] == ";1" {
            entry.name = stem.to_owned();
        } else {
            entry.name = format!("{stem}{}", &first[pos..]);
        }
    } else {
        entry.name = first.to_owned();
    }
    // Some servers escape extra dots with ^.
    entry.name = entry.name.replace('^', "");

    let mut index = 1;
    let mut token = line.token(index)?;
    let mut owner_group = String::new();
    let mut permissions = String::new();

    // This column is the size, a bracketed owner, or already the date.
    if !is_numeric(token) && !is_left_numeric(token) {
        if token.len() < 3 || !token.starts_with('[') || !token.ends_with(']') {
            return None;
        }
        owner_group = token[1..token.len() - 1].to_owned();
        index += 1;
        token = line.token(index)?;
        if !is_numeric(token) && !is_left_numeric(token) {
            return None;
        }
    }

    // Size in 512-byte blocks, possibly as used/allocated.
    let mut got_size = false;
    let size_part = token.split('/').next()?;
    if !size_part.is_empty() {
        if let Some(size) = complex_size(size_part, Some(VMS_BLOCK)) {
            // A date like 8-APR-1999 also starts with a digit; only treat
            // the token as a size when it cannot be a date.
            if parse_short_date(token, false).is_none() {
                entry.size = size;
                got_size = true;
                index += 1;
                token = line.token(index)?;
            }
        }
    }

    let date = parse_short_date(token, false)?;
    let mut stamp = EntryTime::from_date(date);

    if let Some(token) = line.token(index + 1) {
        if let Some((time, has_seconds)) = parse_time(token) {
            stamp = stamp.with_time(time, has_seconds);
            index += 1;
        } else {
            // Validate bracket shape so garbage does not slip through.
            let balanced = (token.starts_with('[') && token.ends_with(']'))
                || (token.starts_with('(') && token.ends_with(')'))
                || (!token.starts_with(['[', '(']) && !token.ends_with([']', ')']));
            if !balanced {
                return None;
            }
        }
    }
    entry.time = Some(stamp);

    if !got_size {
        index += 1;
        let token = line.token(index)?;
        if !is_numeric(token) && !is_left_numeric(token) {
            return None;
        }
        let size_part = token.split('/').next()?;
        entry.size = complex_size(size_part, Some(VMS_BLOCK))?;
    }

    // Remaining columns: [owner,group] and (protection) in either order.
    while let Some(token) = {
        index += 1;
        line.token(index)
    } {
        if token.len() > 2 && token.starts_with('(') && token.ends_with(')') {
            if !permissions.is_empty() {
                permissions.push(' ');
            }
            permissions.push_str(&token[1..token.len() - 1]);
        } else if token.len() > 2 && token.starts_with('[') && token.ends_with(']') {
            if !owner_group.is_empty() {
                owner_group.push(' ');
            }
            owner_group.push_str(&token[1..token.len() - 1]);
        } else {
            if !owner_group.is_empty() {
                owner_group.push(' ');
            }
            owner_group.push_str(token);
        }
    }

    entry.permissions = permissions;
    entry.owner_group = owner_group;
    Some(entry)
}
