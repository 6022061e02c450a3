//! `ls -l` style listings, including Netware split permissions and
//! servers that omit owner or group columns.

use super::date::parse_unix_date_time;
use crate::entry::{ListingEntry, UnsureFlags};
use crate::token::{complex_size, is_numeric, is_right_numeric, Line};
use chrono::NaiveDate;

pub(crate) fn parse(
    line: &Line<'_>,
    expect_date: bool,
    today: NaiveDate,
) -> Option<ListingEntry> {
    let first = line.token(0)?;
    let type_char = first.chars().next()?;
    if !matches!(type_char, 'b' | 'c' | 'd' | 'l' | 'p' | 's' | '-') {
        return None;
    }

    let mut entry = ListingEntry::unknown_size();
    let mut permissions = first.to_owned();
    entry.is_dir = matches!(type_char, 'd' | 'l');
    entry.is_link = type_char == 'l';

    let mut index = 0;

    // Netware splits the type flag and the permissions into two tokens.
    let netware = first.len() == 1;
    if netware {
        index += 1;
        permissions.push(' ');
        permissions.push_str(line.token(index)?);
    } else {
        // Skip the link count when present.
        index += 1;
        if !is_numeric(line.token(index)?) {
            index -= 1;
        }
    }

    // Not every server sends owner and group; retry with progressively
    // fewer columns until the size and date lines up.
    let start_index = index;
    for owner_group_tokens in (0..=3).rev() {
        index = start_index;
        let mut owner_group = String::new();
        let mut bad = false;
        for i in 0..owner_group_tokens {
            index += 1;
            match line.token(index) {
                Some(token) => {
                    if i > 0 {
                        owner_group.push(' ');
                    }
                    owner_group.push_str(token);
                }
                None => {
                    bad = true;
                    break;
                }
            }
        }
        if bad {
            continue;
        }

        index += 1;
        let size_token = line.token(index)?;
        match complex_size(size_token, None) {
            Some(size) => entry.size = size,
            None => {
                // A group name glued onto the size column.
                if !is_right_numeric(size_token) {
                    continue;
                }
                let split = size_token
                    .rfind(|c: char| !c.is_ascii_digit())
                    .map(|p| p + 1)?;
                entry.size = size_token[split..].parse().ok()?;
                if !owner_group.is_empty() {
                    owner_group.push(' ');
                }
                owner_group.push_str(&size_token[..split]);
            }
        }

        if expect_date {
            let Some((stamp, last)) = parse_unix_date_time(line, index + 1, today) else {
                continue;
            };
            entry.time = Some(stamp);
            index = last;
        }

        let Some(name) = line.rest(index + 1) else {
            continue;
        };
        let mut name = name.to_owned();
        // `ls -F` decorations.
        if name.ends_with(['/', '|', '*']) {
            name.pop();
        }
        if entry.is_link {
            if let Some(pos) = name.find(" -> ") {
                entry.target = Some(name[pos + 4..].to_owned());
                name.truncate(pos);
            }
        }
        entry.name = name;
        entry.permissions = permissions;
        entry.owner_group = owner_group;
        if !expect_date {
            entry.unsure |= UnsureFlags::TIME;
        }
        return Some(entry);
    }

    None
}
