//! RFC 3659 machine-readable listings. Parsing is strict: any malformed
//! fact rejects the whole line.

use crate::entry::{EntryTime, ListingEntry};
use crate::token::Line;
use chrono::{NaiveDate, NaiveTime};

pub(crate) enum MlsdOutcome {
    /// Not an MLSD line at all.
    No,
    /// A parsed entry.
    Entry(ListingEntry),
    /// Valid MLSD, but `cdir`/`pdir` which listings do not include.
    Skip,
}

pub(crate) fn parse(line: &Line<'_>) -> MlsdOutcome {
    let Some(facts) = line.token(0) else {
        return MlsdOutcome::No;
    };
    if facts.is_empty() || !facts.contains('=') {
        return MlsdOutcome::No;
    }

    let mut entry = ListingEntry::unknown_size();
    let mut perm = String::new();
    let mut unix_mode = String::new();
    let mut owner = String::new();
    let mut owner_name = String::new();
    let mut group = String::new();
    let mut group_name = String::new();
    let mut uid = String::new();
    let mut gid = String::new();
    let mut user = String::new();
    let mut has_modify = false;

    for fact in facts.split(';') {
        if fact.is_empty() {
            continue;
        }
        let Some((name, value)) = fact.split_once('=') else {
            return MlsdOutcome::No;
        };
        if name.is_empty() {
            return MlsdOutcome::No;
        }
        match name.to_ascii_lowercase().as_str() {
            "type" => {
                let lower = value.to_ascii_lowercase();
                if lower == "dir" {
                    entry.is_dir = true;
                } else if lower == "cdir" || lower == "pdir" {
                    return MlsdOutcome::Skip;
                } else if let Some(target) = lower
                    .strip_prefix("os.unix=slink")
                    .or_else(|| lower.strip_prefix("os.unix=symlink"))
                {
                    entry.is_dir = true;
                    entry.is_link = true;
                    if let Some(target) = target.strip_prefix(':') {
                        // Keep the original casing of the target.
                        let offset = value.len() - target.len();
                        entry.target = Some(value[offset..].to_owned());
                    }
                }
            }
            "size" => {
                if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                    return MlsdOutcome::No;
                }
                let Ok(size) = value.parse() else {
                    return MlsdOutcome::No;
                };
                entry.size = size;
            }
            "modify" => match parse_mlst_timeval(value) {
                Some(stamp) => {
                    entry.time = Some(stamp);
                    has_modify = true;
                }
                None => return MlsdOutcome::No,
            },
            "create" => {
                if !has_modify {
                    match parse_mlst_timeval(value) {
                        Some(stamp) => entry.time = Some(stamp),
                        None => return MlsdOutcome::No,
                    }
                }
            }
            "perm" => perm = value.to_owned(),
            "unix.mode" => unix_mode = value.to_owned(),
            "unix.owner" => owner = value.to_owned(),
            "unix.ownername" => owner_name = value.to_owned(),
            "unix.group" => group = value.to_owned(),
            "unix.groupname" => group_name = value.to_owned(),
            "unix.uid" => uid = value.to_owned(),
            "unix.gid" => gid = value.to_owned(),
            "unix.user" => user = value.to_owned(),
            _ => {}
        }
    }

    entry.permissions = match (perm.is_empty(), unix_mode.is_empty()) {
        (false, false) => format!("{perm} ({unix_mode})"),
        (false, true) => perm,
        (true, false) => unix_mode,
        (true, true) => String::new(),
    };

    let owner_part = [owner_name, owner, user, uid]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or_default();
    let group_part = [group_name, group, gid]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or_default();
    entry.owner_group = match (owner_part.is_empty(), group_part.is_empty()) {
        (false, false) => format!("{owner_part} {group_part}"),
        (false, true) => owner_part,
        (true, false) => group_part,
        (true, true) => String::new(),
    };

    let Some(name) = line.raw().split_once(' ').map(|(_, rest)| rest.trim_end()) else {
        return MlsdOutcome::No;
    };
    if name.is_empty() {
        return MlsdOutcome::No;
    }
    entry.name = name.to_owned();
    MlsdOutcome::Entry(entry)
}

/// `YYYYMMDDHHMMSS[.sss]`, always UTC.
fn parse_mlst_timeval(value: &str) -> Option<EntryTime> {
    let digits = value.split('.').next()?;
    if digits.len() != 14 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(
        digits[..4].parse().ok()?,
        digits[4..6].parse().ok()?,
        digits[6..8].parse().ok()?,
    )?;
    let time = NaiveTime::from_hms_opt(
        digits[8..10].parse().ok()?,
        digits[10..12].parse().ok()?,
        digits[12..14].parse().ok()?,
    )?;
    Some(EntryTime::from_date_time(date, time, true))
}
