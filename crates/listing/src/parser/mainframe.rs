//! IBM mainframe dialects: z/VM minidisks, MVS data sets, PDS members
//! and the generic `owner size date time name` shape used by some IBM
//! servers.

use super::date::{parse_short_date, parse_time};
use crate::entry::{EntryTime, ListingEntry, UnsureFlags};
use crate::token::{is_numeric, number, Line};

/// `owner size mm/dd/yy hh:mm:ss name`.
pub(crate) fn parse_ibm(line: &Line<'_>) -> Option<ListingEntry> {
    let owner = line.token(0)?;
    let size = number(line.token(1)?)?;
    let date = parse_short_date(line.token(2)?, false)?;
    let (time, has_seconds) = parse_time(line.token(3)?)?;

    let mut entry = ListingEntry::unknown_size();
    entry.size = size;
    entry.time = Some(EntryTime::from_date_time(date, time, has_seconds));

    let mut name = line.rest(5)?.to_owned();
    if name.is_empty() {
        return None;
    }
    if name.ends_with('/') {
        name.pop();
        entry.is_dir = true;
    }
    entry.name = name;
    entry.owner_group = owner.to_owned();
    Some(entry)
}

/// MVS data-set listing:
/// `VOLUME UNIT REFERRED EXT USED RECFM LRECL BLKSZ DSORG DSNAME`.
pub(crate) fn parse_mvs(line: &Line<'_>) -> Option<ListingEntry> {
    let mut index = 0;
    let _volume = line.token(index)?;
    index += 1;
    let _unit = line.token(index)?;
    index += 1;

    let referred = line.token(index)?;
    index += 1;
    let mut entry = ListingEntry::unknown_size();

    if referred != "**NONE**" {
        match parse_short_date(referred, false) {
            Some(date) => entry.time = Some(EntryTime::from_date(date)),
            None => {
                // `TSO004 3390 VSAM FOO.BAR`
                if referred != "VSAM" {
                    return None;
                }
                let name = line.token(index)?;
                if line.token(index + 1).is_some() {
                    return None;
                }
                entry.name = name.to_owned();
                entry.unsure |= UnsureFlags::SIZE | UnsureFlags::TIME;
                return Some(entry);
            }
        }
    }

    let ext = line.token(index)?;
    index += 1;
    if !is_numeric(ext) {
        return None;
    }

    let used = line.token(index)?;
    index += 1;
    if is_numeric(used) || used == "????" || used == "++++" {
        let recfm = line.token(index)?;
        index += 1;
        if is_numeric(recfm) {
            return None;
        }
    } else if ext.len() < 6 {
        return None;
    }

    if !is_numeric(line.token(index)?) {
        return None;
    }
    index += 1;
    if !is_numeric(line.token(index)?) {
        return None;
    }
    index += 1;

    let dsorg = line.token(index)?;
    index += 1;
    if dsorg == "PO" || dsorg == "PO-E" {
        entry.is_dir = true;
    } else {
        entry.size = 100;
    }

    let name = line.rest(index)?;
    if name.is_empty() || line.token(index + 1).is_some() {
        return None;
    }
    entry.name = name.to_owned();
    Some(entry)
}

/// PDS member listing:
/// `NAME VV.MM CREATED CHANGED TIME SIZE INIT MOD ID`.
pub(crate) fn parse_mvs_pds(line: &Line<'_>) -> Option<ListingEntry> {
    let name = line.token(0)?;
    let _vvmm = line.token(1)?;
    let _created = parse_short_date(line.token(2)?, false)?;
    let changed = parse_short_date(line.token(3)?, false)?;
    let (time, has_seconds) = parse_time(line.token(4)?)?;
    let size = number(line.token(5)?)?;
    let _init = number(line.token(6)?)?;
    let _modified = number(line.token(7)?)?;
    let _id = line.token(8)?;

    let mut entry = ListingEntry::unknown_size();
    entry.name = name.to_owned();
    entry.size = size;
    entry.time = Some(EntryTime::from_date_time(changed, time, has_seconds));
    Some(entry)
}

/// Plain member-name dump some PDS servers produce when stats are off.
pub(crate) fn parse_mvs_pds2(line: &Line<'_>) -> Option<ListingEntry> {
    let name = line.token(0)?;
    if line.token(1).is_some() || name.is_empty() {
        return None;
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '$' || c == '#' || c == '@')
    {
        return None;
    }
    let mut entry = ListingEntry::unknown_size();
    entry.name = name.to_owned();
    entry.unsure |= UnsureFlags::SIZE | UnsureFlags::TIME;
    Some(entry)
}

/// `MIGRATED DSNAME` markers for data sets on tape.
pub(crate) fn parse_mvs_migrated(line: &Line<'_>) -> Option<ListingEntry> {
    if line.token(0)? != "Migrated" && line.token(0)? != "MIGRATED" {
        return None;
    }
    let name = line.token(1)?;
    if line.token(2).is_some() {
        return None;
    }
    let mut entry = ListingEntry::unknown_size();
    entry.name = name.to_owned();
    entry.unsure |= UnsureFlags::SIZE | UnsureFlags::TIME;
    Some(entry)
}

/// z/VM: `NAME TYPE FORMAT LRECL RECORDS BLOCKS DATE TIME [owner]`.
pub(crate) fn parse_zvm(line: &Line<'_>) -> Option<ListingEntry> {
    let name = line.token(0)?;
    let extension = line.token(1)?;
    let format = line.token(2)?;
    if format != "V" && format != "F" {
        return None;
    }
    let lrecl = number(line.token(3)?)?;
    let records = number(line.token(4)?)?;
    let _blocks = number(line.token(5)?)?;
    let date = parse_short_date(line.token(6)?, true)?;
    let (time, has_seconds) = parse_time(line.token(7)?)?;

    let mut entry = ListingEntry::unknown_size();
    entry.name = format!("{name}.{extension}");
    entry.size = lrecl.checked_mul(records)?;
    entry.time = Some(EntryTime::from_date_time(date, time, has_seconds));
    if let Some(owner) = line.token(8) {
        entry.owner_group = owner.to_owned();
    }
    Some(entry)
}
