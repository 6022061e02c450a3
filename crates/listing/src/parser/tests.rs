use super::*;
use crate::entry::TimePrecision;
use chrono::{Datelike, NaiveDate, Timelike};
use protocol::{PathSyntax, ServerPath, ServerType};

fn options() -> ParserOptions {
    ParserOptions {
        today: NaiveDate::from_ymd_opt(2024, 6, 1),
        ..ParserOptions::default()
    }
}

fn parse_with(options: ParserOptions, data: &str) -> DirectoryListing {
    let mut parser = ListingParser::new(options);
    parser.add_data(data.as_bytes());
    parser.finish(ServerPath::parse(PathSyntax::Unix, "/").expect("root parses"))
}

fn parse(data: &str) -> DirectoryListing {
    parse_with(options(), data)
}

#[test]
fn unix_long_listing() {
    let listing = parse(concat!(
        "total 112\r\n",
        "drwxr-xr-x   2 root  wheel   512 Jan 15  2020 pub\r\n",
        "-rw-r--r--   1 ftp   ftp   54321 Mar 10 08:30 README.txt\r\n",
        "lrwxrwxrwx   1 ftp   ftp      11 Mar 10 08:30 current -> release/1.0\r\n",
    ));
    assert_eq!(listing.entries.len(), 3);

    let dir = &listing.entries[0];
    assert!(dir.is_dir && !dir.is_link);
    assert_eq!(dir.name, "pub");
    assert_eq!(dir.size, 512);
    assert_eq!(
        dir.time.expect("has date").as_datetime().date(),
        NaiveDate::from_ymd_opt(2020, 1, 15).expect("valid date")
    );

    let file = &listing.entries[1];
    assert_eq!(file.size, 54321);
    assert_eq!(file.owner_group, "ftp ftp");
    assert_eq!(file.permissions, "-rw-r--r--");
    let stamp = file.time.expect("has time");
    assert_eq!(stamp.precision(), TimePrecision::Minute);
    assert_eq!(stamp.as_datetime().year(), 2024);

    let link = &listing.entries[2];
    assert!(link.is_link && link.is_dir);
    assert_eq!(link.name, "current");
    assert_eq!(link.target.as_deref(), Some("release/1.0"));
}

#[test]
fn unix_names_with_spaces_survive() {
    let listing = parse("-rw-r--r-- 1 u g 10 Jan 15 2020 name with  spaces\r\n");
    assert_eq!(listing.entries[0].name, "name with  spaces");
}

#[test]
fn dos_listing() {
    let listing = parse(concat!(
        "04-27-00  12:09PM       <DIR>          licensed\r\n",
        "04-14-00  03:47PM                  589 readme.htm\r\n",
    ));
    assert_eq!(listing.entries.len(), 2);
    assert!(listing.entries[0].is_dir);
    assert_eq!(listing.entries[0].size, -1);
    assert_eq!(listing.entries[1].size, 589);
    let stamp = listing.entries[1].time.expect("has time").as_datetime();
    assert_eq!(stamp.hour(), 15);
    assert_eq!(stamp.date(), NaiveDate::from_ymd_opt(2000, 4, 14).expect("valid date"));
}

#[test]
fn mlsd_listing_with_facts() {
    let listing = parse(concat!(
        "type=cdir;modify=20240101120000; /pub\r\n",
        "type=dir;modify=20240102030405;unix.mode=0755; sub\r\n",
        "type=file;size=1024;modify=20240102030405;unix.ownername=root;unix.groupname=wheel; data.bin\r\n",
        "type=OS.unix=slink:/target;size=4; link\r\n",
    ));
    assert_eq!(listing.entries.len(), 3);

    let dir = &listing.entries[0];
    assert!(dir.is_dir);
    assert_eq!(dir.name, "sub");
    assert_eq!(dir.permissions, "0755");

    let file = &listing.entries[1];
    assert_eq!(file.size, 1024);
    assert_eq!(file.owner_group, "root wheel");
    let stamp = file.time.expect("has time");
    assert_eq!(stamp.precision(), TimePrecision::Second);
    assert_eq!(stamp.as_datetime().second(), 5);

    let link = &listing.entries[2];
    assert!(link.is_link);
    assert_eq!(link.target.as_deref(), Some("/target"));
}

#[test]
fn mlsd_timestamps_ignore_timezone_offset() {
    let mut opts = options();
    opts.timezone_offset_minutes = 120;
    let listing = parse_with(
        opts,
        "type=file;size=1;modify=20240102030405; a\r\n-rw-r--r-- 1 u g 5 Jan 15 2020 b\r\n",
    );
    let mlsd = listing.entries[0].time.expect("has time").as_datetime();
    assert_eq!(mlsd.hour(), 3);
    let unix = listing.entries[1].time.expect("has time").as_datetime();
    // The Unix entry shifts by the configured offset, the MLSD one not.
    assert_eq!(unix.hour(), 2);
}

#[test]
fn eplf_listing() {
    let listing = parse(concat!(
        "+i8388621.48594,m825718503,r,s280,up644\tdjb.html\r\n",
        "+i8388625.48598,m824255907,/,\t514\r\n",
    ));
    assert_eq!(listing.entries.len(), 2);
    assert_eq!(listing.entries[0].name, "djb.html");
    assert_eq!(listing.entries[0].size, 280);
    assert_eq!(listing.entries[0].permissions, "644");
    assert!(listing.entries[1].is_dir);
    assert_eq!(listing.entries[1].name, "514");
}

#[test]
fn vms_listing_with_wrapped_line() {
    let mut opts = options();
    opts.server_type = ServerType::Vms;
    let mut parser = ListingParser::new(opts);
    parser.add_data(
        concat!(
            "Directory SYS$DISK:[PUB]\r\n",
            "\r\n",
            "README.TXT;4        5  8-APR-1999 11:55:37  [GROUP,OWNER]  (RWED,RWED,RE,)\r\n",
            "AVERYLONGFILENAME.TXT;1\r\n",
            "                    6  9-APR-1999 11:55:37  [GROUP,OWNER]  (RWED,RWED,RE,)\r\n",
            "MYDIR.DIR;1         1 10-APR-1999 11:55:37  [GROUP,OWNER]  (RWED,RWED,RE,)\r\n",
        )
        .as_bytes(),
    );
    let listing =
        parser.finish(ServerPath::parse(PathSyntax::Vms, "SYS$DISK:[PUB]").expect("parses"));

    assert_eq!(listing.entries.len(), 3);
    assert_eq!(listing.entries[0].name, "README.TXT;4");
    assert_eq!(listing.entries[0].size, 5 * 512);
    assert_eq!(listing.entries[0].owner_group, "GROUP,OWNER");
    assert_eq!(listing.entries[0].permissions, "RWED,RWED,RE,");

    // The wrapped entry was reassembled from two physical lines.
    assert_eq!(listing.entries[1].name, "AVERYLONGFILENAME.TXT;1");
    assert_eq!(listing.entries[1].size, 6 * 512);

    let dir = &listing.entries[2];
    assert!(dir.is_dir);
    assert_eq!(dir.name, "MYDIR");
}

#[test]
fn vms_versions_are_stripped_on_request() {
    let mut opts = options();
    opts.server_type = ServerType::Vms;
    opts.strip_vms_versions = true;
    let mut parser = ListingParser::new(opts);
    parser.add_data(
        "README.TXT;4        5  8-APR-1999 11:55:37  [GROUP,OWNER]  (RWED,RWED,RE,)\r\n"
            .as_bytes(),
    );
    let listing =
        parser.finish(ServerPath::parse(PathSyntax::Vms, "SYS$DISK:[PUB]").expect("parses"));
    assert_eq!(listing.entries[0].name, "README.TXT");
}

#[test]
fn zvm_listing_under_hint() {
    let mut opts = options();
    opts.server_type = ServerType::Zvm;
    let listing = parse_with(
        opts,
        "PROFILE  EXEC     V       80       50        1 2020-04-27 12:09:00 USR1\r\n",
    );
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.entries[0].name, "PROFILE.EXEC");
    assert_eq!(listing.entries[0].size, 80 * 50);
    assert_eq!(listing.entries[0].owner_group, "USR1");
}

#[test]
fn mvs_dataset_listing() {
    let mut opts = options();
    opts.server_type = ServerType::Mvs;
    let listing = parse_with(
        opts,
        concat!(
            "VOL001 3390   2024/01/15  1   45  FB     128  6144  PO  PROCLIB\r\n",
            "VOL002 3390   2024/01/16  1   45  FB     128  6144  PS  DATASET\r\n",
            "Migrated                                                SOME.DATASET\r\n",
        ),
    );
    assert_eq!(listing.entries.len(), 3);
    assert!(listing.entries[0].is_dir);
    assert_eq!(listing.entries[0].name, "PROCLIB");
    assert!(!listing.entries[1].is_dir);
    assert_eq!(listing.entries[2].name, "SOME.DATASET");
    assert!(!listing.entries[2].unsure.is_empty());
}

#[test]
fn raw_single_token_fallback_is_marked_unsure() {
    let listing = parse("strange_name_only\r\n");
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.entries[0].name, "strange_name_only");
    assert!(listing.has_unsure_entries());
}

#[test]
fn timezone_offset_shifts_unix_times() {
    let mut opts = options();
    opts.timezone_offset_minutes = -60;
    let listing = parse_with(opts, "-rw-r--r-- 1 u g 5 Mar 10 08:30 f\r\n");
    let stamp = listing.entries[0].time.expect("has time").as_datetime();
    assert_eq!(stamp.hour(), 7);
    assert_eq!(stamp.minute(), 30);
}

#[test]
fn total_line_is_not_an_entry() {
    let listing = parse("total 48\r\n-rw-r--r-- 1 u g 5 Mar 10 08:30 f\r\n");
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.entries[0].name, "f");
}
