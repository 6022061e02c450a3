//! Date and time column parsing shared by the dialects.

use crate::entry::EntryTime;
use crate::months::month_from_name;
use crate::token::{is_numeric, is_right_numeric, number, Line};
use chrono::{Datelike, NaiveDate, NaiveTime};

/// Parses `monthname-dd-yy`, `yyyy-mm-dd`, `dd.mm.yyyy`, `mm/dd/yy` and
/// friends. With `sane_field_order` the first small number is a two-digit
/// year (OS/9, z/VM). Two-digit years below 50 are 2000s, the rest 1900s.
pub(crate) fn parse_short_date(token: &str, sane_field_order: bool) -> Option<NaiveDate> {
    let pos = token.find(['-', '.', '/'])?;
    if pos == 0 {
        return None;
    }
    let first = &token[..pos];
    let rest = &token[pos + 1..];

    let mut year: Option<i32> = None;
    let mut month: Option<u32> = None;
    let mut day: Option<u32> = None;
    let mut month_was_name = false;

    if !is_numeric(first) {
        month = Some(month_from_name(first)?);
        month_was_name = true;
    } else if pos == 4 {
        let value: i32 = first.parse().ok()?;
        if !(1900..=3000).contains(&value) {
            return None;
        }
        year = Some(value);
    } else if pos <= 2 {
        let value: i64 = first.parse().ok()?;
        if token.as_bytes()[pos] == b'.' {
            // dd.mm.yyyy
            if !(1..=31).contains(&value) {
                return None;
            }
            day = Some(value as u32);
        } else if sane_field_order {
            year = Some(two_digit_year(value as i32));
        } else if value > 12 {
            if value > 31 {
                return None;
            }
            day = Some(value as u32);
        } else if value < 1 {
            return None;
        } else {
            month = Some(value as u32);
        }
    } else {
        return None;
    }

    let pos2 = rest.find(['-', '.', '/'])?;
    if pos2 == 0 || pos2 == rest.len() - 1 {
        return None;
    }
    let second = &rest[..pos2];
    let third = &rest[pos2 + 1..];

    // A non-numeric second field after a numeric "month" means the fields
    // were day-month order all along.
    if !is_numeric(second) && month.is_some() {
        if month_was_name || day.is_some() {
            return None;
        }
        day = month.take();
    }

    if year.is_some() || day.is_some() {
        month = Some(month_from_name(second)?);
    } else {
        let value: i64 = second.parse().ok()?;
        if !(1..=31).contains(&value) {
            return None;
        }
        day = Some(value as u32);
    }

    let value: i64 = third.parse().ok()?;
    if year.is_some() {
        if !(1..=31).contains(&value) {
            return None;
        }
        day = Some(value as u32);
    } else {
        if !(0..=9999).contains(&value) {
            return None;
        }
        let value = value as i32;
        year = Some(if value < 50 {
            value + 2000
        } else if value < 1000 {
            value + 1900
        } else {
            value
        });
    }

    NaiveDate::from_ymd_opt(year?, month?, day?)
}

/// Parses `HH:MM`, `HH:MM:SS`, optionally with an `AM`/`PM` tail glued
/// on (`12:09PM`). Returns the time and whether seconds were present.
pub(crate) fn parse_time(token: &str) -> Option<(NaiveTime, bool)> {
    let pos = token.find(':')?;
    if pos < 1 || pos >= token.len() - 1 {
        return None;
    }
    let mut hour: u32 = token[..pos].parse().ok()?;
    if hour > 24 {
        return None;
    }
    let rest = &token[pos + 1..];
    let (minute_str, second_str) = match rest.find(':') {
        Some(p) => (&rest[..p], Some(&rest[p + 1..])),
        None => (rest, None),
    };

    let (minute_str, mut meridiem) = split_meridiem(minute_str);
    let minute: u32 = minute_str.parse().ok()?;
    if minute > 59 {
        return None;
    }

    let mut seconds = None;
    if let Some(second_str) = second_str {
        let (second_str, m) = split_meridiem(second_str);
        if meridiem.is_none() {
            meridiem = m;
        }
        let value: u32 = second_str.parse().ok()?;
        if value > 60 {
            return None;
        }
        seconds = Some(value.min(59));
    }

    match meridiem {
        Some('p') => {
            if hour < 12 {
                hour += 12;
            }
        }
        Some(_) => {
            if hour == 12 {
                hour = 0;
            }
        }
        None => {}
    }

    let time = NaiveTime::from_hms_opt(hour % 24, minute, seconds.unwrap_or(0))?;
    Some((time, seconds.is_some()))
}

fn split_meridiem(field: &str) -> (&str, Option<char>) {
    if is_right_numeric(field) {
        (field, None)
    } else {
        let trimmed = field.trim_end_matches(|c: char| !c.is_ascii_digit());
        let marker = field[trimmed.len()..]
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase());
        (trimmed, marker)
    }
}

/// Parses the Unix long-listing date block starting at token `index`:
/// `Month day (year | HH:MM)`, in either month-day or day-month order.
/// Returns the time and the index of the last consumed token. A missing
/// year is the most recent one that keeps the date within about a year
/// of `today`.
pub(crate) fn parse_unix_date_time(
    line: &Line<'_>,
    index: usize,
    today: NaiveDate,
) -> Option<(EntryTime, usize)> {
    let first = line.token(index)?;
    let second = line.token(index + 1)?;

    let (month, day_token) = if let Some(month) = month_from_name(first) {
        (month, second)
    } else if let Some(month) = month_from_name(second) {
        // European `ls`: day before month.
        (month, first)
    } else {
        // Some servers put the whole date in one column.
        let date = parse_short_date(first, false)?;
        let stamp = match line.token(index + 1).and_then(parse_time) {
            Some((time, has_seconds)) => {
                return Some((
                    EntryTime::from_date_time(date, time, has_seconds),
                    index + 1,
                ));
            }
            None => EntryTime::from_date(date),
        };
        return Some((stamp, index));
    };

    let day_digits = day_token.trim_end_matches([',', '.']);
    let day: u32 = number(day_digits)?.try_into().ok()?;
    if !(1..=31).contains(&day) {
        return None;
    }

    let third = line.token(index + 2)?;
    if let Some((time, has_seconds)) = parse_time(third) {
        // No year column: pick this year, backing off one when the
        // resulting date would land in the future.
        let mut year = today.year();
        let mut date = NaiveDate::from_ymd_opt(year, month, day)?;
        if date > today + chrono::Duration::days(1) {
            year -= 1;
            date = NaiveDate::from_ymd_opt(year, month, day)?;
        }
        Some((EntryTime::from_date_time(date, time, has_seconds), index + 2))
    } else {
        let year: i32 = third.parse().ok()?;
        if !(1000..=9999).contains(&year) {
            return None;
        }
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some((EntryTime::from_date(date), index + 2))
    }
}

pub(crate) const fn two_digit_year(value: i32) -> i32 {
    if value < 50 {
        value + 2000
    } else if value < 1000 {
        value + 1900
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_date_variants() {
        assert_eq!(
            parse_short_date("2024-01-15", false),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(
            parse_short_date("04-27-00", false),
            NaiveDate::from_ymd_opt(2000, 4, 27)
        );
        assert_eq!(
            parse_short_date("27.4.1999", false),
            NaiveDate::from_ymd_opt(1999, 4, 27)
        );
        assert_eq!(
            parse_short_date("8-APR-1999", false),
            NaiveDate::from_ymd_opt(1999, 4, 8)
        );
        assert_eq!(
            parse_short_date("99/12/31", true),
            NaiveDate::from_ymd_opt(1999, 12, 31)
        );
        assert_eq!(parse_short_date("31-31-31", false), None);
        assert_eq!(parse_short_date("nodate", false), None);
    }

    #[test]
    fn time_variants() {
        assert_eq!(
            parse_time("12:09"),
            NaiveTime::from_hms_opt(12, 9, 0).map(|t| (t, false))
        );
        assert_eq!(
            parse_time("12:09PM"),
            NaiveTime::from_hms_opt(12, 9, 0).map(|t| (t, false))
        );
        assert_eq!(
            parse_time("12:09AM"),
            NaiveTime::from_hms_opt(0, 9, 0).map(|t| (t, false))
        );
        assert_eq!(
            parse_time("01:02:03"),
            NaiveTime::from_hms_opt(1, 2, 3).map(|t| (t, true))
        );
        assert_eq!(parse_time("25:00"), None);
        assert_eq!(parse_time("noon"), None);
    }

    #[test]
    fn yearless_dates_stay_in_the_past() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date");
        let line = Line::new("Jun 15 10:00");
        let (stamp, last) = parse_unix_date_time(&line, 0, today).expect("parses");
        assert_eq!(last, 2);
        assert_eq!(stamp.as_datetime().date().year(), 2023);

        let line = Line::new("Feb 15 10:00");
        let (stamp, _) = parse_unix_date_time(&line, 0, today).expect("parses");
        assert_eq!(stamp.as_datetime().date().year(), 2024);
    }

    #[test]
    fn day_month_order_is_accepted() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date");
        let line = Line::new("15 Jan 2020");
        let (stamp, _) = parse_unix_date_time(&line, 0, today).expect("parses");
        assert_eq!(
            stamp.as_datetime().date(),
            NaiveDate::from_ymd_opt(2020, 1, 15).expect("valid date")
        );
    }
}
