//! Timezone-free canonicalization of legacy date and time values.
//!
//! Legacy columns arrive either as typed MySQL temporals or as text. Calendar
//! components are always read straight from the source representation; no
//! value is ever routed through a zoned timestamp, so the process timezone
//! cannot move a date across midnight.

use crate::core::value::{ClockTime, Value};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

/// Years before this are treated as missing (zero dates, sentinels).
pub const MIN_YEAR: i32 = 1900;

/// Substitute for missing non-key dates.
pub fn fallback_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 11, 1).unwrap_or_default()
}

/// Substitute for missing non-key datetimes.
pub fn fallback_datetime() -> NaiveDateTime {
    fallback_date().and_time(NaiveTime::MIN)
}

/// Parses the leading `YYYY-MM-DD` of `raw`.
///
/// Anything after the date must start with a space or `T` (a time part);
/// offsets and zone suffixes in that tail are ignored.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let bytes = raw.as_bytes();
    if bytes.len() < 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    if let Some(&sep) = bytes.get(10) {
        if sep != b' ' && sep != b'T' {
            return None;
        }
    }

    let year: i32 = digits(&raw[0..4])?;
    let month: u32 = digits(&raw[5..7])?;
    let day: u32 = digits(&raw[8..10])?;
    if year < MIN_YEAR {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parses `YYYY-MM-DD[ HH:MM[:SS[.fff]]]`. A bare date means midnight.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    let date = parse_date(raw)?;
    let tail = raw.get(11..).unwrap_or("");
    if tail.is_empty() {
        return Some(date.and_time(NaiveTime::MIN));
    }
    let time = parse_clock_time(tail)?;
    if time.hours > 23 {
        return None;
    }
    let time = NaiveTime::from_hms_opt(time.hours, time.minutes.into(), time.seconds.into())?;
    Some(date.and_time(time))
}

/// Parses `H:MM`, `HH:MM:SS` or `HHH:MM:SS`, dropping fractional seconds and
/// any zone suffix.
pub fn parse_clock_time(raw: &str) -> Option<ClockTime> {
    let raw = raw.trim();
    let end = raw
        .find(|c: char| !(c.is_ascii_digit() || c == ':' || c == '.'))
        .unwrap_or(raw.len());
    let clock = raw[..end].split('.').next()?;

    let mut parts = clock.split(':');
    let hours: u32 = digits(parts.next()?)?;
    let minutes: u32 = digits(parts.next()?)?;
    let seconds: u32 = match parts.next() {
        Some(s) => digits(s)?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    ClockTime::new(hours, minutes, seconds)
}

/// Calendar date carried by a legacy value, if any.
pub fn date_of(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => (d.year() >= MIN_YEAR).then_some(*d),
        Value::DateTime(dt) => (dt.year() >= MIN_YEAR).then_some(dt.date()),
        Value::String(s) => parse_date(s),
        Value::Bytes(b) => std::str::from_utf8(b).ok().and_then(parse_date),
        _ => None,
    }
}

pub fn datetime_of(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Date(d) => (d.year() >= MIN_YEAR).then(|| d.and_time(NaiveTime::MIN)),
        Value::DateTime(dt) => (dt.year() >= MIN_YEAR).then_some(*dt),
        Value::String(s) => parse_datetime(s),
        Value::Bytes(b) => std::str::from_utf8(b).ok().and_then(parse_datetime),
        _ => None,
    }
}

pub fn time_of(value: &Value) -> Option<ClockTime> {
    match value {
        Value::Time(t) => Some(*t),
        Value::DateTime(dt) => {
            use chrono::Timelike;
            ClockTime::new(dt.hour(), dt.minute(), dt.second())
        }
        Value::String(s) => parse_clock_time(s),
        Value::Bytes(b) => std::str::from_utf8(b).ok().and_then(parse_clock_time),
        _ => None,
    }
}

fn digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
