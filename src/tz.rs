//! Time zone resolver: the only place civil time and absolute instants meet.
//!
//! All day-of-week and working-window math happens in the tenant's IANA
//! zone; "is this in the past" comparisons use absolute instants only.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike,
};
use chrono_tz::Tz;

use crate::engine::EngineError;
use crate::model::{CivilTime, Ms, Span};

/// Parse a strict `YYYY-MM-DD` calendar date.
///
/// Shape, month 1..=12 and day 1..=31 are pre-checked; anything subtler
/// (Feb 30, Apr 31) is rejected by date construction itself.
pub fn parse_civil_date(s: &str) -> Result<NaiveDate, EngineError> {
    let b = s.as_bytes();
    let well_formed = b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit());
    if !well_formed {
        return Err(EngineError::InvalidInput(format!(
            "invalid date {s:?}: expected YYYY-MM-DD"
        )));
    }
    let year: i32 = s[..4]
        .parse()
        .map_err(|_| EngineError::InvalidInput(format!("invalid year in {s:?}")))?;
    let month: u32 = s[5..7]
        .parse()
        .map_err(|_| EngineError::InvalidInput(format!("invalid month in {s:?}")))?;
    let day: u32 = s[8..10]
        .parse()
        .map_err(|_| EngineError::InvalidInput(format!("invalid day in {s:?}")))?;
    if !(1..=12).contains(&month) {
        return Err(EngineError::InvalidInput(format!(
            "month out of range in {s:?}"
        )));
    }
    if !(1..=31).contains(&day) {
        return Err(EngineError::InvalidInput(format!(
            "day out of range in {s:?}"
        )));
    }
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| EngineError::InvalidInput(format!("no such calendar day: {s}")))
}

/// Day-of-week of a civil date, 0=Sunday..6=Saturday.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Convert a civil date-time in `tz` to an absolute instant.
///
/// DST policy: ambiguous local times (fall-back) take the earliest
/// instant; nonexistent local times (spring-forward gap) shift forward
/// to the first instant that exists.
pub fn civil_to_ms(tz: Tz, naive: NaiveDateTime) -> Result<Ms, EngineError> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.timestamp_millis()),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.timestamp_millis()),
        LocalResult::None => {
            let mut probe = naive;
            // Gaps are at most a few hours; probe in 15-minute steps.
            for _ in 0..12 {
                probe += Duration::minutes(15);
                match tz.from_local_datetime(&probe) {
                    LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                        return Ok(dt.timestamp_millis());
                    }
                    LocalResult::None => {}
                }
            }
            Err(EngineError::InvalidInput(format!(
                "local time {naive} does not exist in zone {tz}"
            )))
        }
    }
}

/// Instant of `time` on `date` in `tz`.
pub fn civil_time_on_date(tz: Tz, date: NaiveDate, time: CivilTime) -> Result<Ms, EngineError> {
    let naive = date
        .and_hms_opt(time.hour as u32, time.minute as u32, 0)
        .ok_or_else(|| EngineError::InvalidInput(format!("invalid civil time {time}")))?;
    civil_to_ms(tz, naive)
}

/// Civil-day window `[00:00:00, 23:59:59]` of `date` in `tz`, as instants.
pub fn day_bounds(tz: Tz, date: NaiveDate) -> Result<Span, EngineError> {
    let start_naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| EngineError::InvalidInput(format!("invalid date {date}")))?;
    let end_naive = date
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| EngineError::InvalidInput(format!("invalid date {date}")))?;
    let start = civil_to_ms(tz, start_naive)?;
    let end = civil_to_ms(tz, end_naive)?;
    Ok(Span::new(start, end))
}

/// Wall-clock `HH:MM` of an instant in `tz`.
pub fn civil_hm(tz: Tz, at: Ms) -> CivilTime {
    let dt = DateTime::from_timestamp_millis(at)
        .unwrap_or_default()
        .with_timezone(&tz);
    CivilTime {
        hour: dt.hour() as u8,
        minute: dt.minute() as u8,
    }
}

/// Interpret a booking start time. An explicit UTC designator or offset
/// (RFC 3339) is an absolute instant; a bare `YYYY-MM-DDTHH:MM[:SS]` is
/// civil time in the tenant's zone.
pub fn parse_start_time(s: &str, tz: Tz) -> Result<Ms, EngineError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return civil_to_ms(tz, naive);
        }
    }
    Err(EngineError::InvalidInput(format!(
        "unrecognized start time {s:?}"
    )))
}
