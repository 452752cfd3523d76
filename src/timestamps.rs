//! Terminal timestamp parsing.
//!
//! Both terminals publish local Hamburg wall-clock times as
//! `DD.MM.YYYY HH:MM`. The datastore and the watch state use ISO 8601
//! with an explicit offset.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::{Europe::Berlin, Tz};
use tracing::warn;

const SECONDS_PER_DAY: i64 = 86_400;

/// Formats tried in order for terminal timestamps
const TERMINAL_DATETIME_FORMATS: &[&str] = &["%d.%m.%Y %H:%M", "%d.%m.%Y %H:%M:%S"];
const TERMINAL_DATE_FORMAT: &str = "%d.%m.%Y";
const NAIVE_ISO_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse a terminal timestamp into Berlin time.
///
/// Date-only values are placed at midnight. Falls back to ISO 8601 so
/// already-converted values pass through. Blank input is `None`; other
/// unparseable input is `None` with a warning.
pub fn parse_terminal_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for format in TERMINAL_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return localize(naive);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, TERMINAL_DATE_FORMAT) {
        return localize(date.and_hms_opt(0, 0, 0)?);
    }
    if let Some(parsed) = parse_iso(value) {
        return Some(parsed);
    }

    warn!("Could not parse terminal datetime: {:?}", value);
    None
}

/// Parse ISO 8601. A value without offset is taken as Berlin local time.
pub fn parse_iso(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed);
    }
    NAIVE_ISO_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .and_then(localize)
}

/// Render as RFC 3339 with second precision.
pub fn to_iso(value: &DateTime<FixedOffset>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Render a stored UTC instant the way ETAs cross the store boundary.
pub fn utc_to_iso(value: &DateTime<Utc>) -> String {
    to_iso(&value.with_timezone(&Berlin).fixed_offset())
}

/// Whole days between two ISO timestamps, floored.
///
/// 0 when either side is missing or unparseable.
pub fn delay_days(old: Option<&str>, new: Option<&str>) -> i64 {
    let (Some(old), Some(new)) = (old.and_then(parse_iso), new.and_then(parse_iso)) else {
        return 0;
    };
    (new - old).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// `DD.MM.YYYY HH:MM` in Berlin time for notification texts.
pub fn format_berlin(iso: Option<&str>) -> String {
    match iso {
        None => "Unbekannt".to_string(),
        Some(raw) if raw.trim().is_empty() => "Unbekannt".to_string(),
        Some(raw) => match parse_iso(raw) {
            Some(parsed) => parsed.with_timezone(&Berlin).format("%d.%m.%Y %H:%M").to_string(),
            None => raw.to_string(),
        },
    }
}

/// Attach the Berlin offset. Times skipped by the DST switch have no
/// local representation and yield `None`.
fn localize(naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    let local: DateTime<Tz> = Berlin.from_local_datetime(&naive).earliest()?;
    Some(local.fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_terminal_format_in_winter() {
        let parsed = parse_terminal_datetime("13.02.2026 05:30").unwrap();
        assert_eq!(to_iso(&parsed), "2026-02-13T05:30:00+01:00");
    }

    #[test]
    fn parses_terminal_format_in_summer() {
        let parsed = parse_terminal_datetime("01.07.2026 12:00:30").unwrap();
        assert_eq!(to_iso(&parsed), "2026-07-01T12:00:30+02:00");
    }

    #[test]
    fn date_only_is_midnight() {
        let parsed = parse_terminal_datetime("13.02.2026").unwrap();
        assert_eq!(to_iso(&parsed), "2026-02-13T00:00:00+01:00");
    }

    #[test]
    fn falls_back_to_iso() {
        let parsed = parse_terminal_datetime("2026-02-13T05:30:00+01:00").unwrap();
        assert_eq!(to_iso(&parsed), "2026-02-13T05:30:00+01:00");
    }

    #[test]
    fn blank_and_garbage_are_none() {
        assert!(parse_terminal_datetime("").is_none());
        assert!(parse_terminal_datetime("   ").is_none());
        assert!(parse_terminal_datetime("morgen früh").is_none());
    }

    #[test]
    fn utc_instants_render_in_berlin() {
        let utc = Utc.with_ymd_and_hms(2026, 2, 13, 4, 30, 0).unwrap();
        assert_eq!(utc_to_iso(&utc), "2026-02-13T05:30:00+01:00");
    }

    #[test]
    fn delay_in_days() {
        assert_eq!(
            delay_days(Some("2026-02-10T00:00:00+01:00"), Some("2026-02-13T00:00:00+01:00")),
            3
        );
        assert_eq!(
            delay_days(Some("2026-02-13T00:00:00+01:00"), Some("2026-02-10T00:00:00+01:00")),
            -3
        );
    }

    #[test]
    fn partial_days_are_floored() {
        // 12 hours earlier is day -1, 30 hours later is day 1
        assert_eq!(
            delay_days(Some("2026-02-10T12:00:00+01:00"), Some("2026-02-10T00:00:00+01:00")),
            -1
        );
        assert_eq!(
            delay_days(Some("2026-02-10T00:00:00+01:00"), Some("2026-02-11T06:00:00+01:00")),
            1
        );
    }

    #[test]
    fn delay_without_both_sides_is_zero() {
        assert_eq!(delay_days(None, Some("2026-02-13T05:30:00+01:00")), 0);
        assert_eq!(delay_days(Some("2026-02-13T05:30:00+01:00"), None), 0);
        assert_eq!(delay_days(Some("bogus"), Some("2026-02-13T05:30:00+01:00")), 0);
    }

    #[test]
    fn formats_for_email() {
        assert_eq!(format_berlin(Some("2026-02-13T04:30:00+00:00")), "13.02.2026 05:30");
        assert_eq!(format_berlin(None), "Unbekannt");
        assert_eq!(format_berlin(Some("soon")), "soon");
    }
}
