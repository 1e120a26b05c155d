//! Date normalisation for metadata comparisons
//!
//! Dates in metadata arrive as strings in several shapes. Everything is
//! normalised to a local naive datetime so that date-only and timestamped
//! values compare on one axis.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn relative_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"^<\s*(today|now)\s*(?:([+-])\s*(\d+)\s*d)?\s*>$")
            .expect("relative date token pattern is valid")
    })
}

/// Midnight of the current local day
pub fn today() -> NaiveDateTime {
    start_of_day(Local::now().naive_local())
}

pub fn start_of_day(moment: NaiveDateTime) -> NaiveDateTime {
    moment.date().and_time(NaiveTime::MIN)
}

/// Interpret `raw` as a point in time.
///
/// Accepts RFC 3339 timestamps (converted to local time), naive ISO
/// datetimes, plain `YYYY-MM-DD` dates (midnight) and the relative tokens
/// `<today>`, `<now>`, `<today+Nd>`, `<today-Nd>`.
pub fn parse_temporal(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(caps) = relative_token().captures(raw) {
        let base = match &caps[1] {
            "now" => Local::now().naive_local(),
            _ => today(),
        };
        let offset = match (caps.get(2), caps.get(3)) {
            (Some(sign), Some(days)) => {
                let days: i64 = days.as_str().parse().ok()?;
                if sign.as_str() == "-" {
                    -days
                } else {
                    days
                }
            }
            _ => 0,
        };
        return base.checked_add_signed(Duration::try_days(offset)?);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_date_is_midnight() {
        let parsed = parse_temporal("2024-02-29").unwrap();
        assert_eq!(parsed.to_string(), "2024-02-29 00:00:00");
    }

    #[test]
    fn test_naive_datetime() {
        let parsed = parse_temporal("2024-02-29T13:45:00").unwrap();
        assert_eq!(parsed.to_string(), "2024-02-29 13:45:00");
    }

    #[test]
    fn test_rfc3339_converted_to_local() {
        let parsed = parse_temporal("2024-02-29T12:00:00+00:00").unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-02-29T12:00:00+00:00")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_relative_tokens() {
        let now = today();
        assert_eq!(parse_temporal("<today>"), Some(now));
        assert_eq!(parse_temporal("<today+8d>"), Some(now + Duration::days(8)));
        assert_eq!(parse_temporal("< today - 1d >"), Some(now - Duration::days(1)));
        assert!(parse_temporal("<now>").unwrap() >= now);
    }

    #[test]
    fn test_garbage() {
        assert!(parse_temporal("").is_none());
        assert!(parse_temporal("yesterday-ish").is_none());
        assert!(parse_temporal("<tomorrow>").is_none());
        assert!(parse_temporal("2024-13-40").is_none());
    }
}
