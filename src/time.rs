//! Timestamp formatting and deadline-string parsing.
//!
//! Grounded on `original_source/ctm/lib/ctm.py::cmd_deadline`: relative
//! offsets (`+Nh`/`+Nd`/`+Nw`/`+Nm`) via regex, falling back to a small set
//! of ISO-ish formats.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE_DEADLINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+(\d+)([hdwm])$").unwrap());

/// Format a UTC timestamp the way every on-disk field expects:
/// ISO-8601 with a trailing literal `Z`.
pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.fZ").to_string()
}

/// Current UTC timestamp formatted per [`format_utc`].
pub fn now_string() -> String {
    format_utc(Utc::now())
}

/// Parse one of this crate's on-disk ISO-8601 timestamp strings.
pub fn parse_utc(s: &str) -> crate::error::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
        })
        .map_err(|e| crate::error::CtmError::CorruptStore {
            path: s.to_string(),
            reason: format!("unparseable timestamp: {e}"),
        })
}

/// Parse a user-supplied deadline string into a UTC timestamp.
///
/// Accepts relative offsets `+Nh`, `+Nd`, `+Nw`, `+Nm` (months approximated
/// as 30 days, matching the original), or one of `%Y-%m-%d`,
/// `%Y-%m-%dT%H:%M`, `%Y-%m-%d %H:%M`.
pub fn parse_deadline(input: &str, now: DateTime<Utc>) -> crate::error::Result<DateTime<Utc>> {
    let trimmed = input.trim();

    if let Some(caps) = RELATIVE_DEADLINE_RE.captures(trimmed) {
        let n: i64 = caps[1].parse().unwrap_or(0);
        let unit = &caps[2];
        let delta = match unit {
            "h" => Duration::hours(n),
            "d" => Duration::days(n),
            "w" => Duration::weeks(n),
            "m" => Duration::days(n * 30),
            _ => unreachable!("regex only captures h/d/w/m"),
        };
        return Ok(now + delta);
    }

    for fmt in ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let ndt = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
        return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
    }

    Err(crate::error::CtmError::CorruptStore {
        path: trimmed.to_string(),
        reason: "deadline must be +Nh/+Nd/+Nw/+Nm or an ISO date".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn relative_hours() {
        let d = parse_deadline("+3h", fixed_now()).unwrap();
        assert_eq!(d, fixed_now() + Duration::hours(3));
    }

    #[test]
    fn relative_days_weeks_months() {
        assert_eq!(
            parse_deadline("+2d", fixed_now()).unwrap(),
            fixed_now() + Duration::days(2)
        );
        assert_eq!(
            parse_deadline("+1w", fixed_now()).unwrap(),
            fixed_now() + Duration::weeks(1)
        );
        assert_eq!(
            parse_deadline("+1m", fixed_now()).unwrap(),
            fixed_now() + Duration::days(30)
        );
    }

    #[test]
    fn iso_date_only() {
        let d = parse_deadline("2026-03-01", fixed_now()).unwrap();
        assert_eq!(d.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn iso_datetime() {
        let d = parse_deadline("2026-03-01T08:30", fixed_now()).unwrap();
        assert_eq!(d.format("%H:%M").to_string(), "08:30");
    }

    #[test]
    fn garbage_input_errors() {
        assert!(parse_deadline("whenever", fixed_now()).is_err());
    }

    #[test]
    fn format_roundtrip() {
        let ts = fixed_now();
        let formatted = format_utc(ts);
        assert!(formatted.ends_with('Z'));
        let parsed = parse_utc(&formatted).unwrap();
        assert_eq!(parsed, ts);
    }
}
