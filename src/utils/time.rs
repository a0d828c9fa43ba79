//! Timestamp conversions between wire, storage, and display forms.
//!
//! The detection database stores timestamps as `TEXT 'YYYY-MM-DD HH:MM:SS'`
//! in UTC at second precision, so `strftime`/`date()` grouping and
//! lexicographic ordering match chronological ordering. Wire output is
//! RFC3339 with an explicit trailing `Z`.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;

/// Storage timestamp format.
const DB_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format an instant for database storage.
pub fn to_db_timestamp(instant: DateTime<Utc>) -> String {
    instant.format(DB_FORMAT).to_string()
}

/// Parse a database timestamp back into a UTC instant.
pub fn from_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, DB_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::TimestampParse {
            value: value.to_string(),
        })
}

/// Format an instant for wire output: RFC3339 UTC with a trailing `Z`.
pub fn to_wire_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a wire timestamp (ISO-8601 with timezone) into a UTC instant.
pub fn from_wire_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|fixed| fixed.with_timezone(&Utc))
        .map_err(|_| Error::TimestampParse {
            value: value.to_string(),
        })
}

/// ISO week number (1-53) for a UTC instant.
pub fn iso_week(instant: DateTime<Utc>) -> i64 {
    i64::from(instant.iso_week().week())
}

/// Hour epoch for a UTC instant: `floor(unix_seconds / 3600)`.
pub fn hour_epoch(instant: DateTime<Utc>) -> i64 {
    instant.timestamp().div_euclid(3600)
}

/// Start of the local calendar day containing `instant`, as a UTC instant.
pub fn local_day_start(instant: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let midnight = instant
        .with_timezone(&tz)
        .date_naive()
        .and_time(chrono::NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map_or_else(|| instant - Duration::days(1), |local| local.with_timezone(&Utc))
}

/// Start of the local ISO week (Monday) containing `instant`, as UTC.
pub fn local_week_start(instant: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = instant.with_timezone(&tz);
    let days_from_monday = i64::from(local.weekday().num_days_from_monday());
    let monday = local.date_naive() - Duration::days(days_from_monday);
    let midnight = monday.and_time(chrono::NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map_or_else(|| instant - Duration::days(7), |local| local.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_db_timestamp_round_trip() {
        let instant = Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();
        let stored = to_db_timestamp(instant);
        assert_eq!(stored, "2025-01-02 10:00:00");
        assert_eq!(from_db_timestamp(&stored).unwrap(), instant);
    }

    #[test]
    fn test_wire_timestamp_ends_in_z() {
        let instant = Utc.with_ymd_and_hms(2025, 6, 15, 4, 30, 12).unwrap();
        let wire = to_wire_timestamp(instant);
        assert!(wire.ends_with('Z'));
        assert_eq!(from_wire_timestamp(&wire).unwrap(), instant);
    }

    #[test]
    fn test_wire_timestamp_accepts_offsets() {
        let parsed = from_wire_timestamp("2025-06-15T07:30:12+03:00").unwrap();
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2025, 6, 15, 4, 30, 12).unwrap()
        );
    }

    #[test]
    fn test_invalid_wire_timestamp() {
        assert!(from_wire_timestamp("not a timestamp").is_err());
    }

    #[test]
    fn test_hour_epoch_floors() {
        let instant = Utc.with_ymd_and_hms(1970, 1, 1, 1, 59, 59).unwrap();
        assert_eq!(hour_epoch(instant), 1);
    }

    #[test]
    fn test_local_day_start_respects_timezone() {
        // 2025-06-15 02:00 UTC is still 2025-06-14 22:00 in Toronto (UTC-4).
        let instant = Utc.with_ymd_and_hms(2025, 6, 15, 2, 0, 0).unwrap();
        let day_start = local_day_start(instant, chrono_tz::America::Toronto);
        assert_eq!(
            day_start,
            Utc.with_ymd_and_hms(2025, 6, 14, 4, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_local_week_start_is_monday() {
        // 2025-06-15 is a Sunday; the local week began Monday 2025-06-09.
        let instant = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let week_start = local_week_start(instant, chrono_tz::UTC);
        assert_eq!(
            week_start,
            Utc.with_ymd_and_hms(2025, 6, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_iso_week_boundaries() {
        // 2025-01-02 falls in ISO week 1.
        let instant = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(iso_week(instant), 1);
        // 2024-12-30 already belongs to ISO week 1 of 2025.
        let instant = Utc.with_ymd_and_hms(2024, 12, 30, 0, 0, 0).unwrap();
        assert_eq!(iso_week(instant), 1);
    }
}
