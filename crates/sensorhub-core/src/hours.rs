//! Calendar hour arithmetic for hourly records
//!
//! Hours are evaluated in UTC.

use chrono::{DateTime, Datelike, Timelike, Utc};

const SECONDS_PER_HOUR: i64 = 3600;

/// The (year, month, day, hour) tuple a timestamp falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl HourKey {
    pub fn of(ts: DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
            day: ts.day(),
            hour: ts.hour(),
        }
    }
}

/// Whether two timestamps fall into the same calendar hour
pub fn same_hour(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    HourKey::of(a) == HourKey::of(b)
}

/// Truncate a timestamp to the top of its hour
pub fn hour_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(SECONDS_PER_HOUR);
    DateTime::from_timestamp(floored, 0).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn test_same_hour() {
        assert!(same_hour(at(10, 0, 0), at(10, 59, 59)));
        assert!(!same_hour(at(10, 59, 59), at(11, 0, 0)));
    }

    #[test]
    fn test_same_hour_different_day() {
        let monday = Utc.with_ymd_and_hms(2024, 3, 11, 10, 15, 0).unwrap();
        assert!(!same_hour(at(10, 15, 0), monday));
    }

    #[test]
    fn test_hour_start() {
        assert_eq!(hour_start(at(10, 42, 17)), at(10, 0, 0));
        assert_eq!(hour_start(at(11, 0, 0)), at(11, 0, 0));
    }

    #[test]
    fn test_hour_start_drops_subseconds() {
        let ts = at(9, 30, 0) + chrono::Duration::milliseconds(250);
        assert_eq!(hour_start(ts), at(9, 0, 0));
    }

    #[test]
    fn test_hour_key() {
        let key = HourKey::of(at(23, 5, 0));
        assert_eq!(
            key,
            HourKey {
                year: 2024,
                month: 3,
                day: 10,
                hour: 23
            }
        );
    }
}
