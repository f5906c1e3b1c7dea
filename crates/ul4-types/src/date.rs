//! Calendar dates with millisecond precision.

use crate::error::InvalidValue;
use serde::{Deserialize, Serialize};

const DAYS_IN_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Cumulative days before the first of each month in a non-leap year.
const DAYS_BEFORE_MONTH: [u16; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// A naive (timezone-less) timestamp.
///
/// Field order makes the derived ordering chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Date {
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    millisecond: u16,
}

pub(crate) fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u8) -> u8 {
    if month == 2 && is_leap(year) {
        29
    } else {
        DAYS_IN_MONTH[usize::from(month - 1)]
    }
}

impl Date {
    /// Midnight of the given day.
    pub fn new(year: i32, month: u8, day: u8) -> Result<Self, InvalidValue> {
        Self::with_time(year, month, day, 0, 0, 0, 0)
    }

    pub fn with_time(
        year: i32,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        millisecond: u16,
    ) -> Result<Self, InvalidValue> {
        if !(1..=9999).contains(&year) {
            return Err(InvalidValue::out_of_range("year", year));
        }
        if !(1..=12).contains(&month) {
            return Err(InvalidValue::out_of_range("month", month));
        }
        if day == 0 || day > days_in_month(year, month) {
            return Err(InvalidValue::out_of_range("day", day));
        }
        if hour > 23 {
            return Err(InvalidValue::out_of_range("hour", hour));
        }
        if minute > 59 {
            return Err(InvalidValue::out_of_range("minute", minute));
        }
        if second > 59 {
            return Err(InvalidValue::out_of_range("second", second));
        }
        if millisecond > 999 {
            return Err(InvalidValue::out_of_range("millisecond", millisecond));
        }
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            millisecond,
        })
    }

    /// Convert milliseconds since the Unix epoch.
    pub fn from_unix_millis(millis: i64) -> Result<Self, InvalidValue> {
        let days = millis.div_euclid(86_400_000);
        let rest = millis.rem_euclid(86_400_000);
        let (year, month, day) = civil_from_days(days);
        let year = i32::try_from(year).map_err(|_| InvalidValue::out_of_range("year", year))?;
        Self::with_time(
            year,
            month,
            day,
            (rest / 3_600_000) as u8,
            (rest / 60_000 % 60) as u8,
            (rest / 1000 % 60) as u8,
            (rest % 1000) as u16,
        )
    }

    /// Parse the compact form `YYYYMMDDHHMMSSfff`.
    pub fn from_compact(text: &str) -> Result<Self, InvalidValue> {
        let malformed = || InvalidValue::Malformed {
            kind: "date",
            text: text.to_string(),
        };
        if text.len() != 17 || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let field = |range: std::ops::Range<usize>| text[range].parse::<u16>().map_err(|_| malformed());
        Self::with_time(
            i32::from(field(0..4)?),
            field(4..6)? as u8,
            field(6..8)? as u8,
            field(8..10)? as u8,
            field(10..12)? as u8,
            field(12..14)? as u8,
            field(14..17)?,
        )
    }

    /// The compact form `YYYYMMDDHHMMSSfff`.
    pub fn to_compact(&self) -> String {
        format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}{:03}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.millisecond
        )
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn second(&self) -> u8 {
        self.second
    }

    pub fn millisecond(&self) -> u16 {
        self.millisecond
    }

    pub fn microsecond(&self) -> u32 {
        u32::from(self.millisecond) * 1000
    }

    /// True if any time component is non-zero.
    pub fn has_time(&self) -> bool {
        self.hour != 0 || self.minute != 0 || self.second != 0 || self.millisecond != 0
    }

    /// Day of the year, starting at 1 for January 1st.
    pub fn yearday(&self) -> u16 {
        let leap = u16::from(self.month > 2 && is_leap(self.year));
        DAYS_BEFORE_MONTH[usize::from(self.month - 1)] + leap + u16::from(self.day)
    }

    /// Day of the week, Monday is 0.
    pub fn weekday(&self) -> u8 {
        let y = i64::from(self.year) - 1;
        let ordinal = y * 365 + y / 4 - y / 100 + y / 400 + i64::from(self.yearday());
        // 0001-01-01 (ordinal 1) was a Monday
        (ordinal - 1).rem_euclid(7) as u8
    }

    /// Week of the year where weeks start on `first_weekday` (Monday is 0).
    ///
    /// Days before the first such weekday fall into week 0.
    pub fn week(&self, first_weekday: u8) -> u16 {
        let yday0 = self.yearday() - 1;
        let offset = u16::from((self.weekday() + 7 - first_weekday) % 7);
        (yday0 + 7 - offset) / 7
    }
}

/// Days since 1970-01-01 to (year, month, day).
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_day() {
        assert!(Date::new(2011, 2, 29).is_err());
        assert!(Date::new(2012, 2, 29).is_ok());
        assert!(Date::new(1900, 2, 29).is_err());
        assert!(Date::new(2000, 2, 29).is_ok());
        assert!(Date::new(2012, 13, 1).is_err());
        assert!(Date::with_time(2012, 1, 1, 24, 0, 0, 0).is_err());
    }

    #[test]
    fn test_yearday() {
        assert_eq!(Date::new(2012, 1, 1).unwrap().yearday(), 1);
        assert_eq!(Date::new(2012, 12, 31).unwrap().yearday(), 366);
        assert_eq!(Date::new(2011, 12, 31).unwrap().yearday(), 365);
        assert_eq!(Date::new(2012, 3, 1).unwrap().yearday(), 61);
    }

    #[test]
    fn test_weekday() {
        // 2012-01-02 was a Monday
        assert_eq!(Date::new(2012, 1, 2).unwrap().weekday(), 0);
        assert_eq!(Date::new(2012, 1, 1).unwrap().weekday(), 6);
        assert_eq!(Date::new(2000, 2, 29).unwrap().weekday(), 1);
        assert_eq!(Date::new(1970, 1, 1).unwrap().weekday(), 3);
    }

    #[test]
    fn test_week_numbers() {
        let sunday = Date::new(2012, 1, 1).unwrap();
        assert_eq!(sunday.week(6), 1);
        assert_eq!(sunday.week(0), 0);
        let monday = Date::new(2012, 1, 2).unwrap();
        assert_eq!(monday.week(0), 1);
    }

    #[test]
    fn test_from_unix_millis() {
        let d = Date::from_unix_millis(0).unwrap();
        assert_eq!(d, Date::new(1970, 1, 1).unwrap());
        let d = Date::from_unix_millis(1_325_473_445_678).unwrap();
        assert_eq!(d, Date::with_time(2012, 1, 2, 3, 4, 5, 678).unwrap());
    }

    #[test]
    fn test_compact_form() {
        let d = Date::with_time(2012, 1, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(d.to_compact(), "20120102030405006");
        assert_eq!(Date::from_compact("20120102030405006"), Ok(d));
        assert!(Date::from_compact("2012010203040500").is_err());
        assert!(Date::from_compact("20121302030405006").is_err());
    }

    #[test]
    fn test_ordering_is_chronological() {
        let a = Date::with_time(2012, 1, 2, 3, 4, 5, 6).unwrap();
        let b = Date::with_time(2012, 1, 2, 3, 4, 5, 7).unwrap();
        let c = Date::new(2013, 1, 1).unwrap();
        assert!(a < b && b < c);
    }
}
