//! Calendar time and the real-time-clock seam
//!
//! The logger only ever needs second resolution. `DateTime` is a plain
//! broken-down calendar value (no time zone, no epoch arithmetic beyond what
//! the simulated RTC needs), and `Clock` is the collaborator that owns the
//! process-wide time of day.

use core::fmt::{self, Display, Write};

use thiserror_no_std::Error;

/// Length of `YYYY-MM-DDTHH:MM:SS`
pub const ISO8601_LEN: usize = 19;

const SECONDS_PER_DAY: u32 = 86_400;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeError {
    #[error("timestamp must be formatted as YYYY-MM-DDTHH:MM:SS")]
    Malformed,
    #[error("calendar value out of range")]
    OutOfRange,
}

/// Broken-down wall-clock time with second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// Build a validated date-time.
    pub fn new(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<Self, TimeError> {
        let dt = Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        };
        if dt.is_valid() {
            Ok(dt)
        } else {
            Err(TimeError::OutOfRange)
        }
    }

    pub fn is_valid(&self) -> bool {
        (2000..=2099).contains(&self.year)
            && (1..=12).contains(&self.month)
            && self.day >= 1
            && self.day <= days_in_month(self.year, self.month)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60
    }

    /// Parse `YYYY-MM-DDTHH:MM:SS` (the format RTC libraries emit and the
    /// CSV files store).
    pub fn parse_iso8601(s: &str) -> Result<Self, TimeError> {
        let b = s.as_bytes();
        if b.len() != ISO8601_LEN
            || b[4] != b'-'
            || b[7] != b'-'
            || b[10] != b'T'
            || b[13] != b':'
            || b[16] != b':'
        {
            return Err(TimeError::Malformed);
        }

        let year = digits(&b[0..4])? as u16;
        let month = digits(&b[5..7])? as u8;
        let day = digits(&b[8..10])? as u8;
        let hour = digits(&b[11..13])? as u8;
        let minute = digits(&b[14..16])? as u8;
        let second = digits(&b[17..19])? as u8;

        Self::new(year, month, day, hour, minute, second)
    }

    /// Format as `YYYY-MM-DDTHH:MM:SS`.
    pub fn to_iso8601(&self) -> heapless::String<ISO8601_LEN> {
        let mut out = heapless::String::new();
        // Always fits: every field is range-checked to its column width.
        let _ = write!(out, "{}", self);
        out
    }

    /// Seconds since midnight.
    pub const fn seconds_of_day(&self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60 + self.second as u32
    }

    /// Advance by `secs`, rolling over days, months and years.
    ///
    /// Saturates at `u32::MAX` seconds past this day's midnight.
    pub fn add_seconds(&self, secs: u32) -> Self {
        let total = self.seconds_of_day().saturating_add(secs);
        let mut days = total / SECONDS_PER_DAY;
        let rem = total % SECONDS_PER_DAY;

        let mut out = Self {
            hour: (rem / 3600) as u8,
            minute: ((rem % 3600) / 60) as u8,
            second: (rem % 60) as u8,
            ..*self
        };

        while days > 0 {
            if out.day < days_in_month(out.year, out.month) {
                out.day += 1;
            } else {
                out.day = 1;
                if out.month >= 12 {
                    out.month = 1;
                    out.year = out.year.saturating_add(1);
                } else {
                    out.month += 1;
                }
            }
            days -= 1;
        }
        out
    }
}

impl Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

impl From<DateTime> for embedded_sdmmc::Timestamp {
    fn from(dt: DateTime) -> Self {
        embedded_sdmmc::Timestamp {
            // FAT dates span 1970..=2225.
            year_since_1970: u8::try_from(dt.year.saturating_sub(1970)).unwrap_or(u8::MAX),
            zero_indexed_month: dt.month.saturating_sub(1),
            zero_indexed_day: dt.day.saturating_sub(1),
            hours: dt.hour,
            minutes: dt.minute,
            seconds: dt.second,
        }
    }
}

pub const fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub const fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

fn digits(b: &[u8]) -> Result<u32, TimeError> {
    b.iter().try_fold(0u32, |acc, &c| {
        if c.is_ascii_digit() {
            Ok(acc * 10 + (c - b'0') as u32)
        } else {
            Err(TimeError::Malformed)
        }
    })
}

/// Real-time clock collaborator.
///
/// Only the transmission manager is allowed to call [`Clock::adjust`].
pub trait Clock {
    fn now(&mut self) -> DateTime;

    fn adjust(&mut self, time: DateTime);
}
