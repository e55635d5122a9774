//! Timestamp handling for ZIP entries.
//!
//! A ZIP entry can carry its modification time in up to three places:
//!
//! - the MS-DOS date/time fields of every header (2-second resolution,
//!   years 1980-2107),
//! - the NTFS extra field (`0x000a`) with Windows FILETIME values
//!   (100-nanosecond resolution),
//! - the extended timestamp extra field (`0x5455`) with 32-bit Unix seconds.
//!
//! [`Timestamp`] stores the highest precision representation (FILETIME) and
//! [`DosDateTime`] converts to and from the packed MS-DOS fields. DOS values
//! are interpreted as UTC.
//!
//! # Example
//!
//! ```rust
//! use zipforge::{DosDateTime, Timestamp};
//!
//! let ts = Timestamp::from_unix_secs(1_700_000_000).unwrap();
//! let dos = DosDateTime::from_timestamp(ts);
//! assert_eq!(dos.to_timestamp().unwrap().as_unix_secs(), 1_700_000_000);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Windows FILETIME epoch: January 1, 1601 (UTC)
/// Difference from Unix epoch (January 1, 1970) in 100-nanosecond intervals.
const FILETIME_UNIX_DIFF: u64 = 116444736000000000;

/// Number of 100-nanosecond intervals per second.
const INTERVALS_PER_SECOND: u64 = 10_000_000;

const SECONDS_PER_DAY: i64 = 86_400;

/// A high-precision timestamp.
///
/// Wraps a Windows FILETIME value (100-nanosecond intervals since January 1, 1601)
/// and provides conversions to the coarser representations ZIP also uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Raw FILETIME value (100-nanosecond intervals since 1601-01-01)
    filetime: u64,
}

impl Timestamp {
    /// Creates a timestamp from a raw Windows FILETIME value.
    #[inline]
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Creates a timestamp from Unix seconds (since January 1, 1970).
    ///
    /// Returns `None` if the timestamp would overflow.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        if secs < 0 {
            let neg_intervals = secs.unsigned_abs().checked_mul(INTERVALS_PER_SECOND)?;
            FILETIME_UNIX_DIFF
                .checked_sub(neg_intervals)
                .map(Self::from_filetime)
        } else {
            let intervals = (secs as u64).checked_mul(INTERVALS_PER_SECOND)?;
            FILETIME_UNIX_DIFF
                .checked_add(intervals)
                .map(Self::from_filetime)
        }
    }

    /// Creates a timestamp from a `SystemTime`.
    ///
    /// Only 100-nanosecond precision is preserved.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        match time.duration_since(UNIX_EPOCH) {
            Ok(duration) => {
                let secs = duration.as_secs().checked_mul(INTERVALS_PER_SECOND)?;
                let sub = u64::from(duration.subsec_nanos()) / 100;
                FILETIME_UNIX_DIFF
                    .checked_add(secs)?
                    .checked_add(sub)
                    .map(Self::from_filetime)
            }
            Err(e) => {
                let duration = e.duration();
                let secs = duration.as_secs().checked_mul(INTERVALS_PER_SECOND)?;
                let sub = u64::from(duration.subsec_nanos()) / 100;
                FILETIME_UNIX_DIFF
                    .checked_sub(secs)?
                    .checked_sub(sub)
                    .map(Self::from_filetime)
            }
        }
    }

    /// Returns the current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now()).unwrap_or_default()
    }

    /// Returns the raw Windows FILETIME value.
    #[inline]
    pub const fn as_filetime(&self) -> u64 {
        self.filetime
    }

    /// Returns the timestamp as Unix seconds.
    ///
    /// Sub-second precision is truncated towards negative infinity.
    pub fn as_unix_secs(&self) -> i64 {
        if self.filetime >= FILETIME_UNIX_DIFF {
            ((self.filetime - FILETIME_UNIX_DIFF) / INTERVALS_PER_SECOND) as i64
        } else {
            let intervals = FILETIME_UNIX_DIFF - self.filetime;
            let secs = intervals.div_ceil(INTERVALS_PER_SECOND);
            -(secs as i64)
        }
    }

    /// Converts to a `SystemTime`, preserving 100-nanosecond precision.
    pub fn as_system_time(&self) -> SystemTime {
        if self.filetime >= FILETIME_UNIX_DIFF {
            let intervals = self.filetime - FILETIME_UNIX_DIFF;
            let nanos = ((intervals % INTERVALS_PER_SECOND) * 100) as u32;
            UNIX_EPOCH + Duration::new(intervals / INTERVALS_PER_SECOND, nanos)
        } else {
            let intervals = FILETIME_UNIX_DIFF - self.filetime;
            let nanos = ((intervals % INTERVALS_PER_SECOND) * 100) as u32;
            UNIX_EPOCH - Duration::new(intervals / INTERVALS_PER_SECOND, nanos)
        }
    }

    /// Returns the sub-second portion as 100-nanosecond intervals (0-9999999).
    #[inline]
    pub fn sub_second_100ns(&self) -> u32 {
        (self.filetime % INTERVALS_PER_SECOND) as u32
    }

    /// Returns the value as 32-bit Unix seconds if it fits, as stored in the
    /// extended timestamp extra field.
    pub fn as_unix_secs_i32(&self) -> Option<i32> {
        i32::try_from(self.as_unix_secs()).ok()
    }

    /// Converts to a [`filetime::FileTime`] for applying to extracted files.
    pub fn to_file_time(&self) -> filetime::FileTime {
        filetime::FileTime::from_system_time(self.as_system_time())
    }
}

impl Default for Timestamp {
    /// Returns the Unix epoch (January 1, 1970).
    fn default() -> Self {
        Self::from_filetime(FILETIME_UNIX_DIFF)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> SystemTime {
        ts.as_system_time()
    }
}

/// Packed MS-DOS date and time as stored in ZIP headers.
///
/// Time: bits 0-4 seconds / 2, bits 5-10 minutes, bits 11-15 hours.
/// Date: bits 0-4 day, bits 5-8 month, bits 9-15 years since 1980.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    /// Packed date field.
    pub date: u16,
    /// Packed time field.
    pub time: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable value.
    pub const MIN: Self = Self {
        date: (1 << 5) | 1,
        time: 0,
    };

    /// 2107-12-31 23:59:58, the latest representable value.
    pub const MAX: Self = Self {
        date: (127 << 9) | (12 << 5) | 31,
        time: (23 << 11) | (59 << 5) | 29,
    };

    /// Creates a value from raw header fields.
    pub const fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Converts a timestamp, clamping to the representable range and
    /// rounding odd seconds down.
    pub fn from_timestamp(ts: Timestamp) -> Self {
        let secs = ts.as_unix_secs();
        let days = secs.div_euclid(SECONDS_PER_DAY);
        let rem = secs.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        if year < 1980 {
            return Self::MIN;
        }
        if year > 2107 {
            return Self::MAX;
        }
        let hour = rem / 3600;
        let minute = (rem % 3600) / 60;
        let second = rem % 60;
        Self {
            date: (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16,
            time: ((hour as u16) << 11) | ((minute as u16) << 5) | (second / 2) as u16,
        }
    }

    /// Converts back to a timestamp.
    ///
    /// Returns `None` if the packed fields do not describe a valid date.
    pub fn to_timestamp(&self) -> Option<Timestamp> {
        let year = 1980 + i64::from(self.date >> 9);
        let month = u32::from((self.date >> 5) & 0x0F);
        let day = u32::from(self.date & 0x1F);
        let hour = i64::from(self.time >> 11);
        let minute = i64::from((self.time >> 5) & 0x3F);
        let second = i64::from(self.time & 0x1F) * 2;
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return None;
        }
        if hour > 23 || minute > 59 || second > 59 {
            return None;
        }
        let days = days_from_civil(year, month, day);
        Timestamp::from_unix_secs(days * SECONDS_PER_DAY + hour * 3600 + minute * 60 + second)
    }
}

impl Default for DosDateTime {
    fn default() -> Self {
        Self::MIN
    }
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        _ => 28,
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let m = i64::from(month);
    let mp = if m > 2 { m - 3 } else { m + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`days_from_civil`].
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
