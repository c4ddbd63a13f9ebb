//! exFAT timestamp decoding.
//!
//! Each timestamp is an MS-DOS date/time pair (2-second resolution), an
//! optional 10 ms increment (0..=199) and a UTC offset byte.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime};
use serde::Serialize;

const UTC_OFFSET_VALID: u8 = 0x80;
const MAX_10MS_INCREMENT: u8 = 199;

/// One timestamp field of a file directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExfatTimestamp {
    pub date: u16,
    pub time: u16,
    /// 10 ms units past `time`; always zero for access times
    pub increment_10ms: u8,
    pub utc_offset: u8,
}

impl ExfatTimestamp {
    pub fn new(date: u16, time: u16, increment_10ms: u8, utc_offset: u8) -> Self {
        Self {
            date,
            time,
            increment_10ms,
            utc_offset,
        }
    }

    /// Local wall-clock time, including the 10 ms increment.
    ///
    /// `None` when the date or time fields are not a real calendar value.
    pub fn naive(&self) -> Option<NaiveDateTime> {
        let year = ((self.date >> 9) & 0x7F) as i32 + 1980;
        let month = ((self.date >> 5) & 0x0F) as u32;
        let day = (self.date & 0x1F) as u32;

        let hour = ((self.time >> 11) & 0x1F) as u32;
        let minute = ((self.time >> 5) & 0x3F) as u32;
        let second = ((self.time & 0x1F) * 2) as u32;

        let base = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
        let increment = self.increment_10ms.min(MAX_10MS_INCREMENT) as i64;
        Some(base + Duration::milliseconds(increment * 10))
    }

    /// Offset from UTC when the entry records a valid one.
    pub fn offset(&self) -> Option<FixedOffset> {
        if self.utc_offset & UTC_OFFSET_VALID == 0 {
            return None;
        }
        // Low 7 bits are a signed count of 15-minute intervals.
        let quarters = ((self.utc_offset << 1) as i8 >> 1) as i32;
        FixedOffset::east_opt(quarters * 15 * 60)
    }

    /// Timestamp with its recorded offset applied.
    ///
    /// Without a valid offset the wall-clock time is interpreted as UTC.
    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let naive = self.naive()?;
        let offset = self.offset().or_else(|| FixedOffset::east_opt(0))?;
        naive.and_local_timezone(offset).single()
    }

    pub fn is_zero(&self) -> bool {
        self.date == 0 && self.time == 0
    }
}

impl std::fmt::Display for ExfatTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.naive(), self.offset()) {
            (Some(naive), Some(offset)) => {
                write!(f, "{} ({})", naive.format("%Y-%m-%d %H:%M:%S%.3f"), offset)
            }
            (Some(naive), None) => write!(f, "{}", naive.format("%Y-%m-%d %H:%M:%S%.3f")),
            (None, _) => write!(f, "0000-00-00 00:00:00 (invalid)"),
        }
    }
}
