//! MS-DOS and extended timestamp decoding.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::structures::{ExtraField, extra_id};

/// 100ns ticks between 1601-01-01 and 1970-01-01.
const NTFS_EPOCH_OFFSET_TICKS: i64 = 116_444_736_000_000_000;

/// Decode MS-DOS packed date and time fields.
///
/// Seconds have two-second resolution. Returns `None` for field values that
/// do not form a calendar date (such as the all-zero date some tools write).
pub fn dos_date_time_to_naive(date: u16, time: u16) -> Option<NaiveDateTime> {
    let day = (date & 0x1f) as u32;
    let month = ((date >> 5) & 0x0f) as u32;
    let year = ((date >> 9) & 0x7f) as i32 + 1980;

    let second = ((time & 0x1f) * 2) as u32;
    let minute = ((time >> 5) & 0x3f) as u32;
    let hour = ((time >> 11) & 0x1f) as u32;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Modification time from the first usable timestamp extra field.
///
/// Info-ZIP extended timestamps (`0x5455`) carry whole seconds; NTFS fields
/// (`0x000a`) carry 100ns ticks, truncated toward zero to milliseconds.
pub fn extended_mtime(extra_fields: &[ExtraField]) -> Option<DateTime<Utc>> {
    extra_fields.iter().find_map(|field| match field.id {
        extra_id::EXTENDED_TIMESTAMP => unix_mtime(&field.data),
        extra_id::NTFS => ntfs_mtime(&field.data),
        _ => None,
    })
}

fn unix_mtime(data: &[u8]) -> Option<DateTime<Utc>> {
    const HAS_MTIME: u8 = 0x01;
    if data.len() < 5 || data[0] & HAS_MTIME == 0 {
        return None;
    }
    let seconds = LittleEndian::read_i32(&data[1..5]);
    DateTime::from_timestamp(seconds as i64, 0)
}

fn ntfs_mtime(data: &[u8]) -> Option<DateTime<Utc>> {
    // 4 reserved bytes, then tagged attributes
    let mut cursor = 4;
    while cursor + 4 <= data.len() {
        let tag = LittleEndian::read_u16(&data[cursor..]);
        let size = LittleEndian::read_u16(&data[cursor + 2..]) as usize;
        cursor += 4;
        if tag != 1 {
            cursor += size;
            continue;
        }
        if size < 8 || cursor + size > data.len() {
            return None;
        }
        let ticks = LittleEndian::read_i64(&data[cursor..cursor + 8]);
        let millis = ticks.checked_sub(NTFS_EPOCH_OFFSET_TICKS)? / 10_000;
        return DateTime::from_timestamp_millis(millis);
    }
    None
}
