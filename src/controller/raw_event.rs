//! Binary layout of the kernel `input_event` record.
//!
//! The event device hands out fixed-size records `{timeval, type, code, value}`.
//! Only the width of `timeval` depends on the target, so the record size is taken
//! from `libc::input_event` rather than hard-coded.

use chrono::{DateTime, Utc};
use std::mem;

/// Size in bytes of one record as delivered by `read(2)` on an event device.
pub const RECORD_SIZE: usize = mem::size_of::<libc::input_event>();

/// `EV_KEY`: discrete key and button transitions.
pub const EV_KEY: u16 = evdev::EventType::KEY.0;

/// Decoded form of one `input_event` record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEventRecord {
    pub seconds: i64,
    pub micros: i64,
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEventRecord {
    pub fn key(code: u16, value: i32) -> Self {
        Self {
            seconds: 0,
            micros: 0,
            event_type: EV_KEY,
            code,
            value,
        }
    }

    /// Parses exactly one record. Any other length is a malformed read.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != RECORD_SIZE {
            return None;
        }

        // SAFETY: the length matches `input_event` and the struct is plain integers,
        // so every bit pattern is a valid value. `read_unaligned` covers the byte buffer.
        let raw: libc::input_event = unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast()) };

        Some(Self {
            seconds: raw.time.tv_sec as i64,
            micros: raw.time.tv_usec as i64,
            event_type: raw.type_,
            code: raw.code,
            value: raw.value,
        })
    }

    /// Encodes the record in the kernel layout.
    pub fn encode(&self) -> Vec<u8> {
        let raw = libc::input_event {
            time: libc::timeval {
                tv_sec: self.seconds as libc::time_t,
                tv_usec: self.micros as libc::suseconds_t,
            },
            type_: self.event_type,
            code: self.code,
            value: self.value,
        };

        // SAFETY: `raw` lives for the whole borrow and is exactly RECORD_SIZE bytes.
        let bytes = unsafe {
            std::slice::from_raw_parts((&raw as *const libc::input_event).cast::<u8>(), RECORD_SIZE)
        };
        bytes.to_vec()
    }

    pub fn is_key(&self) -> bool {
        self.event_type == EV_KEY
    }

    /// Kernel timestamp of the record, if it is representable.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let nanos = u32::try_from(self.micros.checked_mul(1_000)?).ok()?;
        DateTime::from_timestamp(self.seconds, nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_record() {
        let record = RawEventRecord {
            seconds: 1_700_000_000,
            micros: 250_000,
            event_type: EV_KEY,
            code: 304,
            value: 1,
        };

        let parsed = RawEventRecord::parse(&record.encode()).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.is_key());
        assert_eq!(
            parsed.timestamp().unwrap().timestamp_subsec_micros(),
            250_000
        );
    }

    #[test]
    fn rejects_wrong_lengths() {
        let bytes = RawEventRecord::key(304, 1).encode();

        assert!(RawEventRecord::parse(&bytes[..RECORD_SIZE - 1]).is_none());
        assert!(RawEventRecord::parse(&[]).is_none());

        let mut long = bytes.clone();
        long.push(0);
        assert!(RawEventRecord::parse(&long).is_none());
    }

    #[test]
    fn non_key_types_are_flagged() {
        let mut record = RawEventRecord::key(0, 0);
        record.event_type = evdev::EventType::ABSOLUTE.0;
        assert!(!record.is_key());
    }
}
