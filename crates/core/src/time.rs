//! Wall-clock handling for record timestamps.
//!
//! Records carry `YYYY-MM-DD HH:MM:SS` strings without a zone. They are
//! written and compared in one configured UTC offset.

use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};

/// Timestamp layout used by `create_date` / `expire_date`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Clock producing record timestamps in a fixed UTC offset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RecordClock {
    offset: FixedOffset,
}

impl Default for RecordClock {
    /// UTC+08:00, the zone existing deployments stamp records in.
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(8 * 3600).unwrap_or_else(utc_offset),
        }
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

impl RecordClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Parse an offset such as `+08:00`, `-0530` or `Z`.
    pub fn from_offset_str(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("z") || text.eq_ignore_ascii_case("utc") {
            return Some(Self::new(utc_offset()));
        }

        let (sign, rest) = match text.as_bytes().first()? {
            b'+' => (1, &text[1..]),
            b'-' => (-1, &text[1..]),
            _ => return None,
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let hours: i32 = digits[..2].parse().ok()?;
        let minutes: i32 = digits[2..].parse().ok()?;
        if minutes >= 60 {
            return None;
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Current local time in the configured offset.
    pub fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }

    /// Current time formatted as a record timestamp.
    pub fn stamp(&self) -> String {
        Self::format(self.now())
    }

    pub fn format(at: NaiveDateTime) -> String {
        at.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn parse(text: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offsets() {
        let east = RecordClock::from_offset_str("+08:00").unwrap();
        assert_eq!(east.offset().local_minus_utc(), 8 * 3600);

        let west = RecordClock::from_offset_str("-0530").unwrap();
        assert_eq!(west.offset().local_minus_utc(), -(5 * 3600 + 30 * 60));

        assert_eq!(
            RecordClock::from_offset_str("Z").unwrap().offset().local_minus_utc(),
            0
        );
        assert!(RecordClock::from_offset_str("8").is_none());
        assert!(RecordClock::from_offset_str("+08:75").is_none());
    }

    #[test]
    fn stamps_round_trip_through_parse() {
        let clock = RecordClock::default();
        let stamp = clock.stamp();
        assert_eq!(stamp.len(), 19);
        assert!(RecordClock::parse(&stamp).is_some());
    }
}
