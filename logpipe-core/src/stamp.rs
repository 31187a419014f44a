// SPDX-License-Identifier: Apache-2.0

//! Wall-clock timestamps attached to a [`crate::message::Message`] (spec §3: `STAMP`/`RECVD`,
//! each carrying seconds, microseconds and a zone offset).

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

/// A timestamp with microsecond resolution and an explicit zone offset, matching the precision
/// the original wire formats carry (RFC3164's second resolution, RFC5424's fractional seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub seconds: i64,
    pub microseconds: u32,
    /// Offset from UTC, in seconds, positive east.
    pub zone_offset: i32,
}

impl Stamp {
    pub fn now(zone_offset: i32) -> Self {
        Self::from_datetime(Utc::now(), zone_offset)
    }

    pub fn from_datetime<Tz: TimeZone>(dt: DateTime<Tz>, zone_offset: i32) -> Self {
        Stamp {
            seconds: dt.timestamp(),
            microseconds: dt.timestamp_subsec_micros(),
            zone_offset,
        }
    }

    /// Converts to a [`DateTime<FixedOffset>`] for formatting or comparison.
    pub fn to_datetime(self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.zone_offset)?;
        offset
            .timestamp_opt(self.seconds, self.microseconds * 1_000)
            .single()
    }
}

impl Default for Stamp {
    /// The epoch at UTC; used as a placeholder until a real stamp is assigned.
    fn default() -> Self {
        Stamp {
            seconds: 0,
            microseconds: 0,
            zone_offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_datetime() {
        let dt = Utc.with_ymd_and_hms(2003, 10, 11, 22, 14, 15).unwrap();
        let stamp = Stamp::from_datetime(dt, 0);
        let back = stamp.to_datetime().unwrap();
        assert_eq!(back.timestamp(), dt.timestamp());
    }

    #[test]
    fn zone_offset_is_preserved() {
        let stamp = Stamp {
            seconds: 1_000_000,
            microseconds: 500_000,
            zone_offset: 3600,
        };
        let dt = stamp.to_datetime().unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 3600);
    }
}
