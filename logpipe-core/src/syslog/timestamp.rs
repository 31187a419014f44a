// SPDX-License-Identifier: Apache-2.0

//! Shared timestamp parsing helpers for the legacy and structured syslog formats (spec §4.2
//! step 3, "Date in one of the recognised legacy forms"), grounded on
//! `original_source/modules/syslogformat/syslog-format.c`'s `log_msg_parse_date` call sites.

use crate::stamp::Stamp;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn month_from_name(name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|&m| m.eq_ignore_ascii_case(name))
        .map(|idx| idx as u32 + 1)
}

/// Parses a BSD-style legacy timestamp (`Mmm dd hh:mm:ss`, e.g. `Oct 11 22:14:15`) from the
/// front of `text`, returning the parsed stamp and the number of bytes consumed. The year is not
/// present in this format, so it is inferred from `recv_time`'s year (rolling back one year if
/// that would place the timestamp more than a day in the future, matching how an antique message
/// near a year boundary is reconciled against the receive time).
pub fn parse_bsd_timestamp(
    text: &str,
    recv_time: DateTime<Utc>,
    zone_offset: i32,
) -> Option<(Stamp, usize)> {
    let bytes = text.as_bytes();
    if bytes.len() < 15 {
        return None;
    }
    let month = month_from_name(&text[0..3])?;
    if bytes[3] != b' ' {
        return None;
    }
    let day_field = &text[4..6];
    let day: u32 = day_field.trim_start().parse().ok()?;
    if bytes[6] != b' ' {
        return None;
    }
    let hh: u32 = text.get(7..9)?.parse().ok()?;
    if bytes.get(9) != Some(&b':') {
        return None;
    }
    let mm: u32 = text.get(10..12)?.parse().ok()?;
    if bytes.get(12) != Some(&b':') {
        return None;
    }
    let ss: u32 = text.get(13..15)?.parse().ok()?;

    let mut year = recv_time.year();
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hh, mm, ss)?;
    let candidate = offset_datetime(naive, zone_offset)?;
    if candidate.with_timezone(&Utc) - recv_time > chrono::Duration::days(1) {
        year -= 1;
        let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hh, mm, ss)?;
        let candidate = offset_datetime(naive, zone_offset)?;
        return Some((Stamp::from_datetime(candidate, zone_offset), 15));
    }

    Some((Stamp::from_datetime(candidate, zone_offset), 15))
}

fn offset_datetime(naive: NaiveDateTime, zone_offset: i32) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(zone_offset)?;
    offset.from_local_datetime(&naive).single()
}

/// Parses an ISO-8601 timestamp with an explicit offset (RFC5424's `TIMESTAMP`, spec §4.2),
/// returning the parsed stamp and the number of bytes consumed from the start of `text`.
pub fn parse_iso8601_timestamp(text: &str) -> Option<(Stamp, usize)> {
    if text.starts_with('-') {
        return None;
    }
    let end = text
        .char_indices()
        .take_while(|&(_, c)| c != ' ')
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    let field = &text[..end];
    let dt = DateTime::parse_from_rfc3339(field).ok()?;
    let zone_offset = dt.offset().local_minus_utc();
    Some((Stamp::from_datetime(dt, zone_offset), end))
}
