// SPDX-License-Identifier: Apache-2.0

//! Header-parsing primitives shared by the legacy (RFC3164) and structured (RFC5424) branches
//! (spec §4.2), grounded on `original_source/modules/syslogformat/syslog-format.c`'s
//! `log_msg_parse_pri` and `log_msg_parse_hostname`.

use regex::Regex;

/// `<PRI>` (spec §4.2 step 1). Non-digit bytes inside the brackets fail the whole PRI prefix
/// (and therefore the caller falls back to the configured default facility/severity per
/// SPEC_FULL's supplement to spec.md §4.2 step 1); a missing `<...>` prefix is not an error, it
/// just yields `default_priority` unchanged.
///
/// Returns the remaining bytes after the prefix (if any) was consumed, and `None` if the
/// brackets were malformed.
pub(super) fn parse_pri<'a>(data: &'a [u8], default_priority: u8) -> Option<(u8, &'a [u8])> {
    if data.first() != Some(&b'<') {
        return Some((default_priority, data));
    }
    let rest = &data[1..];
    let close = rest.iter().position(|&b| b == b'>')?;
    let digits = &rest[..close];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value: u32 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some((value as u8, &rest[close + 1..]))
}

/// Characters a hostname may contain when `check-hostname` is set (spec §4.2 step 6):
/// `[A-Za-z0-9._:@/-]`.
fn is_valid_hostname_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b':' | b'@' | b'/')
}

/// Tentatively parses a hostname token at the front of `data`: a run up to the next space,
/// stopping early at an invalid character when `check_hostname` is set. The token is accepted as
/// a hostname only if it is immediately followed by a space and (when supplied) does not match
/// `bad_hostname` (spec §4.2 step 6). On rejection, returns `None` and leaves `data` untouched
/// for the caller to retry as a program name.
pub(super) fn parse_hostname<'a>(
    data: &'a [u8],
    check_hostname: bool,
    bad_hostname: Option<&Regex>,
) -> Option<(&'a str, &'a [u8])> {
    let mut end = 0;
    while end < data.len() && data[end] != b' ' && data[end] != b':' && data[end] != b'[' {
        if check_hostname && !is_valid_hostname_char(data[end]) {
            break;
        }
        end += 1;
    }
    if end == 0 || data.get(end) != Some(&b' ') {
        return None;
    }
    let candidate = std::str::from_utf8(&data[..end]).ok()?;
    if let Some(bad) = bad_hostname {
        if bad.is_match(candidate) {
            return None;
        }
    }
    Some((candidate, &data[end..]))
}
