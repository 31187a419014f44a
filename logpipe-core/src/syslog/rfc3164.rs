// SPDX-License-Identifier: Apache-2.0

//! RFC3164 legacy syslog header parsing (spec §4.2), grounded on
//! `original_source/modules/syslogformat/syslog-format.c`'s `log_msg_parse_legacy`.

use super::common::{parse_hostname, parse_pri};
use super::timestamp::{parse_bsd_timestamp, parse_iso8601_timestamp};
use super::ParseOptions;
use crate::message::{Flags, Message};
use crate::nvtable;
use chrono::{DateTime, Utc};

const AIX_FWD_PREFIX: &[u8] = b"Message forwarded from ";
const REPEAT_MSG_PREFIX: &[u8] = b"last message repeated";

/// `digits:` followed by a space (spec §4.2 step 2), captured into
/// `.SDATA.meta.sequenceId` and consumed (including the trailing space) on success.
fn parse_cisco_sequence<'a>(message: &Message, data: &'a [u8]) -> &'a [u8] {
    let digits_end = match data.iter().position(|&b| b == b':') {
        Some(pos) if pos > 0 && data[..pos].iter().all(u8::is_ascii_digit) => pos,
        _ => return data,
    };
    if data.get(digits_end + 1) != Some(&b' ') {
        return data;
    }
    let handle = nvtable::intern_key(&nvtable::sdata_key("meta", "sequenceId"));
    message.set_value(handle, &data[..digits_end]);
    &data[digits_end + 2..]
}

fn skip_spaces(data: &[u8]) -> &[u8] {
    let end = data.iter().position(|&b| b != b' ').unwrap_or(data.len());
    &data[end..]
}

/// Token up to ` `, `[`, or `:`; optional `[pid]`; trailing `:` and a single space consumed
/// (spec §4.2 step 7).
fn parse_program_name<'a>(message: &Message, data: &'a [u8], store_header: bool) -> &'a [u8] {
    let header_start = data;
    let prog_end = data
        .iter()
        .position(|&b| b == b' ' || b == b'[' || b == b':')
        .unwrap_or(data.len());
    message.set_value(nvtable::program_key(), &data[..prog_end]);
    let mut rest = &data[prog_end..];

    if rest.first() == Some(&b'[') {
        let pid_start = &rest[1..];
        let pid_end = pid_start
            .iter()
            .position(|&b| b == b' ' || b == b']' || b == b':')
            .unwrap_or(pid_start.len());
        message.set_value(nvtable::pid_key(), &pid_start[..pid_end]);
        rest = &pid_start[pid_end..];
        if rest.first() == Some(&b']') {
            rest = &rest[1..];
        }
    }
    if rest.first() == Some(&b':') {
        rest = &rest[1..];
    }
    if rest.first() == Some(&b' ') {
        rest = &rest[1..];
    }

    if store_header {
        let consumed = header_start.len() - rest.len();
        message.set_value(nvtable::legacy_msghdr_key(), &header_start[..consumed]);
        message.set_flag(Flags::LEGACY_MSGHDR);
    }
    rest
}

fn finish_message(message: &Message, residual: &[u8], options: &ParseOptions) {
    message.set_value(nvtable::message_key(), residual);
    if options.validate_utf8 && std::str::from_utf8(residual).is_ok() {
        message.set_flag(Flags::UTF8);
    }
}

/// Parses `data` as an RFC3164 legacy message into `message`, returning `false` only when the
/// PRI prefix is malformed (spec §4.2 step 1) — every other branch degrades gracefully per the
/// original parser's "no timestamp" / "no hostname" fallbacks.
pub(super) fn parse(
    message: &Message,
    data: &[u8],
    options: &ParseOptions,
    recv_time: DateTime<Utc>,
) -> bool {
    let (priority, rest) = match parse_pri(data, options.default_priority) {
        Some(result) => result,
        None => return false,
    };
    message.set_priority(priority);

    let rest = parse_cisco_sequence(message, rest);
    let rest = skip_spaces(rest);

    let timestamp_text = match std::str::from_utf8(rest) {
        Ok(text) => text,
        Err(_) => "",
    };
    let timestamp = parse_bsd_timestamp(timestamp_text, recv_time, options.recv_zone_offset)
        .or_else(|| parse_iso8601_timestamp(timestamp_text));

    let rest = match timestamp {
        Some((stamp, consumed)) => {
            message.set_stamp(stamp);
            let rest = &rest[consumed..];
            let rest = skip_spaces(rest);

            let mut hostname_start: Option<&[u8]> = None;
            let mut rest = rest;

            if rest.len() >= AIX_FWD_PREFIX.len() && &rest[..AIX_FWD_PREFIX.len()] == AIX_FWD_PREFIX {
                let after_prefix = &rest[AIX_FWD_PREFIX.len()..];
                let host_end = after_prefix
                    .iter()
                    .position(|&b| b == b':')
                    .unwrap_or(after_prefix.len());
                hostname_start = Some(&after_prefix[..host_end]);
                let after_host = &after_prefix[host_end..];
                let trimmed = after_host
                    .iter()
                    .position(|&b| b != b' ' && b != b':')
                    .unwrap_or(after_host.len());
                rest = &after_host[trimmed..];
            }

            if rest.len() >= REPEAT_MSG_PREFIX.len() && &rest[..REPEAT_MSG_PREFIX.len()] == REPEAT_MSG_PREFIX {
                // "last message repeated" short-circuits further header parsing (spec §4.2 step 5).
            } else {
                if hostname_start.is_none() && options.expect_hostname {
                    if let Some((host, after_host)) =
                        parse_hostname(rest, options.check_hostname, options.bad_hostname.as_ref())
                    {
                        hostname_start = Some(host.as_bytes());
                        rest = skip_spaces(after_host);
                    }
                }
                rest = parse_program_name(message, rest, options.store_legacy_msghdr);
            }

            if let Some(host) = hostname_start {
                message.set_value(nvtable::host_key(), host);
            }
            rest
        }
        None => {
            // No-timestamp branch (spec §4.2 step 3): STAMP becomes RECVD and parsing continues
            // straight at the program-name token (spec scenario 3).
            message.set_stamp(message.recvd());
            parse_program_name(message, rest, options.store_legacy_msghdr)
        }
    };

    finish_message(message, rest, options);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn recv_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2003, 10, 12, 0, 0, 0).unwrap()
    }

    fn parse_with(data: &[u8], options: &ParseOptions) -> Message {
        let message = Message::new_empty();
        assert!(parse(&message, data, options, recv_time()));
        message
    }

    #[test]
    fn scenario_1_full_legacy_header() {
        let message = parse_with(
            b"<34>Oct 11 22:14:15 mymachine su: 'su root' failed for lonvick on /dev/pts/8",
            &ParseOptions::default(),
        );
        assert_eq!(message.priority(), 34);
        assert_eq!(message.get_value(nvtable::host_key()), b"mymachine".to_vec());
        assert_eq!(message.get_value(nvtable::program_key()), b"su".to_vec());
        assert_eq!(
            message.get_value(nvtable::message_key()),
            b"'su root' failed for lonvick on /dev/pts/8".to_vec()
        );
    }

    #[test]
    fn scenario_3_no_priority_no_timestamp() {
        let options = ParseOptions {
            expect_hostname: false,
            ..Default::default()
        };
        let message = parse_with(b"foo bar baz", &options);
        assert_eq!(message.priority(), options.default_priority);
        assert_eq!(message.get_value(nvtable::program_key()), b"foo".to_vec());
        assert_eq!(message.get_value(nvtable::message_key()), b"bar baz".to_vec());
        assert!(!message.has_tag("parse-error"));
    }

    #[test]
    fn pid_is_captured_from_brackets() {
        let message = parse_with(
            b"<13>Oct 11 22:14:15 host myprog[123]: hello",
            &ParseOptions::default(),
        );
        assert_eq!(message.get_value(nvtable::program_key()), b"myprog".to_vec());
        assert_eq!(message.get_value(nvtable::pid_key()), b"123".to_vec());
        assert_eq!(message.get_value(nvtable::message_key()), b"hello".to_vec());
    }

    #[test]
    fn aix_forwarded_prefix_captures_hostname() {
        let message = parse_with(
            b"<13>Oct 11 22:14:15 Message forwarded from relay.example: prog: hi",
            &ParseOptions::default(),
        );
        assert_eq!(
            message.get_value(nvtable::host_key()),
            b"relay.example".to_vec()
        );
        assert_eq!(message.get_value(nvtable::program_key()), b"prog".to_vec());
    }

    #[test]
    fn repeated_message_short_circuits_header_parsing() {
        let message = parse_with(
            b"<13>Oct 11 22:14:15 host last message repeated 5 times",
            &ParseOptions::default(),
        );
        assert!(!message.has_value(nvtable::program_key()));
        assert_eq!(
            message.get_value(nvtable::message_key()),
            b"last message repeated 5 times".to_vec()
        );
    }

    #[test]
    fn malformed_pri_brackets_fail_parse() {
        let message = Message::new_empty();
        let options = ParseOptions::default();
        assert!(!parse(&message, b"<3x4>rest", &options, recv_time()));
    }

    #[test]
    fn bad_hostname_regex_routes_token_to_program_name() {
        let options = ParseOptions {
            bad_hostname: Some(regex::Regex::new(r"^mymachine$").unwrap()),
            ..Default::default()
        };
        let message = parse_with(
            b"<34>Oct 11 22:14:15 mymachine su: hi",
            &options,
        );
        assert!(!message.has_value(nvtable::host_key()));
        assert_eq!(message.get_value(nvtable::program_key()), b"mymachine".to_vec());
    }

    #[test]
    fn store_legacy_msghdr_captures_raw_header() {
        let options = ParseOptions {
            store_legacy_msghdr: true,
            ..Default::default()
        };
        let message = parse_with(b"<13>Oct 11 22:14:15 host prog: hi", &options);
        assert!(message.has_flag(Flags::LEGACY_MSGHDR));
        assert_eq!(
            message.get_value(nvtable::legacy_msghdr_key()),
            b"host prog: ".to_vec()
        );
    }
}
