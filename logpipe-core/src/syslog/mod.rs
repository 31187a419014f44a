// SPDX-License-Identifier: Apache-2.0

//! The syslog format parser (spec §4.2): RFC3164 (legacy) and RFC5424 (structured-data),
//! grounded on `original_source/modules/syslogformat/syslog-format.c`.
//!
//! The parser is pure over `(bytes, options, recv_time, zone_info)` (spec §4.2 "Determinism");
//! callers are responsible for supplying a deterministic `recv_time` if bit-identical replay is
//! required.

mod common;
mod rfc3164;
mod rfc5424;
mod timestamp;

use crate::message::{Flags, Message};
use crate::nvtable;
use chrono::{DateTime, Utc};
use regex::Regex;

/// Parser configuration (spec §6 "Configuration knobs (core only)" — the subset that affects
/// `4.2 Syslog Format Parser` directly).
pub struct ParseOptions {
    pub syslog_protocol: bool,
    pub default_priority: u8,
    pub validate_utf8: bool,
    pub assume_utf8: bool,
    pub no_multi_line: bool,
    pub expect_hostname: bool,
    pub check_hostname: bool,
    pub no_parse: bool,
    pub store_legacy_msghdr: bool,
    pub local: bool,
    pub bad_hostname: Option<Regex>,
    pub sdata_param_value_max: usize,
    pub recv_zone_offset: i32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            syslog_protocol: false,
            default_priority: (1 << 3) | 5, // facility=user(1), severity=notice(5)
            validate_utf8: false,
            assume_utf8: false,
            no_multi_line: false,
            expect_hostname: true,
            check_hostname: false,
            no_parse: false,
            store_legacy_msghdr: false,
            local: false,
            bad_hostname: None,
            sdata_param_value_max: 255,
            recv_zone_offset: 0,
        }
    }
}

/// Replaces embedded CR/LF in `MESSAGE` with spaces (spec §4.2 step 8, `no-multi-line`).
fn collapse_multiline(message: &Message) {
    let raw = message.get_value(nvtable::message_key());
    let mut changed = false;
    let collapsed: Vec<u8> = raw
        .iter()
        .map(|&b| {
            if b == b'\r' || b == b'\n' {
                changed = true;
                b' '
            } else {
                b
            }
        })
        .collect();
    if changed {
        message.set_value(nvtable::message_key(), &collapsed);
    }
}

/// Parses one syslog message (spec §4.2). Trailing `\n`/`\0` bytes are trimmed first, mirroring
/// `syslog_format_handler`'s framing-agnostic entry point.
pub fn parse(data: &[u8], options: &ParseOptions, recv_time: DateTime<Utc>) -> Message {
    let mut end = data.len();
    while end > 0 && (data[end - 1] == b'\n' || data[end - 1] == 0) {
        end -= 1;
    }
    let data = &data[..end];

    if options.no_parse {
        let message = Message::new(data);
        message.set_priority(options.default_priority);
        return message;
    }

    let message = Message::new_empty();
    if options.assume_utf8 {
        message.set_flag(Flags::UTF8);
    }
    if options.local {
        message.set_flag(Flags::LOCAL);
    }

    let success = if options.syslog_protocol {
        rfc5424::parse(&message, data, options, recv_time)
            || rfc3164::parse(&message, data, options, recv_time)
    } else {
        rfc3164::parse(&message, data, options, recv_time)
    };

    if !success {
        return Message::parse_error(data, options.default_priority);
    }

    if options.no_multi_line {
        collapse_multiline(&message);
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn recv_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2003, 10, 12, 0, 0, 0).unwrap()
    }

    #[test]
    fn no_parse_stores_raw_bytes_as_message() {
        let options = ParseOptions {
            no_parse: true,
            default_priority: 42,
            ..Default::default()
        };
        let message = parse(b"anything at all\n", &options, recv_time());
        assert_eq!(message.get_value(nvtable::message_key()), b"anything at all".to_vec());
        assert_eq!(message.priority(), 42);
        assert!(!message.has_tag("parse-error"));
    }

    #[test]
    fn legacy_message_parses_by_default() {
        let options = ParseOptions::default();
        let message = parse(b"<34>Oct 11 22:14:15 mymachine su: 'su root' failed", &options, recv_time());
        assert_eq!(message.get_value(nvtable::host_key()), b"mymachine".to_vec());
        assert_eq!(message.get_value(nvtable::program_key()), b"su".to_vec());
        assert_eq!(message.priority(), 34);
    }

    #[test]
    fn structured_data_message_falls_back_to_legacy_on_bad_pri() {
        let options = ParseOptions {
            syslog_protocol: true,
            ..Default::default()
        };
        let message = parse(b"notapri Oct 11 22:14:15 host prog: hi", &options, recv_time());
        assert!(!message.has_tag("parse-error"));
    }

    #[test]
    fn no_multi_line_collapses_embedded_newlines() {
        let options = ParseOptions {
            no_multi_line: true,
            ..Default::default()
        };
        let message = parse(b"<13>Oct 11 22:14:15 host prog: line one\nline two", &options, recv_time());
        let text = message.get_value(nvtable::message_key());
        assert!(!text.contains(&b'\n'));
    }
}
