// SPDX-License-Identifier: Apache-2.0

//! RFC5424 structured-data syslog parsing (spec §4.2), grounded on
//! `original_source/modules/syslogformat/syslog-format.c`'s `log_msg_parse_syslog_proto` and
//! `log_msg_parse_sd`.

use super::common::{parse_hostname, parse_pri};
use super::timestamp::parse_iso8601_timestamp;
use super::ParseOptions;
use crate::message::{Flags, Message};
use crate::nvtable;
use chrono::{DateTime, Utc};
use logpipe_common::interner::Handle;

const BOM: &[u8] = b"\xEF\xBB\xBF";

fn skip_one_space(data: &[u8]) -> Option<&[u8]> {
    if data.first() == Some(&b' ') {
        Some(&data[1..])
    } else {
        None
    }
}

/// `VERSION`: digits up to (not including) the next space; must equal `1` (spec §4.2).
fn parse_version(data: &[u8]) -> Option<&[u8]> {
    let end = data.iter().position(|&b| b == b' ')?;
    let digits = &data[..end];
    if digits == b"1" {
        Some(&data[end..])
    } else {
        None
    }
}

/// APP-NAME/PROCID/MSGID: a field up to the next space, `-` meaning nil (absent), truncated to
/// `max_len` (spec §4.2 "Fields of width 48/128/32 ... are truncated, and `-` denotes nil").
fn parse_column<'a>(message: &Message, handle: Handle, data: &'a [u8], max_len: usize) -> Option<&'a [u8]> {
    let end = data.iter().position(|&b| b == b' ')?;
    let field = &data[..end];
    if field.len() > 1 || field.first() != Some(&b'-') {
        let len = field.len().min(max_len);
        message.set_value(handle, &field[..len]);
    }
    Some(&data[end..])
}

/// One ASCII-printable byte valid inside an SD-ID or PARAM-NAME, excluding `=`, space, `]`, `"`
/// (spec §4.2 structured-data grammar).
fn is_sd_name_char(byte: u8) -> bool {
    byte.is_ascii_graphic() && !matches!(byte, b'=' | b']' | b'"')
}

/// Reads up to 32 bytes of `is_sd_name_char` content, stopping at the first non-matching byte.
/// Returns `None` if the run is empty or exceeds 32 bytes before hitting a terminator (spec
/// §4.2: "exceeding 32 is a parse error").
fn read_sd_name<'a>(data: &'a [u8]) -> Option<(&'a str, &'a [u8])> {
    let mut end = 0;
    while end < data.len() && is_sd_name_char(data[end]) {
        end += 1;
        if end > 32 {
            return None;
        }
    }
    if end == 0 {
        return None;
    }
    let name = std::str::from_utf8(&data[..end]).ok()?;
    Some((name, &data[end..]))
}

/// Unescapes a PARAM-VALUE body (spec §4.2: `\"`, `\\`, `\]` are escape sequences; an
/// unescaped closing `]` is a parse error handled by the caller via the quote scan).
fn unescape_param_value(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() && matches!(raw[i + 1], b'"' | b'\\' | b']') {
            out.push(raw[i + 1]);
            i += 2;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    out
}

/// One `SD-PARAM`: `PARAM-NAME "=" DQUOTE PARAM-VALUE DQUOTE`.
fn parse_sd_param<'a>(
    message: &Message,
    sd_id: &str,
    data: &'a [u8],
    max_value_len: usize,
) -> Option<&'a [u8]> {
    let (param_name, rest) = read_sd_name(data)?;
    let rest = rest.strip_prefix(b"=")?;
    let rest = rest.strip_prefix(b"\"")?;

    let mut i = 0;
    loop {
        match rest.get(i) {
            None => return None,
            Some(b'"') => break,
            Some(b'\\') => i += 2,
            Some(_) => i += 1,
        }
    }
    let raw_value = &rest[..i.min(rest.len())];
    if raw_value.len() != i {
        return None;
    }
    let value = unescape_param_value(raw_value);
    let truncated = &value[..value.len().min(max_value_len)];

    let handle = nvtable::intern_key(&nvtable::sdata_key(sd_id, param_name));
    message.set_value(handle, truncated);

    Some(&rest[i + 1..])
}

/// `STRUCTURED-DATA = NILVALUE / 1*SD-ELEMENT` (spec §4.2).
fn parse_structured_data<'a>(message: &Message, data: &'a [u8], options: &ParseOptions) -> Option<&'a [u8]> {
    if data.first() == Some(&b'-') {
        return Some(&data[1..]);
    }
    if data.first() != Some(&b'[') {
        return None;
    }

    let mut rest = data;
    while rest.first() == Some(&b'[') {
        rest = &rest[1..];
        let (sd_id, after_id) = read_sd_name(rest)?;
        rest = after_id;

        if rest.first() == Some(&b']') {
            let handle = nvtable::intern_key(&nvtable::sdata_element_key(sd_id));
            message.set_value(handle, b"");
            rest = &rest[1..];
        } else {
            while rest.first() == Some(&b' ') {
                rest = &rest[1..];
                rest = parse_sd_param(message, sd_id, rest, options.sdata_param_value_max)?;
            }
            rest = rest.strip_prefix(b"]")?;
        }
    }
    Some(rest)
}

/// Parses the APP-NAME/PROCID/MSGID/STRUCTURED-DATA/MSG tail once PRI, VERSION, TIMESTAMP and
/// HOSTNAME have already been consumed. Lives in its own `Option`-returning function so the
/// header-field chain can use `?` before `parse` converts the final result to `bool`.
fn parse_tail(message: &Message, rest: &[u8], options: &ParseOptions) -> Option<()> {
    let rest = parse_column(message, nvtable::program_key(), rest, 48)?;
    let rest = skip_one_space(rest)?;
    let rest = parse_column(message, nvtable::pid_key(), rest, 128)?;
    let rest = skip_one_space(rest)?;
    let rest = parse_column(message, nvtable::msgid_key(), rest, 32)?;
    let rest = skip_one_space(rest)?;

    let rest = parse_structured_data(message, rest, options)?;
    if rest.is_empty() {
        return Some(());
    }
    let rest = skip_one_space(rest)?;

    let rest = if rest.starts_with(BOM) {
        message.set_flag(Flags::UTF8);
        &rest[BOM.len()..]
    } else {
        if options.validate_utf8 && std::str::from_utf8(rest).is_ok() {
            message.set_flag(Flags::UTF8);
        }
        rest
    };
    message.set_value(nvtable::message_key(), rest);
    Some(())
}

/// Parses `data` as an RFC5424 structured message into `message`. Returns `false` on any grammar
/// violation, letting the caller fall back to legacy parsing (spec §4.2 "Auto-falls-back").
pub(super) fn parse(
    message: &Message,
    data: &[u8],
    options: &ParseOptions,
    _recv_time: DateTime<Utc>,
) -> bool {
    let (priority, rest) = match parse_pri(data, options.default_priority) {
        Some(result) => result,
        None => return false,
    };
    let rest = match parse_version(rest) {
        Some(rest) => rest,
        None => return false,
    };
    message.set_priority(priority);

    let rest = match skip_one_space(rest) {
        Some(rest) => rest,
        None => return false,
    };

    let timestamp_text = match std::str::from_utf8(rest) {
        Ok(text) => text,
        Err(_) => return false,
    };
    let (stamp, consumed) = match parse_iso8601_timestamp(timestamp_text) {
        Some(result) => result,
        None => return false,
    };
    message.set_stamp(stamp);
    let rest = &rest[consumed..];

    let rest = match skip_one_space(rest) {
        Some(rest) => rest,
        None => return false,
    };

    let (hostname, rest) = match parse_hostname(rest, false, None) {
        Some((host, rest)) => (Some(host), rest),
        None => (None, rest),
    };
    let rest = match skip_one_space(rest) {
        Some(rest) => rest,
        None => return false,
    };
    if let Some(host) = hostname {
        if host != "-" {
            message.set_value(nvtable::host_key(), host.as_bytes());
        }
    }

    parse_tail(message, rest, options).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn recv_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2003, 10, 12, 0, 0, 0).unwrap()
    }

    fn options() -> ParseOptions {
        ParseOptions {
            syslog_protocol: true,
            ..Default::default()
        }
    }

    #[test]
    fn scenario_2_structured_data_and_bom() {
        let message = Message::new_empty();
        let data = b"<165>1 2003-10-11T22:14:15.003Z mymachine.example.com evntslog - ID47 [exampleSDID@0 iut=\"3\" eventSource=\"Application\" eventID=\"1011\"] \xEF\xBB\xBFAn application event log entry";
        assert!(parse(&message, data, &options(), recv_time()));

        assert_eq!(message.priority(), 165);
        assert_eq!(
            message.get_value(nvtable::host_key()),
            b"mymachine.example.com".to_vec()
        );
        assert_eq!(message.get_value(nvtable::program_key()), b"evntslog".to_vec());
        assert!(!message.has_value(nvtable::pid_key()));
        assert_eq!(message.get_value(nvtable::msgid_key()), b"ID47".to_vec());

        let iut = nvtable::intern_key(&nvtable::sdata_key("exampleSDID@0", "iut"));
        assert_eq!(message.get_value(iut), b"3".to_vec());
        let event_source = nvtable::intern_key(&nvtable::sdata_key("exampleSDID@0", "eventSource"));
        assert_eq!(message.get_value(event_source), b"Application".to_vec());
        let event_id = nvtable::intern_key(&nvtable::sdata_key("exampleSDID@0", "eventID"));
        assert_eq!(message.get_value(event_id), b"1011".to_vec());

        assert_eq!(
            message.get_value(nvtable::message_key()),
            b"An application event log entry".to_vec()
        );
        assert!(message.has_flag(Flags::UTF8));
    }

    #[test]
    fn scenario_6_structured_data_escaping() {
        let message = Message::new_empty();
        let data = br#"<1>1 2003-10-11T22:14:15Z h a p m [x@1 v="a\"b\]c"]"#;
        assert!(parse(&message, data, &options(), recv_time()));
        let handle = nvtable::intern_key(&nvtable::sdata_key("x@1", "v"));
        assert_eq!(message.get_value(handle), b"a\"b]c".to_vec());
    }

    #[test]
    fn malformed_structured_data_fails_and_falls_back() {
        let message = Message::new_empty();
        let data = b"<1>1 2003-10-11T22:14:15Z h a p m [bad";
        assert!(!parse(&message, data, &options(), recv_time()));
    }

    #[test]
    fn nil_structured_data_is_accepted() {
        let message = Message::new_empty();
        let data = b"<13>1 2003-10-11T22:14:15Z host app - - - hello world";
        assert!(parse(&message, data, &options(), recv_time()));
        assert_eq!(message.get_value(nvtable::message_key()), b"hello world".to_vec());
    }

    #[test]
    fn standalone_sd_element_with_no_params_records_empty_value() {
        let message = Message::new_empty();
        let data = b"<13>1 2003-10-11T22:14:15Z host app - - [empty]";
        assert!(parse(&message, data, &options(), recv_time()));
        let handle = nvtable::intern_key(&nvtable::sdata_element_key("empty"));
        assert_eq!(message.get_value(handle), Vec::<u8>::new());
    }

    #[test]
    fn version_other_than_1_fails() {
        let message = Message::new_empty();
        assert!(!parse(&message, b"<1>2 rest", &options(), recv_time()));
    }
}
