// SPDX-License-Identifier: Apache-2.0

//! Multi-line framing: indentation-continuation and regex-anchored variants (spec §4.3).

use super::{fill_buffer, Framer, ReadOutcome};
use regex::Regex;
use std::io::Read;

/// A message is the first line plus any following lines beginning with whitespace.
pub struct IndentedMultilineFramer {
    buffer: Vec<u8>,
    buffer_start: u64,
}

impl IndentedMultilineFramer {
    pub fn new() -> Self {
        IndentedMultilineFramer {
            buffer: Vec::new(),
            buffer_start: 0,
        }
    }

    /// The end (exclusive) of the first line in `buffer` that is followed by a line NOT starting
    /// with whitespace, or `None` if every line currently buffered could still grow a
    /// continuation (i.e. we haven't seen the start of the next message yet).
    fn find_boundary(&self) -> Option<usize> {
        let mut line_start = 0;
        let mut last_line_end = None;
        while let Some(rel_nl) = self.buffer[line_start..].iter().position(|&b| b == b'\n') {
            let nl = line_start + rel_nl;
            if line_start == 0 {
                last_line_end = Some(nl);
            } else {
                let continues = matches!(self.buffer.get(line_start), Some(b' ') | Some(b'\t'));
                if !continues {
                    return last_line_end;
                }
                last_line_end = Some(nl);
            }
            line_start = nl + 1;
        }
        None
    }
}

impl Default for IndentedMultilineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer for IndentedMultilineFramer {
    fn read(&mut self, source: &mut dyn Read) -> ReadOutcome {
        loop {
            if let Some(end) = self.find_boundary() {
                let message: Vec<u8> = self.buffer.drain(..=end).collect();
                self.buffer_start += message.len() as u64;
                let mut message = message;
                message.pop();
                return ReadOutcome::Message(message);
            }

            match fill_buffer(source, &mut self.buffer) {
                Ok(0) => {
                    if self.buffer.is_empty() {
                        return ReadOutcome::Eof;
                    }
                    return ReadOutcome::Partial;
                }
                Ok(_) => continue,
                Err(err) => return ReadOutcome::Error(err.to_string()),
            }
        }
    }

    fn save_state(&self) -> u64 {
        self.buffer_start
    }

    fn restore_state(&mut self, cursor: u64) {
        self.buffer_start = cursor;
    }
}

/// The two `regex-multiline` sub-modes (spec §4.3).
pub enum RegexMultilineMode {
    /// A new message starts when `prefix` matches; lines matching `garbage` are discarded
    /// entirely rather than appended to the current message.
    PrefixGarbage { prefix: Regex, garbage: Regex },
    /// A message spans from a line matching `prefix` through the next line matching `suffix`,
    /// inclusive.
    PrefixSuffix { prefix: Regex, suffix: Regex },
}

/// Regex-anchored multi-line framing (spec §4.3 "regex-multiline").
pub struct RegexMultilineFramer {
    mode: RegexMultilineMode,
    buffer: Vec<u8>,
    buffer_start: u64,
}

impl RegexMultilineFramer {
    pub fn new(mode: RegexMultilineMode) -> Self {
        RegexMultilineFramer {
            mode,
            buffer: Vec::new(),
            buffer_start: 0,
        }
    }

    fn lines(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let mut start = 0;
        std::iter::from_fn(move || {
            if start > self.buffer.len() {
                return None;
            }
            let rel = self.buffer[start..].iter().position(|&b| b == b'\n')?;
            let end = start + rel;
            let result = (start, end);
            start = end + 1;
            Some(result)
        })
    }

    fn as_str(&self, range: (usize, usize)) -> &str {
        std::str::from_utf8(&self.buffer[range.0..range.1]).unwrap_or("")
    }
}

impl Framer for RegexMultilineFramer {
    fn read(&mut self, source: &mut dyn Read) -> ReadOutcome {
        loop {
            match &self.mode {
                RegexMultilineMode::PrefixGarbage { prefix, garbage } => {
                    let lines: Vec<(usize, usize)> = self.lines().collect();
                    let mut message_end = None;
                    let mut first_is_prefix = false;
                    for (i, &range) in lines.iter().enumerate() {
                        let text = self.as_str(range);
                        if i == 0 {
                            first_is_prefix = prefix.is_match(text);
                        } else if prefix.is_match(text) || garbage.is_match(text) {
                            message_end = Some(lines[i - 1].1);
                            break;
                        }
                    }
                    if let Some(end) = message_end {
                        let raw: Vec<u8> = self.buffer.drain(..=end).collect();
                        self.buffer_start += raw.len() as u64;
                        if !first_is_prefix {
                            // Leading garbage before the first prefix line: drop and retry.
                            continue;
                        }
                        let mut text = raw;
                        text.pop();
                        return ReadOutcome::Message(text);
                    }
                }
                RegexMultilineMode::PrefixSuffix { prefix, suffix } => {
                    let lines: Vec<(usize, usize)> = self.lines().collect();
                    if let Some(first) = lines.first() {
                        if !prefix.is_match(self.as_str(*first)) {
                            let drop_end = first.1;
                            self.buffer.drain(..=drop_end);
                            self.buffer_start += (drop_end + 1) as u64;
                            continue;
                        }
                        for (i, &range) in lines.iter().enumerate().skip(1) {
                            if suffix.is_match(self.as_str(range)) {
                                let end = range.1;
                                let raw: Vec<u8> = self.buffer.drain(..=end).collect();
                                self.buffer_start += raw.len() as u64;
                                let mut text = raw;
                                text.pop();
                                return ReadOutcome::Message(text);
                            }
                            let _ = i;
                        }
                    }
                }
            }

            match fill_buffer(source, &mut self.buffer) {
                Ok(0) => {
                    if self.buffer.is_empty() {
                        return ReadOutcome::Eof;
                    }
                    return ReadOutcome::Partial;
                }
                Ok(_) => continue,
                Err(err) => return ReadOutcome::Error(err.to_string()),
            }
        }
    }

    fn save_state(&self) -> u64 {
        self.buffer_start
    }

    fn restore_state(&mut self, cursor: u64) {
        self.buffer_start = cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn indented_continuation_lines_join_the_first_line() {
        let mut framer = IndentedMultilineFramer::new();
        let mut source = Cursor::new(b"first\n continuation\nnext\n".to_vec());
        assert_eq!(
            framer.read(&mut source),
            ReadOutcome::Message(b"first\n continuation".to_vec())
        );
        assert_eq!(framer.read(&mut source), ReadOutcome::Partial);
    }

    #[test]
    fn prefix_garbage_drops_garbage_lines() {
        let prefix = Regex::new(r"^\d{4}-").unwrap();
        let garbage = Regex::new(r"^GARBAGE").unwrap();
        let mut framer = RegexMultilineFramer::new(RegexMultilineMode::PrefixGarbage {
            prefix,
            garbage,
        });
        let mut source = Cursor::new(b"2024-01 start\ncontinued\nGARBAGE noise\n2024-02 next\n".to_vec());
        assert_eq!(
            framer.read(&mut source),
            ReadOutcome::Message(b"2024-01 start\ncontinued".to_vec())
        );
    }

    #[test]
    fn prefix_suffix_spans_inclusive() {
        let prefix = Regex::new(r"^BEGIN").unwrap();
        let suffix = Regex::new(r"^END").unwrap();
        let mut framer =
            RegexMultilineFramer::new(RegexMultilineMode::PrefixSuffix { prefix, suffix });
        let mut source = Cursor::new(b"BEGIN\nmiddle\nEND\n".to_vec());
        assert_eq!(
            framer.read(&mut source),
            ReadOutcome::Message(b"BEGIN\nmiddle\nEND".to_vec())
        );
    }
}
