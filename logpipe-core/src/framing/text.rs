// SPDX-License-Identifier: Apache-2.0

//! Newline-delimited, variable-length framing (spec §4.3 "text").

use super::{fill_buffer, Framer, ReadOutcome};
use std::io::Read;

/// Splits a byte stream on `\n` (a trailing `\r` is stripped). Tracks the byte offset of the
/// last fully-consumed message so `save_state`/`restore_state` can resume a reopened file at the
/// right position without re-emitting a partially-read trailing line (spec §4.3 restart
/// semantics, P-7).
pub struct TextFramer {
    buffer: Vec<u8>,
    /// Byte offset, in the underlying stream, of the start of `buffer`.
    buffer_start: u64,
    max_message_len: usize,
}

impl TextFramer {
    pub fn new(max_message_len: usize) -> Self {
        TextFramer {
            buffer: Vec::new(),
            buffer_start: 0,
            max_message_len,
        }
    }
}

impl Framer for TextFramer {
    fn read(&mut self, source: &mut dyn Read) -> ReadOutcome {
        if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            return self.extract_line(pos);
        }

        match fill_buffer(source, &mut self.buffer) {
            Ok(0) => {
                if self.buffer.is_empty() {
                    ReadOutcome::Eof
                } else {
                    ReadOutcome::Partial
                }
            }
            Ok(_) => match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => self.extract_line(pos),
                None if self.max_message_len > 0 && self.buffer.len() > self.max_message_len => {
                    ReadOutcome::Error("line exceeds max-message-length".to_string())
                }
                None => ReadOutcome::Partial,
            },
            Err(err) => ReadOutcome::Error(err.to_string()),
        }
    }

    fn save_state(&self) -> u64 {
        self.buffer_start
    }

    fn restore_state(&mut self, cursor: u64) {
        self.buffer_start = cursor;
    }
}

impl TextFramer {
    fn extract_line(&mut self, newline_pos: usize) -> ReadOutcome {
        let mut line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        line.pop(); // drop '\n'
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        self.buffer_start += (newline_pos + 1) as u64;
        ReadOutcome::Message(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn splits_on_newline() {
        let mut framer = TextFramer::new(0);
        let mut source = Cursor::new(b"first\nsecond\n".to_vec());
        assert_eq!(framer.read(&mut source), ReadOutcome::Message(b"first".to_vec()));
        assert_eq!(framer.read(&mut source), ReadOutcome::Message(b"second".to_vec()));
    }

    #[test]
    fn strips_trailing_cr() {
        let mut framer = TextFramer::new(0);
        let mut source = Cursor::new(b"crlf line\r\n".to_vec());
        assert_eq!(
            framer.read(&mut source),
            ReadOutcome::Message(b"crlf line".to_vec())
        );
    }

    #[test]
    fn incomplete_trailing_line_is_not_emitted_prematurely() {
        let mut framer = TextFramer::new(0);
        let mut source = Cursor::new(b"complete\nincomplete".to_vec());
        assert_eq!(
            framer.read(&mut source),
            ReadOutcome::Message(b"complete".to_vec())
        );
        assert_eq!(framer.read(&mut source), ReadOutcome::Partial);
    }

    #[test]
    fn save_and_restore_state_tracks_last_consumed_boundary() {
        let mut framer = TextFramer::new(0);
        let mut source = Cursor::new(b"one\ntwo\nthr".to_vec());
        framer.read(&mut source);
        framer.read(&mut source);
        let cursor = framer.save_state();
        assert_eq!(cursor, 8);

        let mut restored = TextFramer::new(0);
        restored.restore_state(cursor);
        assert_eq!(restored.save_state(), cursor);
    }

    #[test]
    fn empty_stream_is_eof() {
        let mut framer = TextFramer::new(0);
        let mut source = Cursor::new(Vec::new());
        assert_eq!(framer.read(&mut source), ReadOutcome::Eof);
    }
}
