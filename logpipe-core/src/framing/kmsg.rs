// SPDX-License-Identifier: Apache-2.0

//! Specialised framing for kernel ring buffers: `/proc/kmsg` and `/dev/kmsg` (spec §4.3).
//!
//! Like the datagram framer, one `read` call is one record — kmsg transports never combine
//! reads. Each record has the form `<priority>,sequence,timestamp,flags;message text`; the
//! prefix up to the first unescaped `;` is metadata, not part of the payload.

use super::{Framer, ReadOutcome};
use std::io::Read;

pub struct KmsgFramer {
    buffer_start: u64,
}

impl KmsgFramer {
    pub fn new() -> Self {
        KmsgFramer { buffer_start: 0 }
    }
}

impl Default for KmsgFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer for KmsgFramer {
    fn read(&mut self, source: &mut dyn Read) -> ReadOutcome {
        let mut chunk = [0u8; 8192];
        match source.read(&mut chunk) {
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => {
                self.buffer_start += n as u64;
                let record = &chunk[..n];
                let payload = match record.iter().position(|&b| b == b';') {
                    Some(pos) => &record[pos + 1..],
                    None => record,
                };
                let payload = payload.strip_suffix(b"\n").unwrap_or(payload);
                ReadOutcome::Message(payload.to_vec())
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn strips_kmsg_metadata_prefix() {
        let mut framer = KmsgFramer::new();
        let mut source = Cursor::new(b"6,1234,98765,-;kernel: something happened\n".to_vec());
        assert_eq!(
            framer.read(&mut source),
            ReadOutcome::Message(b"kernel: something happened".to_vec())
        );
    }

    #[test]
    fn one_read_is_one_record_never_combined() {
        let mut framer = KmsgFramer::new();
        let mut source = Cursor::new(b"6,1,0,-;first\n".to_vec());
        assert_eq!(framer.read(&mut source), ReadOutcome::Message(b"first".to_vec()));
    }

    #[test]
    fn missing_semicolon_passes_record_through() {
        let mut framer = KmsgFramer::new();
        let mut source = Cursor::new(b"no metadata here\n".to_vec());
        assert_eq!(
            framer.read(&mut source),
            ReadOutcome::Message(b"no metadata here".to_vec())
        );
    }
}
