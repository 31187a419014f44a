// SPDX-License-Identifier: Apache-2.0

//! Fixed-size, NUL-padded record framing (spec §4.3 "padded records").

use super::{fill_buffer, Framer, ReadOutcome};
use std::io::Read;

/// Reads fixed-size `record_size`-byte records, trimming trailing `\0` padding from each one.
pub struct PaddedRecordFramer {
    buffer: Vec<u8>,
    buffer_start: u64,
    record_size: usize,
}

impl PaddedRecordFramer {
    pub fn new(record_size: usize) -> Self {
        assert!(record_size > 0, "pad-size must be positive");
        PaddedRecordFramer {
            buffer: Vec::new(),
            buffer_start: 0,
            record_size,
        }
    }
}

impl Framer for PaddedRecordFramer {
    fn read(&mut self, source: &mut dyn Read) -> ReadOutcome {
        if self.buffer.len() >= self.record_size {
            return self.extract_record();
        }

        match fill_buffer(source, &mut self.buffer) {
            Ok(0) => {
                if self.buffer.is_empty() {
                    ReadOutcome::Eof
                } else {
                    ReadOutcome::Partial
                }
            }
            Ok(_) if self.buffer.len() >= self.record_size => self.extract_record(),
            Ok(_) => ReadOutcome::Partial,
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

impl PaddedRecordFramer {
    fn extract_record(&mut self) -> ReadOutcome {
        let record: Vec<u8> = self.buffer.drain(..self.record_size).collect();
        self.buffer_start += self.record_size as u64;
        let trimmed_len = record.iter().position(|&b| b == 0).unwrap_or(record.len());
        ReadOutcome::Message(record[..trimmed_len].to_vec())
    }
}
