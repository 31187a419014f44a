// SPDX-License-Identifier: Apache-2.0

//! One message per `read` from an unreliable, already-framed transport (spec §4.3 "datagram") —
//! e.g. UDP syslog, where the transport itself delivers one packet per read and reads are never
//! combined into a larger buffer.

use super::{Framer, ReadOutcome};
use std::io::Read;

pub struct DatagramFramer {
    max_message_len: usize,
    reads: u64,
}

impl DatagramFramer {
    pub fn new(max_message_len: usize) -> Self {
        DatagramFramer {
            max_message_len,
            reads: 0,
        }
    }
}

impl Framer for DatagramFramer {
    fn read(&mut self, source: &mut dyn Read) -> ReadOutcome {
        let mut buf = vec![0u8; self.max_message_len.max(1)];
        match source.read(&mut buf) {
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => {
                self.reads += 1;
                buf.truncate(n);
                ReadOutcome::Message(buf)
            }
            Err(err) => ReadOutcome::Error(err.to_string()),
        }
    }

    fn save_state(&self) -> u64 {
        self.reads
    }

    fn restore_state(&mut self, cursor: u64) {
        self.reads = cursor;
    }
}
