// SPDX-License-Identifier: Apache-2.0

//! LogProto: boundary-finding over a byte stream (spec §4.3).
//!
//! Every variant below implements [`Framer`], polymorphic over the capability set
//! {read-one-message, write-one-message, restart-with-state}. This crate implements the read
//! side; writing framed output to a destination is a concern of the destination driver, not the
//! framer.

mod datagram;
mod kmsg;
mod multiline;
mod padded;
mod text;

pub use datagram::DatagramFramer;
pub use kmsg::KmsgFramer;
pub use multiline::{IndentedMultilineFramer, RegexMultilineFramer, RegexMultilineMode};
pub use padded::PaddedRecordFramer;
pub use text::TextFramer;

use std::io::Read;

/// One `read` outcome (spec §4.3 contract: `read(buf) → (msg_bytes | partial | eof | error)`).
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One complete message payload was produced.
    Message(Vec<u8>),
    /// Not enough bytes buffered yet for a complete message; the caller should read more input
    /// and call `read` again.
    Partial,
    /// The underlying transport reached end-of-stream with no more complete messages pending.
    Eof,
    /// A framing-level error (e.g. a record exceeding a configured maximum length).
    Error(String),
}

/// The framer contract (spec §4.3): boundary-finding plus position persistence for restart.
pub trait Framer: Send {
    /// Reads as many bytes as are available from `source` into the framer's internal buffer,
    /// then attempts to extract one complete message.
    fn read(&mut self, source: &mut dyn Read) -> ReadOutcome;

    /// The byte offset of the last *fully consumed* message boundary — not the last byte read
    /// (spec §4.3: "resumes at the byte position last fully consumed (not last read)").
    fn save_state(&self) -> u64;

    /// Restores a previously-saved cursor, e.g. after a reopen of the same file inode.
    fn restore_state(&mut self, cursor: u64);
}

/// Appends newly-read bytes from `source` into `buf`, returning the number of bytes appended.
/// Shared by the byte-oriented framers ([`TextFramer`], [`PaddedRecordFramer`],
/// multi-line framers) which all buffer across `read` calls; [`kmsg::KmsgFramer`] and the
/// datagram framer instead take one `read` call as one message and don't use this helper.
pub(crate) fn fill_buffer(source: &mut dyn Read, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    let mut chunk = [0u8; 4096];
    let n = source.read(&mut chunk)?;
    buf.extend_from_slice(&chunk[..n]);
    Ok(n)
}
