// SPDX-License-Identifier: Apache-2.0

//! The structured in-memory log record (spec §3, §4.1) — the unit that flows through the pipe
//! graph from source to destination.

use crate::ack::AckChain;
use crate::nvtable::{self, NvTable};
use crate::stamp::Stamp;
use crate::tags::{parse_error_tag, TagSet};
use logpipe_common::interner::Handle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-message flags (spec §3), a plain bitset over `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u32);

impl Flags {
    /// `MESSAGE` (and other textual fields) are known-valid UTF-8.
    pub const UTF8: Flags = Flags(0b0001);
    /// Message originated locally (process-internal), not from the network.
    pub const LOCAL: Flags = Flags(0b0010);
    /// Message is an internally-generated diagnostic, not ingested input.
    pub const INTERNAL: Flags = Flags(0b0100);
    /// A legacy (non-structured) BSD-style header was present (`LEGACY_MSGHDR`).
    pub const LEGACY_MSGHDR: Flags = Flags(0b1000);

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u32) -> Self {
        Flags(bits & 0b1111)
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;
    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Process-wide monotonic counter backing each message's receipt-id (spec I-2: "unique within
/// a process lifetime").
static NEXT_RECEIPT_ID: AtomicU64 = AtomicU64::new(1);

fn next_receipt_id() -> u64 {
    NEXT_RECEIPT_ID.fetch_add(1, Ordering::Relaxed)
}

/// An opaque, driver-specific source address (spec §3: "optional, opaque"). Stored as bytes so
/// any transport (Unix socket peer, IP:port, file descriptor tag) can populate it without this
/// module knowing the transport's shape.
pub type SourceAddress = Arc<[u8]>;

/// One log event (spec §3). Reference-counted and copy-on-write: cloning via [`Message::clone`]
/// is a shallow `Arc` clone that shares the underlying [`NvTable`] and [`TagSet`] until the
/// first mutating call observes shared state, at which point `fork_if_shared` makes a private
/// copy (spec I-4, P-2).
#[derive(Clone)]
pub struct Message {
    inner: Arc<MessageInner>,
}

struct MessageInner {
    receipt_id: u64,
    priority: std::sync::atomic::AtomicU32,
    stamp: std::sync::Mutex<Stamp>,
    recvd: std::sync::Mutex<Stamp>,
    flags: std::sync::atomic::AtomicU32,
    values: std::sync::Mutex<NvTable>,
    tags: std::sync::Mutex<TagSet>,
    source_addr: std::sync::Mutex<Option<SourceAddress>>,
    ack: Arc<AckChain>,
}

impl Message {
    /// *new-empty()* — a Message with defaults, a fresh receipt-id, and RECVD stamped to now
    /// (spec §4.1).
    pub fn new_empty() -> Self {
        let recvd = Stamp::now(0);
        Message {
            inner: Arc::new(MessageInner {
                receipt_id: next_receipt_id(),
                priority: std::sync::atomic::AtomicU32::new(0),
                stamp: std::sync::Mutex::new(recvd),
                recvd: std::sync::Mutex::new(recvd),
                flags: std::sync::atomic::AtomicU32::new(0),
                values: std::sync::Mutex::new(NvTable::new()),
                tags: std::sync::Mutex::new(TagSet::new()),
                source_addr: std::sync::Mutex::new(None),
                ack: Arc::new(AckChain::new()),
            }),
        }
    }

    /// *new(raw_bytes, ...)* — a Message with `MESSAGE` set to `raw_bytes` and `RECVD` stamped
    /// (spec §4.1). Parsers build on top of this and then fill in the remaining fields.
    pub fn new(raw_bytes: &[u8]) -> Self {
        let message = Message::new_empty();
        message.set_value(nvtable::message_key(), raw_bytes);
        message
    }

    /// Builds the parse-error placeholder described in spec §4.1's failure semantics: `MESSAGE`
    /// holds the raw bytes, `PROGRAM` stays unset, priority is the caller-supplied default, and
    /// the `parse-error` tag is added. Callers are responsible for incrementing the parse-error
    /// counter.
    pub fn parse_error(raw_bytes: &[u8], default_priority: u8) -> Self {
        let message = Message::new(raw_bytes);
        message.set_priority(default_priority);
        message.inner.tags.lock_or_panic().add_handle(parse_error_tag());
        message
    }

    pub fn receipt_id(&self) -> u64 {
        self.inner.receipt_id
    }

    /// (I-1) `priority` is masked into `[0, 191]` on read; parsing may accept an out-of-range
    /// raw value (spec §4.2 "PRI overflow ... accepted but later operations mask") but every
    /// reader of this getter sees the masked value.
    pub fn priority(&self) -> u8 {
        (self.inner.priority.load(Ordering::SeqCst) % 192) as u8
    }

    /// Sets the raw priority value without masking, preserving the out-of-range value for
    /// later facility/severity extraction (spec §4.2 numeric/edge semantics).
    pub fn set_priority(&self, priority: u8) {
        self.inner.priority.store(priority as u32, Ordering::SeqCst);
    }

    /// Facility component of the priority (`priority / 8`).
    pub fn facility(&self) -> u8 {
        self.priority() / 8
    }

    /// Severity component of the priority (`priority % 8`).
    pub fn severity(&self) -> u8 {
        self.priority() % 8
    }

    pub fn stamp(&self) -> Stamp {
        *self.inner.stamp.lock_or_panic()
    }

    pub fn set_stamp(&self, stamp: Stamp) {
        *self.inner.stamp.lock_or_panic() = stamp;
    }

    pub fn recvd(&self) -> Stamp {
        *self.inner.recvd.lock_or_panic()
    }

    pub fn flags(&self) -> Flags {
        Flags::from_bits_truncate(self.inner.flags.load(Ordering::SeqCst))
    }

    pub fn set_flag(&self, flag: Flags) {
        self.inner.flags.fetch_or(flag.bits(), Ordering::SeqCst);
    }

    pub fn clear_flag(&self, flag: Flags) {
        self.inner.flags.fetch_and(!flag.bits(), Ordering::SeqCst);
    }

    pub fn has_flag(&self, flag: Flags) -> bool {
        self.flags().contains(flag)
    }

    pub fn source_address(&self) -> Option<SourceAddress> {
        self.inner.source_addr.lock_or_panic().clone()
    }

    pub fn set_source_address(&self, addr: SourceAddress) {
        *self.inner.source_addr.lock_or_panic() = Some(addr);
    }

    /// *set-value(handle, bytes)* — forks shared NV-store state first (spec I-4).
    pub fn set_value(&self, handle: Handle, bytes: &[u8]) {
        self.inner.values.lock_or_panic().set_value(handle, bytes);
    }

    pub fn set_value_indirect(&self, handle: Handle, source: Handle, offset: usize, len: usize) {
        self.inner
            .values
            .lock_or_panic()
            .set_value_indirect(handle, source, offset, len);
    }

    /// *get-value(handle) → (bytes, len)* — `len` always equals the returned vector's length
    /// (spec I-3).
    pub fn get_value(&self, handle: Handle) -> Vec<u8> {
        self.inner.values.lock_or_panic().get_value(handle)
    }

    pub fn has_value(&self, handle: Handle) -> bool {
        self.inner.values.lock_or_panic().has_value(handle)
    }

    pub fn unset_value(&self, handle: Handle) {
        self.inner.values.lock_or_panic().unset_value(handle);
    }

    pub fn add_tag(&self, name: &str) {
        self.inner.tags.lock_or_panic().add_tag(name);
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.inner.tags.lock_or_panic().has_tag(name)
    }

    /// Access to this message's ack chain, for queues/graph nodes installing completion
    /// callbacks or adding fan-out credit (spec §4.1).
    pub fn ack_chain(&self) -> &Arc<AckChain> {
        &self.inner.ack
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// *clone-cow() → Message* — a new handle sharing the underlying NV-store and tag set
    /// until the first mutation (spec §3, §4.1). The clone gets its own receipt-id and its own
    /// ack chain (spec §3: "Clones participate in their own ack chain"); everything else is a
    /// snapshot of the current state.
    pub fn clone_cow(&self) -> Message {
        let values = self.inner.values.lock_or_panic().clone();
        let tags = self.inner.tags.lock_or_panic().clone();
        Message {
            inner: Arc::new(MessageInner {
                receipt_id: next_receipt_id(),
                priority: std::sync::atomic::AtomicU32::new(
                    self.inner.priority.load(Ordering::SeqCst),
                ),
                stamp: std::sync::Mutex::new(self.stamp()),
                recvd: std::sync::Mutex::new(self.recvd()),
                flags: std::sync::atomic::AtomicU32::new(self.inner.flags.load(Ordering::SeqCst)),
                values: std::sync::Mutex::new(values),
                tags: std::sync::Mutex::new(tags),
                source_addr: std::sync::Mutex::new(self.source_address()),
                ack: Arc::new(AckChain::new()),
            }),
        }
    }
}

use logpipe_common::MutexExt;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_empty_assigns_unique_receipt_ids() {
        let a = Message::new_empty();
        let b = Message::new_empty();
        assert_ne!(a.receipt_id(), b.receipt_id());
    }

    #[test]
    fn priority_masks_on_read() {
        let message = Message::new_empty();
        message.set_priority(34);
        assert_eq!(message.priority(), 34);
        assert_eq!(message.facility(), 4);
        assert_eq!(message.severity(), 2);
    }

    #[test]
    fn absent_value_reads_empty() {
        let message = Message::new_empty();
        assert_eq!(message.get_value(nvtable::host_key()), Vec::<u8>::new());
    }

    #[test]
    fn parse_error_sets_message_and_tag() {
        let message = Message::parse_error(b"garbled input", 13);
        assert_eq!(message.get_value(nvtable::message_key()), b"garbled input".to_vec());
        assert!(!message.has_value(nvtable::program_key()));
        assert!(message.has_tag("parse-error"));
        assert_eq!(message.priority(), 13);
    }

    #[test]
    fn clone_cow_does_not_observe_later_mutation() {
        let original = Message::new_empty();
        original.set_value(nvtable::host_key(), b"mymachine");

        let clone = original.clone_cow();
        original.set_value(nvtable::host_key(), b"otherhost");

        assert_eq!(clone.get_value(nvtable::host_key()), b"mymachine".to_vec());
        assert_eq!(original.get_value(nvtable::host_key()), b"otherhost".to_vec());
    }

    #[test]
    fn clone_cow_gets_its_own_receipt_id_and_ack_chain() {
        let original = Message::new_empty();
        let clone = original.clone_cow();
        assert_ne!(original.receipt_id(), clone.receipt_id());
        assert!(!Arc::ptr_eq(original.ack_chain(), clone.ack_chain()));
    }

    #[test]
    fn ref_count_tracks_outstanding_handles() {
        let message = Message::new_empty();
        assert_eq!(message.ref_count(), 1);
        let second = message.clone();
        assert_eq!(message.ref_count(), 2);
        drop(second);
        assert_eq!(message.ref_count(), 1);
    }
}
