// SPDX-License-Identifier: Apache-2.0

//! The per-message name-value store (spec §3, §4.1, §9 "Message COW with indirect values").
//!
//! Each slot is a small tagged enum — `Inline(bytes)` or `Indirect{source_handle, offset, len}`
//! — exactly as spec §9's design note prescribes, so that structured-data fragments carved out
//! of the raw payload during parsing can be stored as views rather than copies.

use logpipe_common::interner::{Handle, Interner};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// The process-wide NV-store key interner. Distinct from the tag-name interner (spec §4.1
/// AMBIENT: "two process-wide tables"). Built-in keys are assigned fixed handles at process
/// start, mirroring the original engine's constant builtin value-name integers.
fn key_interner() -> &'static Interner {
    static KEYS: OnceLock<Interner> = OnceLock::new();
    KEYS.get_or_init(|| {
        Interner::with_builtins([
            "HOST",
            "PROGRAM",
            "PID",
            "MSGID",
            "MESSAGE",
            "SOURCE",
            "LEGACY_MSGHDR",
        ])
    })
}

/// Interns `name` in the process-wide NV-store key table.
pub fn intern_key(name: &str) -> Handle {
    key_interner().intern(name)
}

/// Looks up a previously-interned NV-store key without interning it.
pub fn lookup_key(name: &str) -> Option<Handle> {
    key_interner().lookup(name)
}

pub fn resolve_key(handle: Handle) -> Arc<str> {
    key_interner().resolve(handle)
}

macro_rules! builtin_key_fn {
    ($fn_name:ident, $name:expr) => {
        pub fn $fn_name() -> Handle {
            key_interner()
                .lookup($name)
                .unwrap_or_else(|| panic!(concat!($name, " registered as a builtin key")))
        }
    };
}

builtin_key_fn!(host_key, "HOST");
builtin_key_fn!(program_key, "PROGRAM");
builtin_key_fn!(pid_key, "PID");
builtin_key_fn!(msgid_key, "MSGID");
builtin_key_fn!(message_key, "MESSAGE");
builtin_key_fn!(source_key, "SOURCE");
builtin_key_fn!(legacy_msghdr_key, "LEGACY_MSGHDR");

/// Prefix for structured-data keys (spec §3, §4.2): `.SDATA.<SD-ID>.<PARAM-NAME>`.
pub const SDATA_PREFIX: &str = ".SDATA.";

pub fn sdata_key(sd_id: &str, param_name: &str) -> String {
    format!("{SDATA_PREFIX}{sd_id}.{param_name}")
}

pub fn sdata_element_key(sd_id: &str) -> String {
    format!("{SDATA_PREFIX}{sd_id}")
}

/// One value slot: either owned bytes, or a view into another value (spec §9).
#[derive(Debug, Clone)]
enum Slot {
    Inline(Arc<[u8]>),
    Indirect {
        source: Handle,
        offset: usize,
        len: usize,
    },
}

/// The name-value store backing a [`crate::message::Message`] (spec §4.1).
///
/// Shared between COW clones via `Arc` until the first mutation; `NvTable::fork_if_shared`
/// implements the "forks a private copy ... before writing" half of spec I-4.
#[derive(Debug, Clone, Default)]
pub struct NvTable {
    slots: Arc<BTreeMap<u32, Slot>>,
}

impl NvTable {
    pub fn new() -> Self {
        NvTable::default()
    }

    /// True if this handle is shared with another clone (`Arc::strong_count > 1`); used by
    /// callers implementing spec I-4's copy-on-write contract before a mutating operation.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.slots) > 1
    }

    /// Forks a private copy of the backing map if it is currently shared. No-op otherwise.
    fn fork_if_shared(&mut self) {
        if self.is_shared() {
            self.slots = Arc::new((*self.slots).clone());
        }
    }

    /// *set-value(handle, bytes)* — stores a copy, forking shared state first (spec I-4).
    pub fn set_value(&mut self, handle: Handle, bytes: &[u8]) {
        self.fork_if_shared();
        Arc::make_mut(&mut self.slots).insert(handle.index(), Slot::Inline(Arc::from(bytes)));
    }

    /// *set-value-indirect(handle, source_handle, offset, len)* — stores a slice view into
    /// another value without copying (spec §4.1); resolves to bytes lazily on read.
    pub fn set_value_indirect(&mut self, handle: Handle, source: Handle, offset: usize, len: usize) {
        self.fork_if_shared();
        Arc::make_mut(&mut self.slots).insert(handle.index(), Slot::Indirect { source, offset, len });
    }

    /// *get-value(handle) → (bytes, len)* — a borrowed view; absent keys yield an empty slice
    /// per spec I-3 ("reading an absent key yields empty string of length zero").
    pub fn get_value(&self, handle: Handle) -> Vec<u8> {
        match self.slots.get(&handle.index()) {
            None => Vec::new(),
            Some(Slot::Inline(bytes)) => bytes.to_vec(),
            Some(Slot::Indirect { source, offset, len }) => {
                let source_bytes = self.get_value(*source);
                let start = (*offset).min(source_bytes.len());
                let end = (start + *len).min(source_bytes.len());
                source_bytes[start..end].to_vec()
            }
        }
    }

    pub fn has_value(&self, handle: Handle) -> bool {
        self.slots.contains_key(&handle.index())
    }

    pub fn unset_value(&mut self, handle: Handle) {
        self.fork_if_shared();
        Arc::make_mut(&mut self.slots).remove(&handle.index());
    }

    /// All handles with a present value, for serialisation (e.g. CSV/log-line formatting).
    pub fn keys(&self) -> impl Iterator<Item = Handle> + '_ {
        self.slots.keys().map(|&idx| Handle::from_index(idx))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_reads_as_empty() {
        let table = NvTable::new();
        let handle = intern_key("HOST");
        assert_eq!(table.get_value(handle), Vec::<u8>::new());
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut table = NvTable::new();
        let handle = intern_key("PROGRAM");
        table.set_value(handle, b"su");
        assert_eq!(table.get_value(handle), b"su".to_vec());
    }

    #[test]
    fn clone_shares_until_mutation() {
        let mut a = NvTable::new();
        let handle = intern_key("MESSAGE");
        a.set_value(handle, b"original");

        let b = a.clone();
        assert!(a.is_shared());

        a.set_value(handle, b"mutated");
        assert_eq!(a.get_value(handle), b"mutated".to_vec());
        assert_eq!(b.get_value(handle), b"original".to_vec());
    }

    #[test]
    fn indirect_value_resolves_a_slice_of_the_source() {
        let mut table = NvTable::new();
        let message = intern_key("MESSAGE");
        let sdata = intern_key(&sdata_key("exampleSDID@0", "iut"));

        table.set_value(message, b"prefix-3-suffix");
        table.set_value_indirect(sdata, message, 7, 1);

        assert_eq!(table.get_value(sdata), b"3".to_vec());
    }

    #[test]
    fn indirect_read_clamps_out_of_range_length() {
        let mut table = NvTable::new();
        let message = intern_key("MESSAGE");
        let frag = intern_key(".SDATA.x@1.v");

        table.set_value(message, b"abc");
        table.set_value_indirect(frag, message, 1, 100);

        assert_eq!(table.get_value(frag), b"bc".to_vec());
    }

    #[test]
    fn unset_removes_the_key() {
        let mut table = NvTable::new();
        let handle = intern_key("PID");
        table.set_value(handle, b"123");
        table.unset_value(handle);
        assert!(!table.has_value(handle));
    }
}
