// SPDX-License-Identifier: Apache-2.0

//! Process-wide name-to-handle interning.
//!
//! Spec §3 calls for two independent interned tables: NV-store key names (`HOST`, `PROGRAM`, the
//! `.SDATA.*` family, ...) and tag names. Both want the same shape — "read-often, write-rare;
//! protected by a global lock on insert" (spec §5) — so this module generalizes the teacher's
//! single-purpose `Tag` validation (`libdd-common/src/tag.rs`, which interns `key:value` strings
//! for one metrics backend) into a reusable table that either table can be built from.

use crate::MutexExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A stable, cheap-to-compare identifier for an interned name.
///
/// Handles are only comparable within the [`Interner`] that issued them; there is no validation
/// preventing a handle from one interner being passed to another, by design — the NV-store
/// interner and the tag-name interner are expected to be distinct `Interner` instances, and
/// mixing their handles is a caller bug, not something this type can catch cheaply.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Handle(u32);

impl Handle {
    /// Returns the raw index backing this handle, for use as a small-int tag (spec §3's
    /// "small integers mapped to names" tag set).
    pub fn index(self) -> u32 {
        self.0
    }

    /// Reconstructs a handle from a raw index previously obtained from [`Handle::index`].
    ///
    /// Callers are responsible for only ever doing this with an index obtained from the same
    /// interner the handle will be resolved against.
    pub fn from_index(index: u32) -> Self {
        Handle(index)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct InternerState {
    names: Vec<Arc<str>>,
    by_name: HashMap<Arc<str>, Handle>,
}

/// A process-wide, thread-safe name interner.
///
/// `intern` is idempotent: interning the same string twice returns the same handle. Reverse
/// lookup (`resolve`) is used for serialization and CSV/log-line formatting (spec §4.7, §6).
pub struct Interner {
    state: Mutex<InternerState>,
}

impl Interner {
    /// Creates an empty interner.
    pub fn new() -> Self {
        Interner {
            state: Mutex::new(InternerState {
                names: Vec::new(),
                by_name: HashMap::new(),
            }),
        }
    }

    /// Creates an interner pre-seeded with `names`, assigning handles in order starting at 0.
    ///
    /// Used to give built-in keys (`HOST`, `MESSAGE`, ...) fixed handles known at compile time,
    /// mirroring how the original engine's builtin value names are constant small integers.
    pub fn with_builtins<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let interner = Self::new();
        for name in names {
            interner.intern(&name.into());
        }
        interner
    }

    /// Returns the handle for `name`, interning it if this is the first time it's been seen.
    pub fn intern(&self, name: &str) -> Handle {
        let mut state = self.state.lock_or_panic();
        if let Some(handle) = state.by_name.get(name) {
            return *handle;
        }
        let handle = Handle(state.names.len() as u32);
        let owned: Arc<str> = Arc::from(name);
        state.names.push(owned.clone());
        state.by_name.insert(owned, handle);
        handle
    }

    /// Returns the handle for `name` without interning it, if it has been seen before.
    pub fn lookup(&self, name: &str) -> Option<Handle> {
        self.state.lock_or_panic().by_name.get(name).copied()
    }

    /// Recovers the name behind a handle previously returned by `intern` on this interner.
    ///
    /// # Panics
    /// Panics if `handle` was not issued by this interner (spec I-2-style "unique within the
    /// issuing authority" contract — passing a foreign handle is a programming error).
    pub fn resolve(&self, handle: Handle) -> Arc<str> {
        let state = self.state.lock_or_panic();
        state
            .names
            .get(handle.0 as usize)
            .cloned()
            .unwrap_or_else(|| panic!("handle {handle} not issued by this interner"))
    }

    /// Number of distinct names interned so far.
    pub fn len(&self) -> usize {
        self.state.lock_or_panic().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_name_twice_returns_same_handle() {
        let interner = Interner::new();
        let a = interner.intern("HOST");
        let b = interner.intern("HOST");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_names_get_distinct_handles() {
        let interner = Interner::new();
        let host = interner.intern("HOST");
        let program = interner.intern("PROGRAM");
        assert_ne!(host, program);
    }

    #[test]
    fn resolve_recovers_the_original_name() {
        let interner = Interner::new();
        let handle = interner.intern(".SDATA.exampleSDID@0.iut");
        assert_eq!(&*interner.resolve(handle), ".SDATA.exampleSDID@0.iut");
    }

    #[test]
    fn builtins_get_stable_handles_in_order() {
        let interner = Interner::with_builtins(["HOST", "PROGRAM", "PID"]);
        assert_eq!(interner.lookup("HOST").unwrap().index(), 0);
        assert_eq!(interner.lookup("PROGRAM").unwrap().index(), 1);
        assert_eq!(interner.lookup("PID").unwrap().index(), 2);
    }

    #[test]
    fn lookup_of_unseen_name_is_none() {
        let interner = Interner::new();
        assert!(interner.lookup("nope").is_none());
    }

    #[test]
    fn concurrent_interning_is_consistent() {
        use std::sync::Arc as StdArc;
        let interner = StdArc::new(Interner::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let interner = StdArc::clone(&interner);
                std::thread::spawn(move || interner.intern("shared"))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }
}
