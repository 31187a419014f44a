// SPDX-License-Identifier: Apache-2.0

//! Per-message tag set (spec §3, §4.1): a small-int set built on top of
//! [`logpipe_common::interner::Interner`] so tag names are process-wide and comparisons are
//! `u32` equality rather than string comparison.

use logpipe_common::interner::{Handle, Interner};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// The process-wide tag-name table. Separate from the NV-store key interner (spec §4.1 AMBIENT)
/// since the two tables are conceptually distinct even though they share an implementation.
fn tag_interner() -> &'static Interner {
    static TAGS: OnceLock<Interner> = OnceLock::new();
    TAGS.get_or_init(|| Interner::with_builtins(["parse-error"]))
}

/// Returns the well-known handle for the `parse-error` tag (spec §4.1 failure semantics).
pub fn parse_error_tag() -> Handle {
    tag_interner()
        .lookup("parse-error")
        .expect("parse-error tag registered at process start")
}

/// A per-message set of small-integer tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    bits: BTreeSet<u32>,
}

impl TagSet {
    pub fn new() -> Self {
        TagSet::default()
    }

    /// Interns `name` process-wide and adds its handle to this set.
    pub fn add_tag(&mut self, name: &str) {
        let handle = tag_interner().intern(name);
        self.bits.insert(handle.index());
    }

    pub fn has_tag(&self, name: &str) -> bool {
        match tag_interner().lookup(name) {
            Some(handle) => self.bits.contains(&handle.index()),
            None => false,
        }
    }

    pub fn has_handle(&self, handle: Handle) -> bool {
        self.bits.contains(&handle.index())
    }

    pub fn add_handle(&mut self, handle: Handle) {
        self.bits.insert(handle.index());
    }

    /// Names currently set, in handle order, for serialisation/formatting.
    pub fn names(&self) -> Vec<std::sync::Arc<str>> {
        self.bits
            .iter()
            .map(|&idx| tag_interner().resolve(Handle::from_index(idx)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_check_tag() {
        let mut tags = TagSet::new();
        assert!(!tags.has_tag("custom"));
        tags.add_tag("custom");
        assert!(tags.has_tag("custom"));
    }

    #[test]
    fn parse_error_tag_is_builtin() {
        let mut tags = TagSet::new();
        tags.add_handle(parse_error_tag());
        assert!(tags.has_tag("parse-error"));
    }

    #[test]
    fn unseen_tag_name_is_absent() {
        let tags = TagSet::new();
        assert!(!tags.has_tag("never-added"));
    }

    #[test]
    fn clone_is_independent() {
        let mut a = TagSet::new();
        a.add_tag("x");
        let b = a.clone();
        a.add_tag("y");
        assert!(!b.has_tag("y"));
    }
}
