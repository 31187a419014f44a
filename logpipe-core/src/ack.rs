// SPDX-License-Identifier: Apache-2.0

//! The per-message acknowledgement chain (spec §3, §4.1, invariant I-6).
//!
//! Each enqueue or fan-out hop adds one ack credit; `ack(outcome)` decrements it. When the
//! count reaches zero, the chained parent (if any) is acked with the *worst* outcome observed
//! among the children, under the ordering `processed < dropped < suspended` (spec §4.1, P-3).

use logpipe_common::MutexExt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// The outcome of delivering (or failing to deliver) a message, ordered worst-last so that
/// `Ord::max` implements the ack chain's "worst outcome wins" rule (spec §4.1, P-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    Processed,
    Dropped,
    Suspended,
}

/// A completion callback invoked exactly once, when a message's ack count reaches zero
/// (spec I-6). Boxed so each source/queue can install its own closure over its own state
/// (e.g. releasing flow-control credit, or forwarding the ack to a parent chain).
pub type CompletionCallback = Box<dyn FnOnce(Outcome) + Send>;

struct AckState {
    /// Worst outcome observed among all children that have acked so far.
    worst: Option<Outcome>,
    callback: Option<CompletionCallback>,
}

/// A single message's ack tracker. Lives for the lifetime of the owning [`Message`] and is
/// cloned alongside it; COW clones get their own chain (spec §3 "Clones participate in their
/// own ack chain"), optionally wired to a parent via [`AckChain::child`].
///
/// [`Message`]: crate::message::Message
pub struct AckChain {
    count: AtomicI64,
    state: Mutex<AckState>,
}

impl AckChain {
    /// Creates a fresh chain with one credit outstanding (the producer's own reference) and no
    /// completion callback installed.
    pub fn new() -> Self {
        AckChain {
            count: AtomicI64::new(1),
            state: Mutex::new(AckState {
                worst: None,
                callback: None,
            }),
        }
    }

    /// Installs the callback fired when this chain's count reaches zero. Replaces any
    /// previously-installed callback (a caller should only install one).
    pub fn on_complete(&self, callback: CompletionCallback) {
        self.state.lock_or_panic().callback = Some(callback);
    }

    /// Adds one ack credit, e.g. on enqueue or fan-out (spec §4.1).
    pub fn add_credit(&self) {
        let previous = self.count.fetch_add(1, Ordering::SeqCst);
        debug_assert!(previous >= 0, "ack count must stay non-negative (I-6)");
    }

    /// Records one outcome and decrements the count. Fires the completion callback exactly
    /// once, with the worst outcome observed, when the count reaches zero (spec I-6, P-3).
    pub fn ack(&self, outcome: Outcome) {
        {
            let mut state = self.state.lock_or_panic();
            state.worst = Some(match state.worst {
                Some(existing) => existing.max(outcome),
                None => outcome,
            });
        }

        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous >= 1, "ack count must stay non-negative (I-6)");

        if previous == 1 {
            let (worst, callback) = {
                let mut state = self.state.lock_or_panic();
                (
                    state.worst.expect("worst set before count reaches zero"),
                    state.callback.take(),
                )
            };
            if let Some(callback) = callback {
                callback(worst);
            }
        }
    }

    /// Current outstanding credit, for diagnostics and tests.
    pub fn outstanding(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for AckChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Wires a child chain's completion to propagate its worst outcome as one ack on `parent`
/// (spec §4.1: "the chained parent ... is acked with the worst outcome observed"). `parent`
/// must outlive the child chain; callers typically hold both behind `Arc`.
pub fn chain_to_parent(parent: std::sync::Arc<AckChain>) -> CompletionCallback {
    parent.add_credit();
    Box::new(move |outcome| parent.ack(outcome))
}
