// SPDX-License-Identifier: Apache-2.0

//! The pipe graph (spec §4.4, §9 "inheritance-by-embedding").
//!
//! The original engine expresses every node as a `LogPipe` with a "super" handle embedded in
//! its outer struct, giving deep single-inheritance hierarchies. Spec §9 maps that onto a
//! capability interface instead: every node variant implements [`Node`] directly, and
//! [`NodeKind`] is the tagged discriminant used where downcasting would otherwise be needed.

use crate::ack::Outcome;
use crate::message::Message;
use std::fmt;

/// Out-of-band signal traversing the graph (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyCode {
    /// The underlying file was rotated/moved out from under a source.
    FileMoved,
    /// A read failed; the source should reopen.
    ReadError,
    /// The owning driver must reopen its transport and restart its framer.
    ReopenRequired,
    /// The node (and anything upstream of it) is closing.
    Close,
}

/// A coarse tag for the kind of node, used where a generic [`Node`] needs to be downcast back
/// to a concrete type (spec §9: "tagged variant for node kind when downcasting is required").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Source,
    Parser,
    Filter,
    Rewrite,
    Destination,
}

/// Per-hop forwarding metadata carried alongside a [`Message`] through the graph (spec §3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    /// Non-blocking; drops on overflow with a counter increment.
    Parallel,
    /// The producer must acquire credit before pushing.
    FlowControlled,
}

#[derive(Debug, Clone, Copy)]
pub struct PathOptions {
    pub flow_control: FlowControl,
}

impl Default for PathOptions {
    fn default() -> Self {
        PathOptions {
            flow_control: FlowControl::Parallel,
        }
    }
}

/// What a node did with a message it was asked to `queue` (spec §4.4 traversal).
pub enum QueueResult {
    /// Forwarded synchronously to a successor on the same thread.
    Forwarded,
    /// Dropped; the caller should ack the message `Outcome::Dropped`.
    Dropped,
    /// Handed off to another thread (e.g. a queue feeding a threaded destination).
    Enqueued,
}

/// Error surfaced from `init` (spec §4.4, §7 kind 4: configuration error detected at init).
#[derive(Debug)]
pub struct InitError(pub String);

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node init failed: {}", self.0)
    }
}

impl std::error::Error for InitError {}

/// The capability interface every pipe graph node implements (spec §4.4, §9).
///
/// `init`/`deinit` are driven by [`PipeGraph`] in leaves-first / reverse order; `queue` is the
/// synchronous per-message entry point; `notify` carries out-of-band signals upstream.
pub trait Node: Send {
    fn kind(&self) -> NodeKind;

    /// Validates configuration and acquires resources. Must be idempotent in the sense that a
    /// second call without an intervening `deinit` is an error (spec §4.4: "double-init is an
    /// error"), which implementations enforce by tracking their own initialized flag.
    fn init(&mut self) -> Result<(), InitError>;

    fn deinit(&mut self);

    /// Processes one message. Implementations call `message.ack_chain().ack(...)` themselves
    /// when they drop a message; forwarding callers are expected to pass ownership onward.
    fn queue(&mut self, message: Message, opts: PathOptions) -> QueueResult;

    /// Delivers an out-of-band signal. Default is a no-op; sources override this to reopen on
    /// `ReopenRequired`/`FileMoved`.
    fn notify(&mut self, _code: NotifyCode) {}
}

struct Entry {
    node: Box<dyn Node>,
    initialized: bool,
}

/// A linear pipeline of nodes, built at configuration time and immutable after init (spec
/// §4.4). Fan-out (multiple successors sharing one predecessor) is expressed by a node's own
/// `queue` implementation cloning the message with [`Message::clone_cow`] per branch and is out
/// of scope for this container, which only owns initialization order and lifetime.
pub struct PipeGraph {
    entries: Vec<Entry>,
}

impl PipeGraph {
    pub fn new(nodes: Vec<Box<dyn Node>>) -> Self {
        PipeGraph {
            entries: nodes
                .into_iter()
                .map(|node| Entry {
                    node,
                    initialized: false,
                })
                .collect(),
        }
    }

    /// Initializes nodes leaves (sinks) first, i.e. in reverse of construction order — a source
    /// is expected to be pushed last (spec §4.4: "Leaves first (sinks), then intermediate
    /// transforms, then sources"). On the first failure, already-initialized nodes are torn
    /// down in reverse and the error is returned (spec §7 kind 4).
    pub fn init(&mut self) -> Result<(), InitError> {
        for (idx, entry) in self.entries.iter_mut().enumerate().rev() {
            if entry.initialized {
                return Err(InitError(format!("node {idx} already initialized")));
            }
            match entry.node.init() {
                Ok(()) => entry.initialized = true,
                Err(err) => {
                    drop(entry);
                    self.deinit_from(idx + 1);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn deinit_from(&mut self, start_exclusive: usize) {
        for entry in self.entries[start_exclusive..].iter_mut() {
            if entry.initialized {
                entry.node.deinit();
                entry.initialized = false;
            }
        }
    }

    /// Tears down in the reverse of init order (spec §4.4).
    pub fn deinit(&mut self) {
        for entry in self.entries.iter_mut() {
            if entry.initialized {
                entry.node.deinit();
                entry.initialized = false;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut dyn Node> {
        self.entries.get_mut(index).map(|e| e.node.as_mut())
    }
}

/// Acks `message` as dropped; a small helper so [`Node`] implementations that choose to drop a
/// message don't each re-derive the ack-chain call (spec §4.4 traversal: "drops (acking
/// `dropped`)").
pub fn ack_dropped(message: &Message) {
    message.ack_chain().ack(Outcome::Dropped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingNode {
        kind: NodeKind,
        init_order: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        initialized: bool,
        fail_init: bool,
    }

    use std::sync::Mutex;

    impl Node for RecordingNode {
        fn kind(&self) -> NodeKind {
            self.kind
        }

        fn init(&mut self) -> Result<(), InitError> {
            if self.initialized {
                return Err(InitError("double init".into()));
            }
            if self.fail_init {
                return Err(InitError(format!("{} refused to init", self.name)));
            }
            self.init_order.lock().unwrap().push(self.name);
            self.initialized = true;
            Ok(())
        }

        fn deinit(&mut self) {
            self.init_order.lock().unwrap().push("deinit");
            self.initialized = false;
        }

        fn queue(&mut self, message: Message, _opts: PathOptions) -> QueueResult {
            message.ack_chain().ack(Outcome::Processed);
            QueueResult::Forwarded
        }
    }

    fn node(
        name: &'static str,
        order: &Arc<Mutex<Vec<&'static str>>>,
        fail_init: bool,
    ) -> Box<dyn Node> {
        Box::new(RecordingNode {
            kind: NodeKind::Filter,
            init_order: Arc::clone(order),
            name,
            initialized: false,
            fail_init,
        })
    }

    #[test]
    fn init_runs_leaves_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut graph = PipeGraph::new(vec![
            node("source", &order, false),
            node("filter", &order, false),
            node("sink", &order, false),
        ]);
        graph.init().unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["sink", "filter", "source"]);
    }

    #[test]
    fn failed_init_unwinds_already_initialized_nodes() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut graph = PipeGraph::new(vec![
            node("source", &order, true),
            node("sink", &order, false),
        ]);
        assert!(graph.init().is_err());
        assert_eq!(*order.lock().unwrap(), vec!["sink", "deinit"]);
    }

    #[test]
    fn deinit_runs_in_reverse_of_init_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut graph = PipeGraph::new(vec![
            node("source", &order, false),
            node("sink", &order, false),
        ]);
        graph.init().unwrap();
        order.lock().unwrap().clear();
        graph.deinit();
        assert_eq!(*order.lock().unwrap(), vec!["source", "sink"]);
    }

    #[test]
    fn counts_increment_during_traversal() {
        let counter = Arc::new(AtomicUsize::new(0));
        let message = Message::new_empty();
        message.ack_chain().on_complete({
            let counter = Arc::clone(&counter);
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        let mut node = RecordingNode {
            kind: NodeKind::Filter,
            init_order: Arc::new(Mutex::new(Vec::new())),
            name: "x",
            initialized: false,
            fail_init: false,
        };
        let _ = node.queue(message, PathOptions::default());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
