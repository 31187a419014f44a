// SPDX-License-Identifier: Apache-2.0

//! The bounded FIFO between a pipe graph's tail and a destination worker (spec §4.5).
//!
//! Two concrete variants share the [`Queue`] contract: [`MemoryQueue`] (pure in-process) and
//! [`ExternalQueue`] (disk/remote-backed, falling back to an in-process backlog on write
//! failure). Per spec §9's open question, the external variant's `push_tail` **always** enqueues
//! a backlog entry on remote-write failure — the later, authoritative draft (see DESIGN.md).

use crate::graph::{FlowControl, PathOptions};
use crate::message::Message;
use crate::stats::Counter;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One logical queue entry (spec §3): a message plus its forwarding metadata.
pub struct Entry {
    pub message: Message,
    pub opts: PathOptions,
}

/// Result of `push_tail` under the parallel-push discipline (spec §4.5, §7 kind 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    Stored,
    /// Overflow under parallel-push: the message should be acked `dropped` by the caller.
    Dropped,
}

/// Either queue variant's `check_items` advisory (spec §4.5): whether to pop immediately, or to
/// wait and poll again after the suggested duration (the destination driver's throttle).
pub enum CheckItems {
    HasItems,
    Empty { suggested_wait: Duration },
}

/// The contract shared by memory-only and disk/external-backed queues (spec §4.5).
pub trait Queue: Send {
    /// *push-tail(msg, opts)*. Under [`FlowControl::Parallel`], drops on overflow (I-9: "drops
    /// increment `dropped`"); under [`FlowControl::FlowControlled`] the caller is expected to
    /// have acquired credit already and this always stores.
    fn push_tail(&mut self, message: Message, opts: PathOptions) -> PushResult;

    /// *pop-head() → (msg, opts)*. The popped entry moves into the backlog until acked or
    /// rewound (I-8).
    fn pop_head(&mut self) -> Option<Entry>;

    /// *length()* — number of logical messages currently enqueued (I-7); does not include the
    /// backlog.
    fn length(&self) -> usize;

    /// *ack-backlog(n)* — removes up to `n` items from the backlog (spec §4.5).
    fn ack_backlog(&mut self, n: usize);

    /// *rewind-backlog(n)* — moves up to `n` items from the backlog back to the head (I-8
    /// requires at least `n` items present; returns the number actually rewound).
    fn rewind_backlog(&mut self, n: usize) -> usize;

    /// *check-items(timeout)* (spec §4.5): non-blocking peek plus a throttling hint.
    fn check_items(&self, timeout: Duration) -> CheckItems;

    fn backlog_len(&self) -> usize;
}

/// A queue that forwards every `push_tail`/`pop_head`/ack to the destination's `stored` and
/// `dropped` counters (spec §4.5 "Counter coupling"). Both concrete queue variants hold one of
/// these rather than duplicating the bookkeeping.
struct Counters {
    stored: Arc<Counter>,
    dropped: Arc<Counter>,
}

/// Pure in-process, memory-only queue (spec §4.5 "Memory-only" column).
pub struct MemoryQueue {
    items: VecDeque<Entry>,
    backlog: VecDeque<Entry>,
    capacity: usize,
    counters: Counters,
}

impl MemoryQueue {
    pub fn new(capacity: usize, stored: Arc<Counter>, dropped: Arc<Counter>) -> Self {
        MemoryQueue {
            items: VecDeque::new(),
            backlog: VecDeque::new(),
            capacity,
            counters: Counters { stored, dropped },
        }
    }
}

impl Queue for MemoryQueue {
    fn push_tail(&mut self, message: Message, opts: PathOptions) -> PushResult {
        if self.items.len() >= self.capacity && opts.flow_control == FlowControl::Parallel {
            self.counters.dropped.increment(1);
            return PushResult::Dropped;
        }
        self.items.push_back(Entry { message, opts });
        self.counters.stored.increment(1);
        PushResult::Stored
    }

    fn pop_head(&mut self) -> Option<Entry> {
        let entry = self.items.pop_front()?;
        let held = Entry {
            message: entry.message.clone(),
            opts: entry.opts,
        };
        self.backlog.push_back(held);
        Some(entry)
    }

    fn length(&self) -> usize {
        self.items.len()
    }

    fn ack_backlog(&mut self, n: usize) {
        for _ in 0..n.min(self.backlog.len()) {
            self.backlog.pop_front();
        }
    }

    fn rewind_backlog(&mut self, n: usize) -> usize {
        let available = n.min(self.backlog.len());
        let mut rewound = Vec::with_capacity(available);
        for _ in 0..available {
            if let Some(entry) = self.backlog.pop_back() {
                rewound.push(entry);
            }
        }
        rewound.reverse();
        for entry in rewound {
            self.items.push_front(entry);
        }
        available
    }

    fn check_items(&self, _timeout: Duration) -> CheckItems {
        if !self.items.is_empty() {
            CheckItems::HasItems
        } else {
            CheckItems::Empty {
                suggested_wait: Duration::from_millis(100),
            }
        }
    }

    fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

/// A sink for writing to whatever external/remote store backs this queue (e.g. a disk-backed
/// spool file or a remote broker). Kept abstract so [`ExternalQueue`] doesn't depend on a
/// concrete transport.
pub trait RemoteWriter: Send {
    /// Attempts to durably store one entry remotely. `Ok(())` means the remote accepted it;
    /// `Err` means it did not (and the entry must be backlogged in-process per spec §9's
    /// resolved open question).
    fn write(&mut self, entry: &Entry) -> Result<(), anyhow::Error>;
}

/// Disk-backed/external queue variant (spec §4.5 "Disk-backed/External" column).
///
/// `push_tail` always attempts a remote write; on failure it falls back to an in-process
/// backlog entry rather than dropping the message (spec §9 resolved open question).
pub struct ExternalQueue {
    remote: Box<dyn RemoteWriter>,
    pending: VecDeque<Entry>,
    backlog: VecDeque<Entry>,
    counters: Counters,
}

impl ExternalQueue {
    pub fn new(remote: Box<dyn RemoteWriter>, stored: Arc<Counter>, dropped: Arc<Counter>) -> Self {
        ExternalQueue {
            remote,
            pending: VecDeque::new(),
            backlog: VecDeque::new(),
            counters: Counters { stored, dropped },
        }
    }
}

impl Queue for ExternalQueue {
    fn push_tail(&mut self, message: Message, opts: PathOptions) -> PushResult {
        let entry = Entry { message, opts };
        match self.remote.write(&entry) {
            Ok(()) => {
                self.counters.stored.increment(1);
                PushResult::Stored
            }
            Err(error) => {
                tracing::warn!(error = %error, "remote queue write failed, backlogging in-process");
                self.pending.push_back(entry);
                self.counters.stored.increment(1);
                PushResult::Stored
            }
        }
    }

    fn pop_head(&mut self) -> Option<Entry> {
        let entry = self.pending.pop_front()?;
        let held = Entry {
            message: entry.message.clone(),
            opts: entry.opts,
        };
        self.backlog.push_back(held);
        Some(entry)
    }

    fn length(&self) -> usize {
        self.pending.len()
    }

    fn ack_backlog(&mut self, n: usize) {
        for _ in 0..n.min(self.backlog.len()) {
            self.backlog.pop_front();
        }
    }

    fn rewind_backlog(&mut self, n: usize) -> usize {
        let available = n.min(self.backlog.len());
        let mut rewound = Vec::with_capacity(available);
        for _ in 0..available {
            if let Some(entry) = self.backlog.pop_back() {
                rewound.push(entry);
            }
        }
        rewound.reverse();
        for entry in rewound {
            self.pending.push_front(entry);
        }
        available
    }

    fn check_items(&self, _timeout: Duration) -> CheckItems {
        if !self.pending.is_empty() {
            CheckItems::HasItems
        } else {
            CheckItems::Empty {
                suggested_wait: Duration::from_millis(250),
            }
        }
    }

    fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Counter;

    fn counters() -> (Arc<Counter>, Arc<Counter>) {
        (Arc::new(Counter::new()), Arc::new(Counter::new()))
    }

    #[test]
    fn memory_queue_respects_capacity_and_drops_under_parallel() {
        let (stored, dropped) = counters();
        let mut queue = MemoryQueue::new(1, stored, dropped);
        assert_eq!(
            queue.push_tail(Message::new_empty(), PathOptions::default()),
            PushResult::Stored
        );
        assert_eq!(
            queue.push_tail(Message::new_empty(), PathOptions::default()),
            PushResult::Dropped
        );
        assert_eq!(queue.length(), 1);
    }

    #[test]
    fn pop_head_holds_entry_in_backlog_until_acked() {
        let (stored, dropped) = counters();
        let mut queue = MemoryQueue::new(8, stored, dropped);
        queue.push_tail(Message::new_empty(), PathOptions::default());
        queue.pop_head();
        assert_eq!(queue.backlog_len(), 1);
        queue.ack_backlog(1);
        assert_eq!(queue.backlog_len(), 0);
    }

    #[test]
    fn rewind_backlog_requires_available_items() {
        let (stored, dropped) = counters();
        let mut queue = MemoryQueue::new(8, stored, dropped);
        queue.push_tail(Message::new_empty(), PathOptions::default());
        queue.pop_head();
        assert_eq!(queue.rewind_backlog(5), 1);
        assert_eq!(queue.length(), 1);
        assert_eq!(queue.backlog_len(), 0);
    }

    struct FailingRemote {
        fail_next: bool,
    }

    impl RemoteWriter for FailingRemote {
        fn write(&mut self, _entry: &Entry) -> Result<(), anyhow::Error> {
            if self.fail_next {
                anyhow::bail!("remote unavailable")
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn external_queue_backlogs_in_process_on_remote_failure() {
        let (stored, dropped) = counters();
        let mut queue = ExternalQueue::new(
            Box::new(FailingRemote { fail_next: true }),
            stored,
            dropped,
        );
        let result = queue.push_tail(Message::new_empty(), PathOptions::default());
        assert_eq!(result, PushResult::Stored);
        assert_eq!(queue.length(), 1);
    }

    #[test]
    fn external_queue_stores_without_backlog_on_remote_success() {
        let (stored, dropped) = counters();
        let mut queue = ExternalQueue::new(
            Box::new(FailingRemote { fail_next: false }),
            stored,
            dropped,
        );
        queue.push_tail(Message::new_empty(), PathOptions::default());
        assert_eq!(queue.length(), 1);
    }
}
