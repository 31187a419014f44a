// SPDX-License-Identifier: Apache-2.0

//! The cooperative, single-threaded event reactor each source and each threaded destination
//! runs on (spec §5, §9 "callback-driven event loop").
//!
//! Spec §5 describes OS-thread-per-destination cooperative reactors, not a shared async
//! runtime, so unlike the teacher's `async_trait`/tokio-based `SharedRuntime`
//! (`libdd-data-pipeline/src/shared_runtime.rs`) this reactor is a plain blocking executor: a
//! condvar-guarded min-heap of due timers plus an MPSC channel for cross-thread events, driven
//! by [`Worker`] instances registered as scheduled tasks. The run/trigger loop that module
//! built around `PausableWorker` is the structural analogue this generalizes into
//! schedule/arm/post.

use logpipe_common::worker::Worker;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// A cross-thread signal posted into a reactor (spec §5: "message available in queue",
/// "shutdown").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    MessageAvailable,
    Shutdown,
}

struct TimerEntry {
    due: Instant,
    task: Box<dyn FnMut() + Send>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due.cmp(&other.due)
    }
}

/// A single-threaded cooperative reactor (spec §5, §9): `{schedule_task, arm_timer,
/// post_cross_thread_event}` are the only suspension points — handlers registered here run to
/// completion and cannot be preempted.
struct TaskEntry {
    worker: Box<dyn Worker + Send>,
    next_due: Instant,
}

pub struct Reactor {
    timers: BinaryHeap<Reverse<TimerEntry>>,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
    tasks: Vec<TaskEntry>,
    running: bool,
}

/// A handle that can post [`Event`]s into a [`Reactor`] from any thread — the "lock-free event
/// primitive per worker" of spec §5. `Sender<Event>` already satisfies "wakes the target reactor
/// exactly once per posting" at the channel level; coalescing repeated `MessageAvailable`
/// postings between two `working` entries is the destination driver's job (spec §4.6), not the
/// channel's.
#[derive(Clone)]
pub struct EventHandle {
    tx: Sender<Event>,
}

impl EventHandle {
    pub fn post(&self, event: Event) {
        // A closed receiver means the reactor already shut down; posting is then a no-op.
        let _ = self.tx.send(event);
    }
}

impl Reactor {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Reactor {
            timers: BinaryHeap::new(),
            events_tx,
            events_rx,
            tasks: Vec::new(),
            running: true,
        }
    }

    /// A cloneable handle other threads use to post events into this reactor.
    pub fn event_handle(&self) -> EventHandle {
        EventHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// *schedule-task* — registers a [`Worker`] to be driven by this reactor's `run` loop. Its
    /// `initial_trigger`/`trigger` return values become the delay before each subsequent `run`
    /// (spec §5, §9).
    pub fn schedule_task(&mut self, mut worker: Box<dyn Worker + Send>) {
        let delay = worker.initial_trigger();
        self.tasks.push(TaskEntry {
            worker,
            next_due: Instant::now() + delay,
        });
    }

    /// *arm-timer* — runs `task` once, no sooner than `delay` from now (spec §5, §9).
    pub fn arm_timer(&mut self, delay: Duration, task: impl FnMut() + Send + 'static) {
        self.timers.push(Reverse(TimerEntry {
            due: Instant::now() + delay,
            task: Box::new(task),
        }));
    }

    /// *post-cross-thread-event* — the same-thread convenience form of [`EventHandle::post`].
    pub fn post_event(&self, event: Event) {
        self.event_handle().post(event);
    }

    /// Runs the reactor until a [`Event::Shutdown`] is received. Each iteration: fire any due
    /// timers, poll scheduled tasks whose trigger delay has elapsed, then block (with a timeout
    /// bounded by the next due timer) for the next cross-thread event.
    pub fn run(&mut self) {
        while self.running {
            let now = Instant::now();

            while let Some(Reverse(entry)) = self.timers.peek() {
                if entry.due <= now {
                    let Reverse(mut entry) = self.timers.pop().unwrap();
                    (entry.task)();
                } else {
                    break;
                }
            }

            for task in self.tasks.iter_mut() {
                if task.next_due <= now {
                    task.worker.run();
                    task.next_due = now + task.worker.trigger();
                }
            }

            let wait = self.next_wakeup(now);
            match self.events_rx.recv_timeout(wait) {
                Ok(Event::Shutdown) => {
                    for task in self.tasks.iter_mut() {
                        task.worker.shutdown();
                    }
                    self.running = false;
                }
                Ok(Event::MessageAvailable) => {}
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.running = false,
            }
        }
    }

    fn next_wakeup(&self, now: Instant) -> Duration {
        let timer_due = self.timers.peek().map(|Reverse(e)| e.due);
        let task_due = self.tasks.iter().map(|t| t.next_due).min();
        let earliest = [timer_due, task_due]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(now + Duration::from_millis(100));
        earliest.saturating_duration_since(now).max(Duration::from_millis(1))
    }

    /// Stops the reactor after the current iteration, as if a [`Event::Shutdown`] had arrived.
    pub fn shutdown(&mut self) {
        self.running = false;
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn timer_fires_after_delay() {
        let mut reactor = Reactor::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        reactor.arm_timer(Duration::from_millis(5), move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });

        let handle = reactor.event_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            handle.post(Event::Shutdown);
        });

        reactor.run();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_event_stops_the_loop() {
        let mut reactor = Reactor::new();
        let handle = reactor.event_handle();
        handle.post(Event::Shutdown);
        reactor.run();
    }

    #[test]
    fn cross_thread_post_wakes_the_reactor() {
        let mut reactor = Reactor::new();
        let handle = reactor.event_handle();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        reactor.arm_timer(Duration::from_millis(200), move || {
            seen2.fetch_add(1, Ordering::SeqCst);
        });

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            handle.post(Event::Shutdown);
        });

        let start = Instant::now();
        reactor.run();
        assert!(start.elapsed() < Duration::from_millis(150));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
