// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// A unit of repeated work driven by a [reactor](../../logpipe_core/reactor/index.html).
///
/// Spec §5 describes each threaded destination (and the main thread) as running its *own*
/// cooperative, single-threaded reactor rather than sharing an async runtime, so unlike the
/// teacher's `async_trait`-based worker this one is plain and blocking: `run` executes to
/// completion on the reactor's thread, and `trigger` reports how long to wait before the next
/// run. This trait is dyn-compatible without any macro help, which keeps `Box<dyn Worker>`
/// usable from the reactor's task queue.
pub trait Worker {
    /// Runs one unit of work to completion on the calling (reactor) thread.
    fn run(&mut self);

    /// Called after each `run` to decide how long to wait before the next one.
    fn trigger(&mut self) -> Duration;

    /// Alternative trigger used before the very first `run`. Defaults to `trigger`'s behavior.
    fn initial_trigger(&mut self) -> Duration {
        self.trigger()
    }

    /// Resets internal state; used after a destination's reopen-timer fires (spec §4.6).
    fn reset(&mut self) {}

    /// Hook called when the owning reactor is shutting down, to flush any buffered state.
    fn shutdown(&mut self) {}
}

impl Worker for Box<dyn Worker + Send> {
    fn run(&mut self) {
        (**self).run()
    }

    fn trigger(&mut self) -> Duration {
        (**self).trigger()
    }

    fn initial_trigger(&mut self) -> Duration {
        (**self).initial_trigger()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    impl Worker for Counter {
        fn run(&mut self) {
            self.0 += 1;
        }

        fn trigger(&mut self) -> Duration {
            Duration::from_millis(self.0 as u64)
        }
    }

    #[test]
    fn boxed_worker_forwards_to_inner() {
        let mut boxed: Box<dyn Worker + Send> = Box::new(Counter(0));
        boxed.run();
        boxed.run();
        assert_eq!(boxed.trigger(), Duration::from_millis(2));
    }
}
