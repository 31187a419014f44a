// SPDX-License-Identifier: Apache-2.0

//! Wires a file source, through the pipe graph, into a queue-backed threaded destination driver
//! (spec §2 "Data flow": bytes → framing → parser → Message → pipe graph → queue → destination
//! worker → external sink).
//!
//! The source's own reactor runs on the calling thread; the destination's reactor runs on its
//! own OS thread (spec §5: "each threaded destination runs its own cooperative event reactor on
//! a dedicated OS thread"). The two are connected by a [`SharedQueue`], a thin lock-based
//! wrapper so the same [`MemoryQueue`] can be driven from both sides of that thread boundary.

use crate::config::Config;
use crate::file_destination::FileDestination;
use logpipe_common::worker::Worker;
use logpipe_common::MutexExt;
use logpipe_core::ack::Outcome;
use logpipe_core::destination::{Destination, State as DestinationState, ThreadedDestinationDriver};
use logpipe_core::framing::{Framer, ReadOutcome, TextFramer};
use logpipe_core::graph::{InitError, Node, NodeKind, NotifyCode, PathOptions, PipeGraph, QueueResult};
use logpipe_core::message::Message;
use logpipe_core::persist::PersistStore;
use logpipe_core::queue::{CheckItems, Entry, MemoryQueue, PushResult, Queue};
use logpipe_core::reactor::{Event, EventHandle, Reactor};
use logpipe_core::stats::{ClusterKey, Counter, CounterType, StatsRegistry};
use logpipe_core::syslog::{self, ParseOptions};
use std::fs;
use std::io::{Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A [`Queue`] wrapper sharing one underlying queue behind a lock, so a source on one thread and
/// a destination driver on another can both push/pop it (spec §4.5's contract says nothing about
/// thread ownership; it only names the operations, so any `Send + Sync`-safe wrapper satisfying
/// it is a conforming implementation).
struct SharedQueue<Q: Queue> {
    inner: Arc<Mutex<Q>>,
}

impl<Q: Queue> Clone for SharedQueue<Q> {
    fn clone(&self) -> Self {
        SharedQueue { inner: Arc::clone(&self.inner) }
    }
}

impl<Q: Queue> Queue for SharedQueue<Q> {
    fn push_tail(&mut self, message: Message, opts: PathOptions) -> PushResult {
        self.inner.lock_or_panic().push_tail(message, opts)
    }

    fn pop_head(&mut self) -> Option<Entry> {
        self.inner.lock_or_panic().pop_head()
    }

    fn length(&self) -> usize {
        self.inner.lock_or_panic().length()
    }

    fn ack_backlog(&mut self, n: usize) {
        self.inner.lock_or_panic().ack_backlog(n)
    }

    fn rewind_backlog(&mut self, n: usize) -> usize {
        self.inner.lock_or_panic().rewind_backlog(n)
    }

    fn check_items(&self, timeout: Duration) -> CheckItems {
        self.inner.lock_or_panic().check_items(timeout)
    }

    fn backlog_len(&self) -> usize {
        self.inner.lock_or_panic().backlog_len()
    }
}

/// Adapts [`ThreadedDestinationDriver`] to [`Worker`] so it can be scheduled on a [`Reactor`]
/// instead of polled in a bespoke loop (spec §4.6, §5).
///
/// `step()` doesn't self-reschedule out of `Throttled`/`Suspended` — a caller must call
/// `timer_fired()` once the previously-returned delay has elapsed. `run()` does exactly that
/// before calling `step()` again, and `trigger()` hands the reactor the delay `step()` suggested.
struct DestinationWorker<Q: Queue, D: Destination> {
    driver: ThreadedDestinationDriver<Q, D>,
    next_delay: Duration,
}

impl<Q: Queue, D: Destination> DestinationWorker<Q, D> {
    fn new(driver: ThreadedDestinationDriver<Q, D>) -> Self {
        DestinationWorker { driver, next_delay: Duration::ZERO }
    }
}

impl<Q: Queue, D: Destination> Worker for DestinationWorker<Q, D> {
    fn run(&mut self) {
        if matches!(self.driver.state(), DestinationState::Suspended | DestinationState::Throttled) {
            tracing::debug!(
                thread_id = logpipe_common::threading::get_current_thread_id(),
                "destination reopen timer fired, resuming"
            );
            self.driver.timer_fired();
        }
        self.next_delay = self.driver.step();
    }

    fn trigger(&mut self) -> Duration {
        self.next_delay
    }

    fn initial_trigger(&mut self) -> Duration {
        Duration::ZERO
    }

    fn shutdown(&mut self) {
        self.driver.shutdown();
    }
}

/// The pipe graph's destination-side leaf: hands a parsed [`Message`] to the shared queue that
/// feeds the threaded destination driver (spec §4.4 "enqueues (handing off to another thread)").
struct QueueSinkNode {
    queue: SharedQueue<MemoryQueue>,
    events: EventHandle,
}

impl QueueSinkNode {
    fn new(queue: SharedQueue<MemoryQueue>, events: EventHandle) -> Self {
        QueueSinkNode { queue, events }
    }
}

impl Node for QueueSinkNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Destination
    }

    fn init(&mut self) -> Result<(), InitError> {
        Ok(())
    }

    fn deinit(&mut self) {}

    fn queue(&mut self, message: Message, opts: PathOptions) -> QueueResult {
        // `push_tail` consumes `message`; keep the ack chain's `Arc` so a drop can still be
        // acked even though the `Message` handle itself is gone (spec I-6).
        let ack_chain = Arc::clone(message.ack_chain());
        match self.queue.push_tail(message, opts) {
            PushResult::Stored => {
                self.events.post(Event::MessageAvailable);
                QueueResult::Enqueued
            }
            PushResult::Dropped => {
                ack_chain.ack(Outcome::Dropped);
                QueueResult::Dropped
            }
        }
    }
}

/// The pipe graph's source: owns the file handle, the text framer, and the restart-persistence
/// cursor, and forwards parsed messages directly to its sink (spec §4.4 "Nodes compose via a
/// forward pointer").
struct FileSourceNode {
    path: PathBuf,
    file: Option<fs::File>,
    framer: TextFramer,
    max_message_len: usize,
    parse_options: Arc<ParseOptions>,
    persist: Option<PersistStore>,
    persist_name: String,
    follow_freq: Duration,
    sink: Arc<Mutex<QueueSinkNode>>,
    parse_error_counter: Arc<Counter>,
}

#[allow(clippy::too_many_arguments)]
impl FileSourceNode {
    fn new(
        path: PathBuf,
        max_message_len: usize,
        parse_options: Arc<ParseOptions>,
        persist: Option<PersistStore>,
        persist_name: String,
        follow_freq: Duration,
        sink: Arc<Mutex<QueueSinkNode>>,
        parse_error_counter: Arc<Counter>,
    ) -> Self {
        FileSourceNode {
            path,
            file: None,
            framer: TextFramer::new(max_message_len),
            max_message_len,
            parse_options,
            persist,
            persist_name,
            follow_freq,
            sink,
            parse_error_counter,
        }
    }

    fn reopen(&mut self) {
        tracing::info!(path = %self.path.display(), "reopening source file");
        match fs::File::open(&self.path) {
            Ok(file) => {
                self.file = Some(file);
                self.framer = TextFramer::new(self.max_message_len);
            }
            Err(error) => {
                tracing::error!(error = %error, path = %self.path.display(), "failed to reopen source file");
                self.file = None;
            }
        }
    }
}

impl Node for FileSourceNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Source
    }

    fn init(&mut self) -> Result<(), InitError> {
        let mut file = fs::File::open(&self.path)
            .map_err(|error| InitError(format!("opening {}: {error}", self.path.display())))?;
        let cursor = self
            .persist
            .as_ref()
            .map(|store| store.restore_state(&self.persist_name))
            .unwrap_or(0);
        file.seek(SeekFrom::Start(cursor))
            .map_err(|error| InitError(format!("seeking {}: {error}", self.path.display())))?;
        self.framer.restore_state(cursor);
        self.file = Some(file);
        Ok(())
    }

    fn deinit(&mut self) {
        if let Some(persist) = self.persist.as_mut() {
            if let Err(error) = persist.save_state(&self.persist_name, self.framer.save_state()) {
                tracing::warn!(error = %error, "failed to persist source cursor");
            }
        }
        self.file = None;
    }

    /// Sources are the head of the graph; nothing upstream ever forwards into one; a defensive
    /// drop rather than a panic keeps a misconfigured graph from taking the process down.
    fn queue(&mut self, message: Message, _opts: PathOptions) -> QueueResult {
        tracing::error!("file source received an inbound message; sources have no upstream");
        logpipe_core::graph::ack_dropped(&message);
        QueueResult::Dropped
    }

    fn notify(&mut self, code: NotifyCode) {
        match code {
            NotifyCode::FileMoved | NotifyCode::ReopenRequired | NotifyCode::ReadError => self.reopen(),
            NotifyCode::Close => self.file = None,
        }
    }
}

impl Worker for FileSourceNode {
    fn run(&mut self) {
        loop {
            let file = match self.file.as_mut() {
                Some(file) => file,
                None => {
                    self.reopen();
                    return;
                }
            };
            match self.framer.read(file) {
                ReadOutcome::Message(bytes) => {
                    let message = syslog::parse(&bytes, &self.parse_options, chrono::Utc::now());
                    if message.has_tag("parse-error") {
                        self.parse_error_counter.increment(1);
                    }
                    let ack_chain = Arc::clone(message.ack_chain());
                    let result = self.sink.lock_or_panic().queue(message, PathOptions::default());
                    if let QueueResult::Dropped = result {
                        ack_chain.ack(Outcome::Dropped);
                    }
                }
                ReadOutcome::Partial | ReadOutcome::Eof => return,
                ReadOutcome::Error(error) => {
                    tracing::warn!(error = %error, "framing error, reopening");
                    self.notify(NotifyCode::ReadError);
                    return;
                }
            }
        }
    }

    fn trigger(&mut self) -> Duration {
        self.follow_freq
    }

    fn initial_trigger(&mut self) -> Duration {
        Duration::ZERO
    }
}

/// A cloneable handle adapting `Arc<Mutex<T>>` to the trait `T` implements, so the same instance
/// can be registered both in a [`PipeGraph`] (as `Box<dyn Node>`) and on a [`Reactor`] (as
/// `Box<dyn Worker + Send>`) without the graph and the reactor fighting over ownership.
struct Shared<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Shared<T> {
    fn new(inner: Arc<Mutex<T>>) -> Self {
        Shared { inner }
    }
}

impl<T: Node> Node for Shared<T> {
    fn kind(&self) -> NodeKind {
        self.inner.lock_or_panic().kind()
    }

    fn init(&mut self) -> Result<(), InitError> {
        self.inner.lock_or_panic().init()
    }

    fn deinit(&mut self) {
        self.inner.lock_or_panic().deinit()
    }

    fn queue(&mut self, message: Message, opts: PathOptions) -> QueueResult {
        self.inner.lock_or_panic().queue(message, opts)
    }

    fn notify(&mut self, code: NotifyCode) {
        self.inner.lock_or_panic().notify(code)
    }
}

impl<T: Worker + Send> Worker for Shared<T> {
    fn run(&mut self) {
        self.inner.lock_or_panic().run()
    }

    fn trigger(&mut self) -> Duration {
        self.inner.lock_or_panic().trigger()
    }

    fn initial_trigger(&mut self) -> Duration {
        self.inner.lock_or_panic().initial_trigger()
    }

    fn reset(&mut self) {
        self.inner.lock_or_panic().reset()
    }

    fn shutdown(&mut self) {
        self.inner.lock_or_panic().shutdown()
    }
}

/// A running (or about-to-run) source → queue → threaded-destination pipeline, built from a
/// [`Config`] and ready to drive.
pub struct Pipeline {
    graph: PipeGraph,
    source_reactor: Reactor,
    dest_reactor: Reactor,
    dest_events: EventHandle,
    source_events: EventHandle,
}

impl Pipeline {
    /// Builds the pipeline's nodes, registers its counters with `stats`, and schedules its
    /// workers — but does not open the source file or spawn any thread yet (that happens in
    /// [`Pipeline::init`] / [`Pipeline::run`]).
    pub fn build(config: &Config, stats: &Arc<StatsRegistry>) -> anyhow::Result<Self> {
        let parse_options = Arc::new(config.parser.to_parse_options()?);

        let cluster = ClusterKey {
            component: "src.file".to_string(),
            id: config.source_path.clone(),
            instance: config.destination.path.clone(),
        };
        let stored = stats.register(cluster.clone(), CounterType::Stored);
        let dropped = stats.register(cluster.clone(), CounterType::Dropped);
        let parse_error_counter = stats.register_dynamic(
            ClusterKey { component: "msg.parser".to_string(), ..cluster.clone() },
            CounterType::Suppressed,
        );

        let memory_queue = MemoryQueue::new(config.queue.capacity, stored, dropped);
        let shared_queue = SharedQueue { inner: Arc::new(Mutex::new(memory_queue)) };

        let mut dest_reactor = Reactor::new();
        let dest_events = dest_reactor.event_handle();

        let destination = FileDestination::new(config.destination.clone());
        let driver = ThreadedDestinationDriver::new(
            shared_queue.clone(),
            destination,
            config.destination.time_reopen(),
            &dest_reactor,
        );
        dest_reactor.schedule_task(Box::new(DestinationWorker::new(driver)));

        let sink = Arc::new(Mutex::new(QueueSinkNode::new(shared_queue, dest_events.clone())));

        let persist = if config.persist_path.is_empty() {
            None
        } else {
            Some(PersistStore::open(&config.persist_path)?)
        };
        let persist_name = logpipe_core::persist::persist_name("file", &config.source_path, &config.source_path);

        let source = Arc::new(Mutex::new(FileSourceNode::new(
            PathBuf::from(&config.source_path),
            config.framing.max_message_length,
            parse_options,
            persist,
            persist_name,
            config.framing.follow_freq(),
            Arc::clone(&sink),
            parse_error_counter,
        )));

        let mut source_reactor = Reactor::new();
        let source_events = source_reactor.event_handle();
        source_reactor.schedule_task(Box::new(Shared::new(Arc::clone(&source))));

        let graph = PipeGraph::new(vec![
            Box::new(Shared::new(source)) as Box<dyn Node>,
            Box::new(Shared::new(sink)) as Box<dyn Node>,
        ]);

        Ok(Pipeline {
            graph,
            source_reactor,
            dest_reactor,
            dest_events,
            source_events,
        })
    }

    /// Runs leaves-first init across the graph (spec §4.4): the sink first, then the source
    /// (which opens the file and restores its framer cursor).
    pub fn init(&mut self) -> anyhow::Result<()> {
        self.graph.init().map_err(anyhow::Error::from)
    }

    /// A handle that posts a shutdown event into the destination's reactor.
    pub fn destination_shutdown_handle(&self) -> EventHandle {
        self.dest_events.clone()
    }

    /// A handle that posts a shutdown event into the source's reactor.
    pub fn source_shutdown_handle(&self) -> EventHandle {
        self.source_events.clone()
    }

    /// Spawns the destination's reactor on its own OS thread (spec §5) and runs the source's
    /// reactor on the calling thread until it receives a shutdown event, then joins the
    /// destination thread and tears the graph down in reverse order.
    pub fn run(mut self) -> anyhow::Result<()> {
        let dest_handle: JoinHandle<()> = thread::spawn(move || self.dest_reactor.run());
        self.source_reactor.run();
        self.dest_events.post(Event::Shutdown);
        dest_handle
            .join()
            .map_err(|_| anyhow::anyhow!("destination reactor thread panicked"))?;
        self.graph.deinit();
        Ok(())
    }
}

impl From<InitError> for anyhow::Error {
    fn from(error: InitError) -> Self {
        anyhow::Error::from(logpipe_common::error::EngineError::Configuration(error.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_source_file(dir: &TempDir, lines: &[&str]) -> PathBuf {
        let path = dir.path().join("source.log");
        let mut file = fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    fn config(dir: &TempDir, source_path: PathBuf) -> Config {
        let mut config = Config::default();
        config.source_path = source_path.to_str().unwrap().to_string();
        config.persist_path = dir.path().join("persist.json").to_str().unwrap().to_string();
        config.destination.path = dir.path().join("out.log").to_str().unwrap().to_string();
        config.destination.time_reopen_secs = 1;
        config
    }

    #[test]
    fn shared_queue_forwards_every_operation() {
        let stored = Arc::new(Counter::new());
        let dropped = Arc::new(Counter::new());
        let inner = MemoryQueue::new(4, stored, dropped);
        let mut shared = SharedQueue { inner: Arc::new(Mutex::new(inner)) };

        assert_eq!(
            shared.push_tail(Message::new_empty(), PathOptions::default()),
            PushResult::Stored
        );
        assert_eq!(shared.length(), 1);
        assert!(shared.pop_head().is_some());
        assert_eq!(shared.backlog_len(), 1);
        shared.ack_backlog(1);
        assert_eq!(shared.backlog_len(), 0);
    }

    #[test]
    fn pipeline_drains_one_line_from_source_to_destination_file() {
        let dir = TempDir::new().unwrap();
        let source_path = write_source_file(&dir, &["<34>Oct 11 22:14:15 mymachine su: hello"]);
        let config = config(&dir, source_path);
        let stats = Arc::new(StatsRegistry::new());

        let mut pipeline = Pipeline::build(&config, &stats).unwrap();
        pipeline.init().unwrap();

        let source_shutdown = pipeline.source_shutdown_handle();
        let worker = thread::spawn(move || pipeline.run());

        // Give both reactors a chance to poll their scheduled tasks once (the source reads and
        // forwards the one line, the destination drains it into the output file), then stop
        // both reactors the same way an operator's shutdown signal would.
        thread::sleep(Duration::from_millis(200));
        source_shutdown.post(Event::Shutdown);
        worker.join().unwrap().unwrap();

        let contents = fs::read_to_string(&config.destination.path).unwrap();
        assert!(contents.contains("hello"));
    }
}
