// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Message model, wire framing, syslog parsing, the pipe graph and the threaded destination
//! driver — the engine core that `logpipe` wires into a running pipeline.

pub mod ack;
pub mod destination;
pub mod framing;
pub mod graph;
pub mod message;
pub mod nvtable;
pub mod persist;
pub mod queue;
pub mod reactor;
pub mod stamp;
pub mod stats;
pub mod syslog;
pub mod tags;

pub use ack::{AckChain, Outcome};
pub use destination::{Destination, State as DestinationState, ThreadedDestinationDriver};
pub use framing::{Framer, ReadOutcome};
pub use graph::{InitError, Node, NodeKind, NotifyCode, PathOptions, PipeGraph, QueueResult};
pub use message::{Flags, Message, SourceAddress};
pub use nvtable::NvTable;
pub use persist::PersistStore;
pub use queue::{ExternalQueue, MemoryQueue, Queue, RemoteWriter};
pub use reactor::{EventHandle, Reactor};
pub use stamp::Stamp;
pub use stats::{ClusterKey, CounterType, StatsRegistry};
pub use syslog::ParseOptions;
pub use tags::TagSet;
