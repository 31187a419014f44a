// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared across the engine (spec §7).
//!
//! Per-message and per-peer failures never reach these types — they are absorbed into a
//! parse-error Message or into a driver's own state machine. `EngineError` is reserved for the
//! two kinds that do propagate: configuration errors detected at init, and fatal invariant
//! violations.

use std::fmt;

/// Errors that can surface out of pipeline construction or teardown.
#[derive(Debug)]
pub enum EngineError {
    /// A node or driver failed validation during `init` (spec §4.4, §7 kind 4).
    Configuration(String),
    /// An operation observed a state that can only be reached by a programming error, e.g.
    /// unregistering a counter nobody holds (spec §7 kind 5). Callers should treat this as fatal.
    Invariant(String),
    /// Wraps an I/O failure encountered while loading persisted state or config.
    Io(std::io::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            EngineError::Invariant(msg) => write!(f, "invariant violation: {msg}"),
            EngineError::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err)
    }
}
