// SPDX-License-Identifier: Apache-2.0

//! Structured, runtime-reconfigurable logging for the engine's own diagnostics — destination
//! drivers and the reactor log through `tracing`, and this crate lets an operator point those
//! logs at a file or a standard stream (or both) and change the level, without restarting.

mod logger;
mod writers;

pub use logger::{
    logger_configure_file, logger_configure_std, logger_disable_file, logger_disable_std,
    logger_set_log_level, FileConfig, LogError, LogEventLevel, StdConfig, StdTarget,
};
