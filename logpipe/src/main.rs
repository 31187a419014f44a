// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use clap::Parser;
use logpipe::{Config, Pipeline};
use logpipe_core::reactor::Event;
use logpipe_core::stats::StatsRegistry;
use logpipe_log::{logger_configure_std, logger_set_log_level, LogEventLevel, StdConfig, StdTarget};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

#[derive(Parser, Debug)]
#[command(about = "Single-source, single-destination syslog collection/routing pipeline")]
struct Cli {
    /// Path to a TOML config file; defaults are used for any knob (or the whole file) omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level for the engine's own diagnostics.
    #[arg(long, value_enum, default_value = "info")]
    log_level: CliLogLevel,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<CliLogLevel> for LogEventLevel {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Trace => LogEventLevel::Trace,
            CliLogLevel::Debug => LogEventLevel::Debug,
            CliLogLevel::Info => LogEventLevel::Info,
            CliLogLevel::Warn => LogEventLevel::Warn,
            CliLogLevel::Error => LogEventLevel::Error,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(error) = logger_configure_std(StdConfig { target: StdTarget::Err }) {
        eprintln!("failed to configure logging: {error}");
        return ExitCode::FAILURE;
    }
    if let Err(error) = logger_set_log_level(cli.log_level.into()) {
        eprintln!("failed to set log level: {error}");
        return ExitCode::FAILURE;
    }

    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("failed to load config from {}: {error:#}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    let stats = Arc::new(StatsRegistry::new());

    let mut pipeline = match Pipeline::build(&config, &stats) {
        Ok(pipeline) => pipeline,
        Err(error) => {
            eprintln!("failed to build pipeline: {error:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = pipeline.init() {
        eprintln!("failed to initialize pipeline: {error}");
        return ExitCode::FAILURE;
    }

    // No signal handling is in scope; an operator stops the pipeline by typing `quit` (or
    // closing stdin) on the controlling terminal.
    let shutdown = pipeline.source_shutdown_handle();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim() == "quit" => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        shutdown.post(Event::Shutdown);
    });

    if let Err(error) = pipeline.run() {
        eprintln!("pipeline run failed: {error:#}");
        return ExitCode::FAILURE;
    }

    print!("{}", stats.format_csv());
    ExitCode::SUCCESS
}
