// SPDX-License-Identifier: Apache-2.0

use crate::writers::{FileWriter, StdWriter};
use std::fmt;
use std::sync::{LazyLock, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::reload::Handle;
use tracing_subscriber::{fmt as fmt_layer, reload, EnvFilter, Layer, Registry};

/// Error raised while configuring the engine's own `tracing` subscriber.
#[derive(Debug)]
pub struct LogError(String);

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for LogError {}

impl From<&str> for LogError {
    fn from(msg: &str) -> Self {
        LogError(msg.to_string())
    }
}

impl From<String> for LogError {
    fn from(msg: String) -> Self {
        LogError(msg)
    }
}

/// Log level for filtering log events.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogEventLevel {
    /// Designates very low priority, often extremely verbose, information.
    Trace = 0,
    /// Designates lower priority information.
    Debug = 1,
    /// Designates useful information.
    Info = 2,
    /// Designates hazardous situations.
    Warn = 3,
    /// Designates very serious errors.
    Error = 4,
}

/// Configuration for file-based logging.
pub struct FileConfig {
    /// Path where log files will be written.
    pub path: String,
    /// Maximum size in bytes for each log file. 0 disables size-based rotation.
    pub max_size_bytes: u64,
    /// Maximum total number of files (current + rotated) to keep on disk. 0 disables cleanup.
    pub max_files: u64,
}

/// Target for standard stream output.
#[derive(Debug, Clone, Copy)]
pub enum StdTarget {
    Out,
    Err,
}

/// Configuration for standard stream logging.
pub struct StdConfig {
    pub target: StdTarget,
}

/// Logger with layer-based architecture: a reloadable filter plus a reloadable set of output
/// layers, so `file`/`std` destinations for the engine's own diagnostics can be toggled at
/// runtime the same way a pipeline destination can be reconfigured.
struct Logger {
    #[allow(clippy::type_complexity)]
    layer_handle: Handle<
        Vec<Box<dyn Layer<Layered<reload::Layer<EnvFilter, Registry>, Registry>> + Send + Sync>>,
        Layered<reload::Layer<EnvFilter, Registry>, Registry>,
    >,
    filter_handle: Handle<EnvFilter, Registry>,
    #[allow(dead_code)]
    _guard: Option<DefaultGuard>,
    file_config: Option<FileConfig>,
    std_config: Option<StdConfig>,
}

impl Logger {
    #[cfg(test)]
    fn setup() -> Result<Self, LogError> {
        Self::setup_with_global(false)
    }

    fn setup_global() -> Result<Self, LogError> {
        Self::setup_with_global(true)
    }

    fn setup_with_global(global: bool) -> Result<Self, LogError> {
        let layers = vec![];
        let env_filter = env_filter();
        let (filter_layer, filter_handle) = reload::Layer::new(env_filter);
        let (layers_layer, layer_handle) = reload::Layer::new(layers);

        let subscriber = tracing_subscriber::registry()
            .with(filter_layer)
            .with(layers_layer);

        if global {
            match tracing::subscriber::set_global_default(subscriber) {
                Ok(_) => Ok(Self {
                    layer_handle,
                    filter_handle,
                    _guard: None,
                    file_config: None,
                    std_config: None,
                }),
                Err(_e) => Err(LogError::from("failed to set global default subscriber")),
            }
        } else {
            Ok(Self {
                layer_handle,
                filter_handle,
                _guard: Some(tracing::subscriber::set_default(subscriber)),
                file_config: None,
                std_config: None,
            })
        }
    }

    fn configure(&self) -> Result<(), LogError> {
        self.layer_handle
            .modify(|layers| {
                layers.clear();

                if let Some(file_config) = &self.file_config {
                    if let Ok(file_layer) = file_layer(file_config) {
                        layers.push(file_layer);
                    }
                }

                if let Some(std_config) = &self.std_config {
                    if let Ok(std_layer) = std_layer(std_config) {
                        layers.push(std_layer);
                    }
                }
            })
            .map_err(|e| LogError::from(format!("failed to update logger configuration: {e}")))?;

        Ok(())
    }

    fn disable_file(&mut self) -> Result<(), LogError> {
        self.file_config = None;
        self.configure()
    }

    fn configure_file(&mut self, file_config: FileConfig) -> Result<(), LogError> {
        self.file_config = Some(file_config);
        self.configure()
    }

    fn disable_std(&mut self) -> Result<(), LogError> {
        self.std_config = None;
        self.configure()
    }

    fn configure_std(&mut self, std_config: StdConfig) -> Result<(), LogError> {
        self.std_config = Some(std_config);
        self.configure()
    }

    fn set_log_level(&self, log_level: LogEventLevel) -> Result<(), LogError> {
        let level_filter = LevelFilter::from(log_level);
        let new_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level_filter.to_string().to_lowercase()));

        self.filter_handle
            .modify(|filter| {
                *filter = new_filter;
            })
            .map_err(|e| LogError::from(format!("failed to update log level: {e}")))?;

        Ok(())
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(LevelFilter::INFO.to_string().to_lowercase()))
}

#[allow(clippy::type_complexity)]
fn std_layer(
    config: &StdConfig,
) -> Result<
    Box<dyn Layer<Layered<reload::Layer<EnvFilter, Registry>, Registry>> + Send + Sync + 'static>,
    LogError,
> {
    let writer = StdWriter::new(config.target);

    Ok(fmt_layer::layer()
        .with_writer(writer)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .boxed())
}

#[allow(clippy::type_complexity)]
fn file_layer(
    config: &FileConfig,
) -> Result<
    Box<dyn Layer<Layered<reload::Layer<EnvFilter, Registry>, Registry>> + Send + Sync + 'static>,
    LogError,
> {
    let writer =
        FileWriter::new(config).map_err(|e| LogError::from(format!("failed to create file writer: {e}")))?;

    Ok(fmt_layer::layer()
        .with_writer(writer)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .json()
        .boxed())
}

impl From<LogEventLevel> for LevelFilter {
    fn from(level: LogEventLevel) -> Self {
        match level {
            LogEventLevel::Trace => LevelFilter::TRACE,
            LogEventLevel::Debug => LevelFilter::DEBUG,
            LogEventLevel::Info => LevelFilter::INFO,
            LogEventLevel::Warn => LevelFilter::WARN,
            LogEventLevel::Error => LevelFilter::ERROR,
        }
    }
}

static LOGGER: LazyLock<Mutex<Option<Logger>>> = LazyLock::new(|| Mutex::new(None));

/// Configures the global logger to write to a file in JSON format.
pub fn logger_configure_file(file_config: FileConfig) -> Result<(), LogError> {
    let mut logger_guard = LOGGER
        .lock()
        .map_err(|e| LogError::from(format!("failed to acquire logger lock: {e}")))?;

    if let Some(logger) = logger_guard.as_mut() {
        logger.configure_file(file_config)
    } else {
        let mut logger = Logger::setup_global()?;
        logger.configure_file(file_config)?;
        *logger_guard = Some(logger);
        Ok(())
    }
}

/// Disables file logging for the global logger, keeping other outputs active.
pub fn logger_disable_file() -> Result<(), LogError> {
    let mut logger_guard = LOGGER
        .lock()
        .map_err(|e| LogError::from(format!("failed to acquire logger lock: {e}")))?;

    match logger_guard.as_mut() {
        Some(logger) => logger.disable_file(),
        None => Err(LogError::from("logger not initialized")),
    }
}

/// Configures the global logger to write to stdout or stderr.
pub fn logger_configure_std(std_config: StdConfig) -> Result<(), LogError> {
    let mut logger_guard = LOGGER
        .lock()
        .map_err(|e| LogError::from(format!("failed to acquire logger lock: {e}")))?;

    if let Some(logger) = logger_guard.as_mut() {
        logger.configure_std(std_config)
    } else {
        let mut logger = Logger::setup_global()?;
        logger.configure_std(std_config)?;
        *logger_guard = Some(logger);
        Ok(())
    }
}

/// Disables standard stream logging for the global logger, keeping other outputs active.
pub fn logger_disable_std() -> Result<(), LogError> {
    let mut logger_guard = LOGGER
        .lock()
        .map_err(|e| LogError::from(format!("failed to acquire logger lock: {e}")))?;

    match logger_guard.as_mut() {
        Some(logger) => logger.disable_std(),
        None => Err(LogError::from("logger not initialized")),
    }
}

/// Sets the minimum log level for the global logger.
pub fn logger_set_log_level(log_level: LogEventLevel) -> Result<(), LogError> {
    let logger_guard = LOGGER
        .lock()
        .map_err(|e| LogError::from(format!("failed to acquire logger lock: {e}")))?;

    match logger_guard.as_ref() {
        Some(logger) => logger.set_log_level(log_level),
        None => Err(LogError::from("logger not initialized")),
    }
}
