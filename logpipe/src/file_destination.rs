// SPDX-License-Identifier: Apache-2.0

//! The built-in `file` destination (spec §4.6 AMBIENT): a reference `insert` implementation
//! exercising the threaded destination driver end-to-end, grounded on `logpipe-log`'s
//! `CustomFileAppender` (size-based rotation, timestamped rotated filenames, `max-files`
//! retention) but writing pipeline messages rather than the engine's own diagnostics.

use crate::config::DestinationConfig;
use logpipe_core::destination::Destination;
use logpipe_core::message::Message;
use logpipe_core::nvtable;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Renders a Message the way the legacy format would: `HOST PROGRAM[PID]: MESSAGE`, falling
/// back to just `MESSAGE` when the header fields are unset (e.g. a parse-error placeholder).
fn render_line(message: &Message) -> Vec<u8> {
    let host = message.get_value(nvtable::host_key());
    let program = message.get_value(nvtable::program_key());
    let pid = message.get_value(nvtable::pid_key());
    let body = message.get_value(nvtable::message_key());

    let mut line = Vec::with_capacity(host.len() + program.len() + pid.len() + body.len() + 8);
    if !host.is_empty() {
        line.extend_from_slice(&host);
        line.push(b' ');
    }
    if !program.is_empty() {
        line.extend_from_slice(&program);
        if !pid.is_empty() {
            line.push(b'[');
            line.extend_from_slice(&pid);
            line.push(b']');
        }
        line.extend_from_slice(b": ");
    }
    line.extend_from_slice(&body);
    line.push(b'\n');
    line
}

/// A file appender with optional size-based rotation (same discipline as `logpipe-log`'s
/// private `CustomFileAppender`, reimplemented here since this crate writes pipeline messages
/// rather than `tracing` events and so can't reuse that crate's internal writer).
struct RotatingFile {
    path: PathBuf,
    current_size: u64,
    max_size: u64,
    max_files: u64,
    file: fs::File,
}

impl RotatingFile {
    fn open(path: &str, max_size: u64, max_files: u64) -> io::Result<Self> {
        let path = Path::new(path).to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        let current_size = file.metadata()?.len();
        Ok(RotatingFile {
            path,
            current_size,
            max_size,
            max_files,
            file,
        })
    }

    fn rotated_path(&self, timestamp: &str) -> PathBuf {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        match (self.path.file_stem(), self.path.extension()) {
            (Some(stem), Some(ext)) => parent.join(format!(
                "{}_{}.{}",
                stem.to_string_lossy(),
                timestamp,
                ext.to_string_lossy()
            )),
            (Some(stem), None) => parent.join(format!("{}_{}", stem.to_string_lossy(), timestamp)),
            (None, _) => PathBuf::from(format!("{}_{}", self.path.display(), timestamp)),
        }
    }

    fn rotate_if_needed(&mut self) -> io::Result<()> {
        if self.max_size == 0 || self.current_size < self.max_size {
            return Ok(());
        }
        self.file.flush()?;
        let timestamp = chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S%.f").to_string();
        fs::rename(&self.path, self.rotated_path(&timestamp))?;
        self.file = fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.current_size = 0;
        if self.max_files > 0 {
            self.cleanup_old_files()?;
        }
        Ok(())
    }

    fn cleanup_old_files(&self) -> io::Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let stem = match self.path.file_stem() {
            Some(s) => s.to_string_lossy().to_string(),
            None => return Ok(()),
        };
        let prefix = format!("{stem}_");

        let mut rotated: Vec<_> = fs::read_dir(parent)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .collect();
        rotated.sort_by_key(|entry| std::cmp::Reverse(entry.file_name()));

        let keep = (self.max_files as usize).saturating_sub(1);
        for entry in rotated.into_iter().skip(keep) {
            let _ = fs::remove_file(entry.path());
        }
        Ok(())
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.rotate_if_needed()?;
        self.file.write_all(line)?;
        self.current_size += line.len() as u64;
        Ok(())
    }
}

/// The reference `file` destination: `insert` renders and appends a message, returning `false`
/// (suspend-and-retry) on an I/O error (spec §4.6 "User contract").
pub struct FileDestination {
    file: Option<RotatingFile>,
    config: DestinationConfig,
}

impl FileDestination {
    pub fn new(config: DestinationConfig) -> Self {
        FileDestination { file: None, config }
    }
}

impl Destination for FileDestination {
    fn insert(&mut self, message: &Message) -> bool {
        let file = match &mut self.file {
            Some(file) => file,
            None => {
                tracing::error!("file destination insert called before thread_init");
                return false;
            }
        };
        let line = render_line(message);
        match file.write_line(&line) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(error = %error, path = %self.config.path, "file destination write failed, suspending");
                false
            }
        }
    }

    fn thread_init(&mut self) {
        match RotatingFile::open(&self.config.path, self.config.max_size_bytes, self.config.max_files) {
            Ok(file) => self.file = Some(file),
            Err(error) => tracing::error!(error = %error, path = %self.config.path, "failed to open file destination"),
        }
    }

    fn disconnect(&mut self) {
        self.file = None;
    }

    fn thread_deinit(&mut self) {
        self.file = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(path: &Path) -> DestinationConfig {
        DestinationConfig {
            time_reopen_secs: 10,
            path: path.to_str().unwrap().to_string(),
            max_size_bytes: 0,
            max_files: 0,
        }
    }

    #[test]
    fn inserted_message_renders_legacy_style_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        let mut destination = FileDestination::new(config(&path));
        destination.thread_init();

        let message = Message::new_empty();
        message.set_value(nvtable::host_key(), b"myhost");
        message.set_value(nvtable::program_key(), b"su");
        message.set_value(nvtable::pid_key(), b"123");
        message.set_value(nvtable::message_key(), b"hello world");

        assert!(destination.insert(&message));
        destination.thread_deinit();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "myhost su[123]: hello world\n");
    }

    #[test]
    fn insert_before_thread_init_suspends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        let mut destination = FileDestination::new(config(&path));
        let message = Message::new_empty();
        assert!(!destination.insert(&message));
    }

    #[test]
    fn size_based_rotation_creates_a_second_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rotate.log");
        let mut config = config(&path);
        config.max_size_bytes = 5;
        let mut destination = FileDestination::new(config);
        destination.thread_init();

        for _ in 0..3 {
            let message = Message::new_empty();
            message.set_value(nvtable::message_key(), b"123456");
            assert!(destination.insert(&message));
        }

        let count = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("rotate"))
            .count();
        assert!(count >= 2);
    }

    #[test]
    fn parse_error_placeholder_still_renders() {
        let message = Message::parse_error(b"raw unparsed bytes", 13);
        assert!(message.has_tag("parse-error"));
        let line = render_line(&message);
        assert_eq!(line, b"raw unparsed bytes\n");
    }
}
