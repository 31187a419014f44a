// SPDX-License-Identifier: Apache-2.0

//! Persistent state for restart-capable framers (spec §4.3, §6).
//!
//! A key-value file recording, per `persist-name`, a framer's position cursor; entries are
//! keyed by a stable string derived from driver class + id + filename (or a configured
//! override), so a reopen at the same file inode resumes at the byte position last fully
//! consumed (spec §4.3, P-7).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Builds the stable key identifying a restart-capable entity (spec §6: "driver class + id +
/// filename (or configured override)").
pub fn persist_name(driver_class: &str, id: &str, filename: &str) -> String {
    format!("{driver_class}.{id}.{filename}")
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistFile {
    cursors: BTreeMap<String, u64>,
}

/// A key-value persistence store backed by a single JSON file on disk.
pub struct PersistStore {
    path: PathBuf,
    data: PersistFile,
}

impl PersistStore {
    /// Opens (or creates) the persistence file at `path`, loading any existing cursors.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => PersistFile::default(),
            Err(err) => return Err(err),
        };
        Ok(PersistStore { path, data })
    }

    /// *save-state* for one framer: records its byte-offset cursor under `name`.
    pub fn save_state(&mut self, name: &str, cursor: u64) -> io::Result<()> {
        self.data.cursors.insert(name.to_string(), cursor);
        self.flush()
    }

    /// *restore-state* for one framer: the cursor last saved under `name`, or `0` if unknown.
    pub fn restore_state(&self, name: &str) -> u64 {
        self.data.cursors.get(name).copied().unwrap_or(0)
    }

    pub fn remove(&mut self, name: &str) -> io::Result<()> {
        self.data.cursors.remove(name);
        self.flush()
    }

    fn flush(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&self.data).map_err(io::Error::other)?;
        fs::write(&self.path, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn persist_name_combines_class_id_and_filename() {
        assert_eq!(
            persist_name("affile", "src1", "/var/log/messages"),
            "affile.src1./var/log/messages"
        );
    }

    #[test]
    fn round_trips_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.json");

        {
            let mut store = PersistStore::open(&path).unwrap();
            store.save_state("affile.src1.log", 4096).unwrap();
        }

        let reopened = PersistStore::open(&path).unwrap();
        assert_eq!(reopened.restore_state("affile.src1.log"), 4096);
    }

    #[test]
    fn unknown_name_restores_to_zero() {
        let dir = TempDir::new().unwrap();
        let store = PersistStore::open(dir.path().join("persist.json")).unwrap();
        assert_eq!(store.restore_state("never-saved"), 0);
    }

    #[test]
    fn remove_drops_the_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.json");
        let mut store = PersistStore::open(&path).unwrap();
        store.save_state("a", 10).unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.restore_state("a"), 0);
    }
}
