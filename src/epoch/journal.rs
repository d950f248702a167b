//! Epoch journal: a small JSON crash-recovery marker written to
//! `.codeplane/epoch_<N>.journal` around the two-phase publish in
//! `super::EpochManager::publish` (spec.md §4.C8).
//!
//! Grounded on `examples/original_source/.../db/epoch.py`'s journal file
//! (write-ahead marker, two boolean commit flags, fsync before each state
//! transition) — translated here to `serde_json` + `std::fs::File::sync_all`
//! rather than the original's manual `os.fsync` call, which is the same
//! operation via this stack's idiomatic path.

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub epoch_id: i64,
    pub tantivy_committed: bool,
    pub sqlite_committed: bool,
}

impl Journal {
    pub fn new(epoch_id: i64) -> Self {
        Self {
            epoch_id,
            tantivy_committed: false,
            sqlite_committed: false,
        }
    }

    pub fn path(repo_root: &Path, epoch_id: i64) -> PathBuf {
        Config::journal_path(repo_root, epoch_id)
    }

    /// Write (or overwrite) the journal and fsync it before returning, so a
    /// crash immediately after this call still leaves a durable marker on
    /// disk for `recover` to find.
    pub fn write(&self, repo_root: &Path) -> Result<()> {
        let path = Self::path(repo_root, self.epoch_id);
        let content = serde_json::to_vec(self)?;
        let mut file = std::fs::File::create(&path)?;
        file.write_all(&content)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn delete(repo_root: &Path, epoch_id: i64) -> Result<()> {
        let path = Self::path(repo_root, epoch_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::JournalUnreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| Error::JournalUnreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Find every leftover journal file under `<repo_root>/.codeplane`,
    /// oldest epoch_id first.
    pub fn scan(repo_root: &Path) -> Result<Vec<Self>> {
        let state_dir = Config::state_dir(repo_root);
        if !state_dir.exists() {
            return Ok(Vec::new());
        }
        let mut journals = Vec::new();
        for entry in std::fs::read_dir(&state_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("epoch_") && name.ends_with(".journal") {
                match Self::read(&entry.path()) {
                    Ok(journal) => journals.push(journal),
                    Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable journal"),
                }
            }
        }
        journals.sort_by_key(|j| j.epoch_id);
        Ok(journals)
    }
}
