//! C8 Epoch manager: two-phase commit that publishes a batch of indexed
//! files as one atomically-visible snapshot (spec.md §4.C8).
//!
//! Grounded on `examples/original_source/.../db/epoch.py`'s publish
//! sequence (journal write+fsync, lexical commit, journal update+fsync,
//! serializable store transaction, journal delete) and its startup
//! recovery scan. The store side of the transaction reuses
//! `Store::write_txn`, the same serializable-with-retry primitive
//! `reconcile::Reconciler` already uses for `RepoState`.

pub mod journal;

use crate::core::config::Config;
use crate::core::config::ObservabilitySink;
use crate::core::error::{Error, Result};
use crate::lexical::LexicalIndex;
use crate::store::facts::Epoch;
use crate::store::Store;
use journal::Journal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct EpochManager {
    store: Store,
    repo_root: PathBuf,
    sink: Arc<dyn ObservabilitySink>,
}

impl EpochManager {
    pub fn new(store: Store, repo_root: PathBuf, sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            store,
            repo_root,
            sink,
        }
    }

    /// Run at startup, before any publish: resolve every journal left over
    /// from a crash mid-publish.
    ///
    /// - `sqlite_committed`: the store transaction already landed; the
    ///   publish was successful, only the journal cleanup step was
    ///   interrupted. Delete it.
    /// - `tantivy_committed && !sqlite_committed`: the lexical segment
    ///   committed but the store never recorded the epoch. The store is
    ///   authoritative (spec.md §4.C8), so the lexical index is rolled
    ///   back to agree with it: clear the staged segment and mark every
    ///   file touched by this epoch unindexed so the next cycle restages
    ///   it into the lexical index.
    /// - neither flag set: nothing was ever committed. Delete the journal.
    pub fn recover(&self, lexical: &LexicalIndex) -> Result<()> {
        for j in Journal::scan(&self.repo_root)? {
            if j.sqlite_committed {
                info!(epoch_id = j.epoch_id, "journal already durable, cleaning up");
                Journal::delete(&self.repo_root, j.epoch_id)?;
                continue;
            }
            if j.tantivy_committed {
                warn!(
                    epoch_id = j.epoch_id,
                    "lexical index committed but store never recorded the epoch; rebuilding lexical from store"
                );
                let mut writer = lexical.writer()?;
                writer.clear()?;
                writer.commit_staged()?;
                self.store.write_txn(|txn| {
                    txn.execute(
                        "UPDATE files SET indexed_at = NULL, last_indexed_epoch = NULL",
                        [],
                    )?;
                    Ok(())
                })?;
            }
            Journal::delete(&self.repo_root, j.epoch_id)?;
        }
        Ok(())
    }

    /// Publish a new epoch covering `file_paths` (repo-relative, already
    /// staged into `lexical` by the caller via `LexicalWriter::add_file`).
    pub fn publish(
        &self,
        lexical: &mut crate::lexical::LexicalWriter,
        file_paths: &[String],
        commit_hash: Option<String>,
    ) -> Result<Epoch> {
        let epoch_id = self.store.current_epoch_id()? + 1;
        let journal = Journal::new(epoch_id);
        journal.write(&self.repo_root)?;

        if let Err(e) = lexical.commit_staged() {
            let _ = lexical.discard_staged();
            let _ = Journal::delete(&self.repo_root, epoch_id);
            return Err(e);
        }

        let mut journal = journal;
        journal.tantivy_committed = true;
        journal.write(&self.repo_root)?;

        let published_at = chrono::Utc::now().timestamp();
        let files_indexed = file_paths.len();
        let commit_hash_for_txn = commit_hash.clone();

        self.store.write_txn(|txn| {
            txn.execute(
                "INSERT INTO epochs (epoch_id, published_at, files_indexed, commit_hash) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![epoch_id, published_at, files_indexed as i64, commit_hash_for_txn],
            )?;
            txn.execute(
                "UPDATE repo_state SET current_epoch_id = ?1 WHERE id = 1",
                rusqlite::params![epoch_id],
            )?;

            if !file_paths.is_empty() {
                let placeholders: Vec<String> = (1..=file_paths.len()).map(|i| format!("?{i}")).collect();
                let sql = format!(
                    "UPDATE files SET last_indexed_epoch = {epoch_id}, indexed_at = {published_at} WHERE path IN ({})",
                    placeholders.join(", ")
                );
                let params: Vec<&dyn rusqlite::ToSql> =
                    file_paths.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
                txn.execute(&sql, rusqlite::params_from_iter(params))?;

                let snapshot_sql = format!(
                    "INSERT OR REPLACE INTO def_snapshots
                         (epoch_id, file_path, kind, name, lexical_path, signature_hash, def_uid, start_line, end_line)
                     SELECT {epoch_id}, f.path, d.kind, d.name, d.lexical_path, d.signature_hash, d.def_uid, d.start_line, d.end_line
                     FROM def_facts d JOIN files f ON f.id = d.file_id
                     WHERE f.path IN ({})",
                    placeholders.join(", ")
                );
                let params: Vec<&dyn rusqlite::ToSql> =
                    file_paths.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
                txn.execute(&snapshot_sql, rusqlite::params_from_iter(params))?;
            }
            Ok(())
        })?;

        Journal::delete(&self.repo_root, epoch_id)?;

        debug!(epoch_id, files_indexed, "epoch published");
        self.sink.epoch_published(epoch_id, files_indexed);

        Ok(Epoch {
            epoch_id,
            published_at,
            files_indexed: files_indexed as i64,
            commit_hash,
        })
    }

    /// Block the calling thread until `current_epoch_id >= target` or
    /// `timeout` elapses, polling at roughly 10ms (spec.md §4.C8).
    pub fn await_epoch(&self, target: i64, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.store.current_epoch_id()? >= target {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(Error::GateValidationFailed {
                    reason: format!("epoch {target} not published within {timeout:?}"),
                });
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn config_journal_path(repo_root: &std::path::Path, epoch_id: i64) -> PathBuf {
        Config::journal_path(repo_root, epoch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{IndexConfig, NullSink};

    fn setup() -> (tempfile::TempDir, Store, EpochManager, LexicalIndex) {
        let dir = tempfile::tempdir().unwrap();
        Config::ensure_state_dir(dir.path()).unwrap();
        let store = Store::open_in_memory(IndexConfig::default()).unwrap();
        let lexical = LexicalIndex::open_or_create(&Config::lexical_dir(dir.path())).unwrap();
        let manager = EpochManager::new(store.clone(), dir.path().to_path_buf(), Arc::new(NullSink));
        (dir, store, manager, lexical)
    }

    #[test]
    fn test_publish_advances_current_epoch() {
        let (_dir, store, manager, lexical) = setup();
        let mut writer = lexical.writer().unwrap();
        let epoch = manager.publish(&mut writer, &[], None).unwrap();
        assert_eq!(epoch.epoch_id, 1);
        assert_eq!(store.current_epoch_id().unwrap(), 1);
    }

    #[test]
    fn test_publish_deletes_journal_on_success() {
        let (dir, _store, manager, lexical) = setup();
        let mut writer = lexical.writer().unwrap();
        let epoch = manager.publish(&mut writer, &[], None).unwrap();
        assert!(!Journal::path(dir.path(), epoch.epoch_id).exists());
    }

    #[test]
    fn test_await_epoch_already_published() {
        let (_dir, _store, manager, lexical) = setup();
        let mut writer = lexical.writer().unwrap();
        manager.publish(&mut writer, &[], None).unwrap();
        manager.await_epoch(1, Duration::from_millis(50)).unwrap();
    }

    #[test]
    fn test_await_epoch_times_out() {
        let (_dir, _store, manager, _lexical) = setup();
        let result = manager.await_epoch(5, Duration::from_millis(30));
        assert!(result.is_err());
    }

    #[test]
    fn test_recover_deletes_stale_committed_journal() {
        let (dir, _store, manager, lexical) = setup();
        let mut j = Journal::new(99);
        j.sqlite_committed = true;
        j.write(dir.path()).unwrap();
        manager.recover(&lexical).unwrap();
        assert!(!Journal::path(dir.path(), 99).exists());
    }
}
