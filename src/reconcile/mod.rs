//! C5 Reconciler: compare working-tree content hashes against the store
//! and classify every tracked file as added, modified, removed, or
//! unchanged.
//!
//! Grounded on `examples/original_source/.../db/reconcile.py`'s
//! `Reconciler.reconcile`, translated from its SQLModel session/BulkWriter
//! split into this crate's `Store::write_txn` (RepoState, serializable) and
//! `Store::bulk_writer` (File rows, high volume) — the same split the
//! original draws between `immediate_transaction` and `bulk_writer`.
//!
//! INVARIANT (unchanged from the original): `reconcile` must be serialized
//! by the coordinator's single `reconcile_lock` (see `crate::watch`); nothing
//! here takes a lock of its own beyond what `Store` already provides.

use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::ignore::compute_combined_hash;
use crate::core::vcs::Vcs;
use crate::parse::{sha256_hex, Language};
use crate::store::facts::RepoState;
use crate::store::Store;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct ReconcileResult {
    pub files_checked: usize,
    pub files_added: usize,
    pub files_modified: usize,
    pub files_removed: usize,
    pub files_unchanged: usize,
    pub head_before: Option<String>,
    pub head_after: Option<String>,
    pub duration_ms: f64,
    pub errors: Vec<String>,
    /// Set when the combined `.cplignore` hash changed since the last
    /// reconcile — signals the coordinator to schedule a full re-index.
    pub cplignore_changed: bool,
}

impl ReconcileResult {
    pub fn files_changed(&self) -> usize {
        self.files_added + self.files_modified + self.files_removed
    }
}

struct PendingFile {
    path: String,
    content_hash: String,
    language: String,
    line_count: i64,
}

pub struct Reconciler {
    store: Store,
    repo_root: PathBuf,
    config: Config,
}

impl Reconciler {
    pub fn new(store: Store, repo_root: PathBuf, config: Config) -> Self {
        Self {
            store,
            repo_root,
            config,
        }
    }

    /// Reconcile `paths` (repo-relative, or absolute under `repo_root`),
    /// or every git-tracked file when `paths` is `None`.
    pub fn reconcile(&self, paths: Option<&[PathBuf]>) -> Result<ReconcileResult> {
        let start = Instant::now();
        let mut result = ReconcileResult::default();

        let vcs = Vcs::open(&self.repo_root);
        let current_head = vcs.head();
        result.head_after = current_head.clone();

        let current_cplignore_hash = compute_combined_hash(&self.repo_root, &self.config);

        // RepoState update happens first and alone, inside a serializable
        // transaction, so two racing reconciles never interleave their
        // view of `last_seen_head`/`cplignore_hash`.
        let previous_state: RepoState = self.store.write_txn(|txn| {
            let previous: RepoState = txn.query_row(
                "SELECT last_seen_head, checked_at, current_epoch_id, cplignore_hash FROM repo_state WHERE id = 1",
                [],
                |row| {
                    Ok(RepoState {
                        last_seen_head: row.get(0)?,
                        checked_at: row.get(1)?,
                        current_epoch_id: row.get(2)?,
                        cplignore_hash: row.get(3)?,
                    })
                },
            )?;

            let now = chrono::Utc::now().timestamp();
            txn.execute(
                "UPDATE repo_state SET last_seen_head = ?1, checked_at = ?2, cplignore_hash = ?3 WHERE id = 1",
                rusqlite::params![
                    current_head,
                    now,
                    current_cplignore_hash.clone().unwrap_or_default()
                ],
            )?;
            Ok(previous)
        })?;

        result.head_before = previous_state.last_seen_head;
        result.cplignore_changed = previous_state.cplignore_hash
            != current_cplignore_hash.clone().unwrap_or_default();

        let files_to_check: Vec<String> = match paths {
            Some(paths) => paths
                .iter()
                .map(|p| normalize_path(p, &self.repo_root))
                .collect(),
            None => {
                if vcs.is_repo() {
                    vcs.tracked_files()?
                } else {
                    warn!("no git repository found at {:?}; reconcile requires explicit paths", self.repo_root);
                    Vec::new()
                }
            }
        };

        let db_hashes = self.db_hashes(&files_to_check)?;

        let mut added = Vec::new();
        let mut modified = Vec::new();
        let mut removed_paths = Vec::new();

        for rel_path in &files_to_check {
            result.files_checked += 1;
            let abs_path = self.repo_root.join(rel_path);

            if !abs_path.exists() {
                if db_hashes.contains_key(rel_path) {
                    removed_paths.push(rel_path.clone());
                    result.files_removed += 1;
                }
                continue;
            }

            let content = match std::fs::read(&abs_path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    result.errors.push(format!("error reading {rel_path}: {e}"));
                    continue;
                }
            };
            let content_hash = sha256_hex(&content);
            let line_count = content.iter().filter(|&&b| b == b'\n').count() as i64 + 1;
            let language = Language::from_path(Path::new(rel_path)).as_str().to_string();

            match db_hashes.get(rel_path) {
                None => {
                    added.push(PendingFile {
                        path: rel_path.clone(),
                        content_hash,
                        language,
                        line_count,
                    });
                    result.files_added += 1;
                }
                Some(old_hash) if old_hash != &content_hash => {
                    modified.push(PendingFile {
                        path: rel_path.clone(),
                        content_hash,
                        language,
                        line_count,
                    });
                    result.files_modified += 1;
                }
                Some(_) => result.files_unchanged += 1,
            }
        }

        self.apply_changes(&added, &modified, &removed_paths)?;

        result.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            checked = result.files_checked,
            added = result.files_added,
            modified = result.files_modified,
            removed = result.files_removed,
            cplignore_changed = result.cplignore_changed,
            "reconcile complete"
        );
        Ok(result)
    }

    fn db_hashes(&self, paths: &[String]) -> Result<std::collections::HashMap<String, String>> {
        if paths.is_empty() {
            return Ok(std::collections::HashMap::new());
        }
        self.store.session(|conn| {
            let placeholders = vec!["?"; paths.len()].join(", ");
            let sql = format!("SELECT path, content_hash FROM files WHERE path IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> =
                paths.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut map = std::collections::HashMap::new();
            for row in rows {
                let (path, hash) = row?;
                map.insert(path, hash);
            }
            Ok(map)
        })
    }

    fn apply_changes(
        &self,
        added: &[PendingFile],
        modified: &[PendingFile],
        removed_paths: &[String],
    ) -> Result<()> {
        if added.is_empty() && modified.is_empty() && removed_paths.is_empty() {
            return Ok(());
        }

        let writer = self.store.bulk_writer()?;

        if !added.is_empty() {
            writer.insert_many(
                "INSERT INTO files (path, content_hash, language, line_count, indexed_at, last_indexed_epoch)
                 VALUES (?1, ?2, ?3, ?4, NULL, NULL)",
                added.iter().map(|f| {
                    vec![
                        Box::new(f.path.clone()) as Box<dyn rusqlite::ToSql>,
                        Box::new(f.content_hash.clone()),
                        Box::new(f.language.clone()),
                        Box::new(f.line_count),
                    ]
                }),
            )?;
        }

        if !modified.is_empty() {
            writer.upsert_many(
                "INSERT INTO files (path, content_hash, language, line_count, indexed_at, last_indexed_epoch)
                 VALUES (?1, ?2, ?3, ?4, NULL, NULL)
                 ON CONFLICT(path) DO UPDATE SET
                     content_hash = excluded.content_hash,
                     language = excluded.language,
                     line_count = excluded.line_count,
                     indexed_at = NULL",
                modified.iter().map(|f| {
                    vec![
                        Box::new(f.path.clone()) as Box<dyn rusqlite::ToSql>,
                        Box::new(f.content_hash.clone()),
                        Box::new(f.language.clone()),
                        Box::new(f.line_count),
                    ]
                }),
            )?;
        }

        if !removed_paths.is_empty() {
            let placeholders: Vec<String> = (1..=removed_paths.len()).map(|i| format!("?{i}")).collect();
            let sql = format!("DELETE FROM files WHERE path IN ({})", placeholders.join(", "));
            let params: Vec<&dyn rusqlite::ToSql> =
                removed_paths.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
            writer.delete_where(&sql, &params)?;
        }

        writer.commit()
    }
}

fn normalize_path(path: &Path, repo_root: &Path) -> String {
    let rel = path.strip_prefix(repo_root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IndexConfig;
    use std::fs;

    fn setup() -> (tempfile::TempDir, Reconciler) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory(IndexConfig::default()).unwrap();
        let reconciler = Reconciler::new(store, dir.path().to_path_buf(), Config::default());
        (dir, reconciler)
    }

    #[test]
    fn test_added_file_detected() {
        let (dir, reconciler) = setup();
        fs::write(dir.path().join("a.rs"), "fn main() {}\n").unwrap();
        let result = reconciler
            .reconcile(Some(&[PathBuf::from("a.rs")]))
            .unwrap();
        assert_eq!(result.files_added, 1);
        assert_eq!(result.files_modified, 0);
        assert_eq!(result.files_changed(), 1);
    }

    #[test]
    fn test_unchanged_on_second_pass() {
        let (dir, reconciler) = setup();
        fs::write(dir.path().join("a.rs"), "fn main() {}\n").unwrap();
        reconciler
            .reconcile(Some(&[PathBuf::from("a.rs")]))
            .unwrap();
        let result = reconciler
            .reconcile(Some(&[PathBuf::from("a.rs")]))
            .unwrap();
        assert_eq!(result.files_unchanged, 1);
        assert_eq!(result.files_changed(), 0);
    }

    #[test]
    fn test_modified_file_resets_indexed_at() {
        let (dir, reconciler) = setup();
        fs::write(dir.path().join("a.rs"), "fn main() {}\n").unwrap();
        reconciler
            .reconcile(Some(&[PathBuf::from("a.rs")]))
            .unwrap();
        fs::write(dir.path().join("a.rs"), "fn main() { println!(\"x\"); }\n").unwrap();
        let result = reconciler
            .reconcile(Some(&[PathBuf::from("a.rs")]))
            .unwrap();
        assert_eq!(result.files_modified, 1);
    }

    #[test]
    fn test_removed_file_detected() {
        let (dir, reconciler) = setup();
        fs::write(dir.path().join("a.rs"), "fn main() {}\n").unwrap();
        reconciler
            .reconcile(Some(&[PathBuf::from("a.rs")]))
            .unwrap();
        fs::remove_file(dir.path().join("a.rs")).unwrap();
        let result = reconciler
            .reconcile(Some(&[PathBuf::from("a.rs")]))
            .unwrap();
        assert_eq!(result.files_removed, 1);
    }

    #[test]
    fn test_cplignore_change_flagged() {
        let (dir, reconciler) = setup();
        let first = reconciler.reconcile(Some(&[])).unwrap();
        assert!(!first.cplignore_changed);
        fs::write(dir.path().join(".cplignore"), "*.log\n").unwrap();
        let second = reconciler.reconcile(Some(&[])).unwrap();
        assert!(second.cplignore_changed);
        let third = reconciler.reconcile(Some(&[])).unwrap();
        assert!(!third.cplignore_changed);
    }
}
