//! Coordinator: the single serialized cycle that turns a batch of
//! filesystem changes into a published epoch (spec.md §4.C9, §5 — "no
//! background thread may write facts outside the coordinator lock").
//!
//! `reconcile_lock` is a plain `parking_lot::Mutex<()>` held for the whole
//! cycle; every write-bearing step (reconcile, structural extraction,
//! resolution, epoch publish) happens while it's held, so two overlapping
//! watch batches, or a watch batch racing a manual CLI reindex, never
//! interleave. Grounded on `examples/original_source/.../coordinator.py`'s
//! `run_cycle` (reconcile -> route -> extract -> resolve -> publish),
//! translated from its asyncio lock to `parking_lot::Mutex` since this
//! crate's store/lexical calls are themselves synchronous.

use crate::core::config::{Config, ObservabilitySink};
use crate::core::error::Result;
use crate::discovery::{self, route};
use crate::epoch::EpochManager;
use crate::lexical::{FileDoc, LexicalIndex};
use crate::reconcile::{ReconcileResult, Reconciler};
use crate::resolve::{ResolveResult, Resolver};
use crate::store::Store;
use crate::structural::{BatchResult, StructuralIndexer};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct CycleResult {
    pub reconcile: ReconcileResult,
    pub routed_files: usize,
    pub unrouted_files: usize,
    pub structural: Option<BatchResult>,
    pub resolve: Option<ResolveResult>,
    pub epoch_id: Option<i64>,
}

pub struct Coordinator {
    store: Store,
    repo_root: PathBuf,
    config: Config,
    lexical: LexicalIndex,
    epoch_manager: EpochManager,
    sink: Arc<dyn ObservabilitySink>,
    reconcile_lock: Mutex<()>,
}

impl Coordinator {
    pub fn new(store: Store, repo_root: PathBuf, config: Config, lexical: LexicalIndex, sink: Arc<dyn ObservabilitySink>) -> Self {
        let epoch_manager = EpochManager::new(store.clone(), repo_root.clone(), sink.clone());
        Self {
            store,
            repo_root,
            config,
            lexical,
            epoch_manager,
            sink,
            reconcile_lock: Mutex::new(()),
        }
    }

    /// Run recovery once at startup, before the watcher or any CLI command
    /// can observe the store. Must happen before the first `cycle`.
    pub fn recover(&self) -> Result<()> {
        self.epoch_manager.recover(&self.lexical)
    }

    /// Run one full reconcile -> route -> extract -> resolve -> publish
    /// cycle for `paths` (or every git-tracked file when `None`), holding
    /// `reconcile_lock` for its entire duration.
    pub fn cycle(&self, paths: Option<&[PathBuf]>) -> Result<CycleResult> {
        let _guard = self.reconcile_lock.lock();
        let mut result = CycleResult::default();

        let reconcile_result = Reconciler::new(self.store.clone(), self.repo_root.clone(), self.config.clone()).reconcile(paths)?;
        self.sink.reconcile_completed(
            reconcile_result.files_added,
            reconcile_result.files_modified,
            reconcile_result.files_removed,
        );

        // A changed `.cplignore` can change which files are even tracked
        // (newly-excluded paths must be dropped, newly-included ones
        // picked up); run one unscoped reconcile to reconverge before
        // continuing this cycle's extraction.
        let reconcile_result = if reconcile_result.cplignore_changed && paths.is_some() {
            debug!("cplignore changed, running full reconcile");
            Reconciler::new(self.store.clone(), self.repo_root.clone(), self.config.clone()).reconcile(None)?
        } else {
            reconcile_result
        };

        if reconcile_result.files_changed() == 0 {
            result.reconcile = reconcile_result;
            return Ok(result);
        }

        let candidates = discovery::discover(&self.repo_root, &self.config);
        let contexts = discovery::sync_contexts(&self.store, &candidates)?;

        let pending = self.pending_files()?;
        let routing = route(&pending, &contexts);
        result.routed_files = routing.routed.len();
        result.unrouted_files = routing.unrouted.len();
        for (path, reason) in &routing.unrouted {
            warn!(path, reason, "file not routed to any context");
        }

        let mut by_context: HashMap<i64, Vec<String>> = HashMap::new();
        for (path, context_id) in routing.routed {
            by_context.entry(context_id).or_default().push(path);
        }

        let mut all_extracted: Vec<String> = Vec::new();
        let mut structural_total = BatchResult::default();
        let mut resolve_total = ResolveResult::default();

        for (context_id, files) in &by_context {
            let indexer = StructuralIndexer::new(self.store.clone(), self.repo_root.clone(), self.config.clone());
            let batch = indexer.index_batch(files, *context_id)?;
            structural_total.files.extend(batch.files.iter().cloned());
            structural_total.errors.extend(batch.errors.iter().cloned());
            structural_total.duration_ms += batch.duration_ms;

            let resolver = Resolver::new(self.store.clone(), self.repo_root.clone(), self.config.clone());
            let resolved = resolver.resolve_batch(files)?;
            resolve_total.imports_resolved += resolved.imports_resolved;
            resolve_total.import_refs_upgraded += resolved.import_refs_upgraded;
            resolve_total.type_traced_upgraded += resolved.type_traced_upgraded;
            resolve_total.config_refs_found += resolved.config_refs_found;
            resolve_total.shape_matched += resolved.shape_matched;
            resolve_total.shape_ambiguous += resolved.shape_ambiguous;

            all_extracted.extend(files.iter().cloned());

            let mut writer = self.lexical.writer()?;
            for file in files {
                let Ok(content) = std::fs::read_to_string(self.repo_root.join(file)) else {
                    continue;
                };
                let symbols = self.def_symbols_for(file)?;
                writer.add_file(FileDoc {
                    path: file,
                    content: &content,
                    symbols: &symbols,
                    context_id: *context_id as u64,
                    start_line: 1,
                    end_line: content.lines().count().max(1) as u64,
                })?;
            }

            let epoch = self.epoch_manager.publish(&mut writer, files, reconcile_result.head_after.clone())?;
            result.epoch_id = Some(epoch.epoch_id);
        }

        result.reconcile = reconcile_result;
        result.structural = Some(structural_total);
        result.resolve = Some(resolve_total);
        Ok(result)
    }

    /// Files the reconciler marked dirty (added or modified; `indexed_at`
    /// reset to NULL) and still awaiting structural extraction.
    fn pending_files(&self) -> Result<Vec<String>> {
        self.store.session(|conn| {
            let mut stmt = conn.prepare("SELECT path FROM files WHERE indexed_at IS NULL")?;
            let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })
    }

    fn def_symbols_for(&self, path: &str) -> Result<String> {
        self.store.session(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.name FROM def_facts d JOIN files f ON f.id = d.file_id WHERE f.path = ?1",
            )?;
            let rows = stmt.query_map([path], |r| r.get::<_, String>(0))?;
            let mut names = Vec::new();
            for r in rows {
                names.push(r?);
            }
            Ok(names.join(" "))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{IndexConfig, NullSink};
    use std::fs;

    fn setup() -> (tempfile::TempDir, Coordinator) {
        let dir = tempfile::tempdir().unwrap();
        Config::ensure_state_dir(dir.path()).unwrap();
        let store = Store::open_in_memory(IndexConfig::default()).unwrap();
        let lexical = LexicalIndex::open_or_create(&Config::lexical_dir(dir.path())).unwrap();
        let coordinator = Coordinator::new(
            store,
            dir.path().to_path_buf(),
            Config::default(),
            lexical,
            Arc::new(NullSink),
        );
        (dir, coordinator)
    }

    #[test]
    fn test_cycle_with_no_changes_is_noop() {
        let (_dir, coordinator) = setup();
        let result = coordinator.cycle(Some(&[])).unwrap();
        assert_eq!(result.reconcile.files_changed(), 0);
        assert!(result.epoch_id.is_none());
    }

    #[test]
    fn test_cycle_indexes_and_publishes() {
        let (dir, coordinator) = setup();
        fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        fs::write(dir.path().join("a.rs"), "fn main() {}\n").unwrap();
        coordinator.recover().unwrap();
        let result = coordinator.cycle(Some(&[PathBuf::from("a.rs")])).unwrap();
        assert_eq!(result.reconcile.files_added, 1);
        assert!(result.epoch_id.is_some());
    }
}
