//! C6 Structural indexer: turn a batch of parsed files into the relational
//! fact tables, with full replace-not-merge semantics per file.
//!
//! Grounded on `examples/original_source/tests/index/unit/test_structural.py`
//! (the original `structural.py` source itself isn't in the retrieved
//! pack, only its test suite) for `_compute_def_uid`'s input tuple and
//! `_find_containing_scope`'s innermost-scope-wins rule — the latter is
//! already implemented once, in `src/parse/treesitter.rs`'s
//! `ScopeBuilder::containing`, so the parser hands us `parent_scope`/
//! `containing_scope` indices already resolved rather than redoing it here.
//! The bulk-insert-per-file-with-prior-delete pattern follows
//! `src/store/bulk.rs`'s `BulkWriter`, used here across a whole batch in
//! one transaction rather than one per file.

use crate::core::config::Config;
use crate::core::error::Result;
use crate::parse::{self, ExtractedUnit, RawDef, RawScope};
use crate::store::facts::{DefKind, RefTier, ScopeKind};
use crate::store::Store;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub file_path: String,
    pub defs_extracted: usize,
    pub refs_extracted: usize,
    pub used_fallback: bool,
    pub skipped_too_large: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub files: Vec<ExtractionResult>,
    pub errors: Vec<String>,
    pub duration_ms: f64,
}

pub struct StructuralIndexer {
    store: Store,
    repo_root: PathBuf,
    config: Config,
}

impl StructuralIndexer {
    pub fn new(store: Store, repo_root: PathBuf, config: Config) -> Self {
        Self {
            store,
            repo_root,
            config,
        }
    }

    /// Index `paths` (repo-relative) under `context_id`. Every file must
    /// already have a `File` row (created by the reconciler); a path with
    /// no stored row is recorded as an error and skipped.
    pub fn index_batch(&self, paths: &[String], context_id: i64) -> Result<BatchResult> {
        let start = Instant::now();
        let mut batch = BatchResult::default();

        let file_ids = self.lookup_file_ids(paths)?;

        let mut per_file_units: Vec<(String, i64, ExtractedUnit)> = Vec::new();
        for path in paths {
            let Some(&file_id) = file_ids.get(path) else {
                batch.errors.push(format!("{path}: not tracked (reconcile first)"));
                continue;
            };

            let abs_path = self.repo_root.join(path);
            let metadata = match std::fs::metadata(&abs_path) {
                Ok(m) => m,
                Err(e) => {
                    batch.errors.push(format!("{path}: {e}"));
                    continue;
                }
            };
            if metadata.len() > self.config.index.max_file_size {
                batch.files.push(ExtractionResult {
                    file_path: path.clone(),
                    skipped_too_large: true,
                    ..Default::default()
                });
                continue;
            }

            let content = match std::fs::read_to_string(&abs_path) {
                Ok(c) => c,
                Err(e) => {
                    batch.errors.push(format!("{path}: not valid UTF-8 or unreadable: {e}"));
                    continue;
                }
            };

            let unit = parse::extract(&abs_path, &content);
            batch.files.push(ExtractionResult {
                file_path: path.clone(),
                defs_extracted: unit.defs.len(),
                refs_extracted: unit.refs.len(),
                used_fallback: unit.used_fallback,
                skipped_too_large: false,
            });
            per_file_units.push((path.clone(), file_id, unit));
        }

        if !per_file_units.is_empty() {
            self.write_batch(&per_file_units, context_id)?;
        }

        batch.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(files = batch.files.len(), errors = batch.errors.len(), "structural index batch complete");
        Ok(batch)
    }

    fn lookup_file_ids(&self, paths: &[String]) -> Result<HashMap<String, i64>> {
        if paths.is_empty() {
            return Ok(HashMap::new());
        }
        self.store.session(|conn| {
            let placeholders = vec!["?"; paths.len()].join(", ");
            let sql = format!("SELECT path, id FROM files WHERE path IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> =
                paths.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut map = HashMap::new();
            for row in rows {
                let (path, id) = row?;
                map.insert(path, id);
            }
            Ok(map)
        })
    }

    fn write_batch(&self, files: &[(String, i64, ExtractedUnit)], context_id: i64) -> Result<()> {
        let writer = self.store.bulk_writer()?;
        let now = chrono::Utc::now().timestamp();

        for (path, file_id, unit) in files {
            for table in [
                "def_facts",
                "ref_facts",
                "scope_facts",
                "import_facts",
                "dynamic_access_sites",
                "export_surfaces",
            ] {
                writer.execute(&format!("DELETE FROM {table} WHERE file_id = ?1"), rusqlite::params![*file_id])?;
            }

            let scope_ids = insert_scopes(&writer, *file_id, &unit.scopes)?;

            let mut def_uids_by_name: HashMap<String, Vec<String>> = HashMap::new();
            let mut def_uid_by_index = Vec::with_capacity(unit.defs.len());
            for def in &unit.defs {
                let def_uid = compute_def_uid(path, def.span.start_line, def.kind, &def.name, &def.signature_hash);
                let lexical_path = lexical_path_for(&unit.scopes, def.parent_scope, &def.name);
                insert_def(&writer, *file_id, context_id, &def_uid, &lexical_path, def)?;
                def_uids_by_name.entry(def.name.clone()).or_default().push(def_uid.clone());
                def_uid_by_index.push(def_uid);
            }

            insert_type_members(&writer, &unit.defs, &unit.scopes, &def_uid_by_index)?;

            let mut export_entries: Vec<(String, Option<String>)> = Vec::new();
            for (i, def) in unit.defs.iter().enumerate() {
                if def.is_exported {
                    export_entries.push((def.name.clone(), Some(def_uid_by_index[i].clone())));
                }
            }
            if !export_entries.is_empty() {
                insert_export_surface(&writer, *file_id, context_id, &export_entries)?;
            }

            let ref_ids = insert_refs(&writer, *file_id, unit, &def_uids_by_name)?;
            insert_access_sites(&writer, *file_id, unit, &ref_ids)?;
            insert_locals(&writer, *file_id, unit, &scope_ids)?;
            insert_dynamic_sites(&writer, *file_id, unit)?;
            insert_imports(&writer, *file_id, context_id, unit)?;

            writer.execute(
                "UPDATE files SET indexed_at = ?1 WHERE id = ?2",
                rusqlite::params![now, *file_id],
            )?;
        }

        writer.commit()
    }
}

fn compute_def_uid(file_path: &str, start_line: u32, kind: DefKind, name: &str, signature_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b"\0");
    hasher.update(start_line.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    hasher.update(signature_hash.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Dotted path from the root scope down to `name`, skipping anonymous
/// (block/lambda) scopes that carry no name.
fn lexical_path_for(scopes: &[RawScope], parent_scope: Option<usize>, name: &str) -> String {
    let mut segments = Vec::new();
    let mut cursor = parent_scope;
    while let Some(idx) = cursor {
        let scope = &scopes[idx];
        if let Some(scope_name) = &scope.name {
            segments.push(scope_name.clone());
        }
        cursor = scope.parent_index;
    }
    segments.reverse();
    segments.push(name.to_string());
    segments.join(".")
}

fn insert_scopes(writer: &crate::store::bulk::BulkWriter<'_>, file_id: i64, scopes: &[RawScope]) -> Result<Vec<i64>> {
    let mut db_ids = Vec::with_capacity(scopes.len());
    for scope in scopes {
        let parent_db_id = scope.parent_index.map(|p| db_ids[p]);
        writer.execute(
            "INSERT INTO scope_facts (file_id, unit_id, kind, parent_scope_id, start_line, start_col, end_line, end_col)
             VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                file_id,
                scope.kind.as_str(),
                parent_db_id,
                scope.span.start_line,
                scope.span.start_col,
                scope.span.end_line,
                scope.span.end_col,
            ],
        )?;
        db_ids.push(writer.last_insert_rowid());
    }
    Ok(db_ids)
}

fn insert_def(
    writer: &crate::store::bulk::BulkWriter<'_>,
    file_id: i64,
    context_id: i64,
    def_uid: &str,
    lexical_path: &str,
    def: &RawDef,
) -> Result<()> {
    writer.execute(
        "INSERT INTO def_facts
             (def_uid, file_id, unit_id, kind, name, qualified_name, lexical_path,
              signature_hash, display_name, start_line, start_col, end_line, end_col, docstring)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(def_uid) DO UPDATE SET
             file_id = excluded.file_id,
             unit_id = excluded.unit_id,
             name = excluded.name,
             qualified_name = excluded.qualified_name,
             lexical_path = excluded.lexical_path,
             signature_hash = excluded.signature_hash,
             display_name = excluded.display_name,
             start_line = excluded.start_line,
             start_col = excluded.start_col,
             end_line = excluded.end_line,
             end_col = excluded.end_col,
             docstring = excluded.docstring",
        rusqlite::params![
            def_uid,
            file_id,
            context_id,
            def.kind.as_str(),
            def.name,
            lexical_path, // qualified_name: no module-naming convention is shared
                          // across every supported language at extraction time,
                          // so this mirrors lexical_path until C7's import
                          // resolution can qualify it with a resolved module key.
            lexical_path,
            def.signature_hash,
            def.display_name,
            def.span.start_line,
            def.span.start_col,
            def.span.end_line,
            def.span.end_col,
            def.docstring,
        ],
    )?;
    Ok(())
}

/// Class-scope defs become `TypeMemberFact` rows for the enclosing class,
/// giving the resolver's type-traced pass (C7 pass 3) something to walk.
fn insert_type_members(
    writer: &crate::store::bulk::BulkWriter<'_>,
    defs: &[RawDef],
    scopes: &[RawScope],
    def_uids: &[String],
) -> Result<()> {
    for (member_idx, member) in defs.iter().enumerate() {
        if member.kind != DefKind::Method && member.kind != DefKind::Function && member.kind != DefKind::Variable {
            continue;
        }
        let Some(parent_scope) = member.parent_scope else { continue };
        let Some((class_name, class_uid)) = nearest_enclosing_class(defs, scopes, def_uids, parent_scope) else {
            continue;
        };
        writer.execute(
            "INSERT INTO type_member_facts
                 (parent_def_uid, parent_type_name, parent_kind, member_name, member_def_uid,
                  type_annotation, visibility, is_static, start_line, start_col, end_line, end_col)
             VALUES (?1, ?2, 'class', ?3, ?4, NULL, ?5, 0, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                class_uid,
                class_name,
                member.name,
                def_uids[member_idx],
                if member.is_exported { "public" } else { "private" },
                member.span.start_line,
                member.span.start_col,
                member.span.end_line,
                member.span.end_col,
            ],
        )?;
    }
    Ok(())
}

/// Walk up from `scope_index` (inclusive) to the nearest `ScopeKind::Class`
/// scope, then match it against a `Class`/`Struct`/`Interface` def sharing
/// its name — the parser records a scope's name but doesn't thread "this is
/// the scope the class def introduces" back onto the `RawDef` itself, so
/// name-matching within the same file stands in for that link.
fn nearest_enclosing_class(
    defs: &[RawDef],
    scopes: &[RawScope],
    def_uids: &[String],
    scope_index: usize,
) -> Option<(String, String)> {
    let mut cursor = Some(scope_index);
    while let Some(idx) = cursor {
        let scope = &scopes[idx];
        if scope.kind == ScopeKind::Class {
            let name = scope.name.as_ref()?;
            return defs
                .iter()
                .enumerate()
                .find(|(_, d)| &d.name == name && matches!(d.kind, DefKind::Class | DefKind::Struct | DefKind::Interface))
                .map(|(i, d)| (d.name.clone(), def_uids[i].clone()));
        }
        cursor = scope.parent_index;
    }
    None
}

fn insert_export_surface(
    writer: &crate::store::bulk::BulkWriter<'_>,
    file_id: i64,
    context_id: i64,
    entries: &[(String, Option<String>)],
) -> Result<()> {
    writer.execute(
        "INSERT INTO export_surfaces (file_id, unit_id) VALUES (?1, ?2)",
        rusqlite::params![file_id, context_id],
    )?;
    let surface_id = writer.last_insert_rowid();
    for (name, def_uid) in entries {
        writer.execute(
            "INSERT INTO export_entries (surface_id, name, def_uid) VALUES (?1, ?2, ?3)",
            rusqlite::params![surface_id, name, def_uid],
        )?;
    }
    Ok(())
}

/// Assigns ref_tier at extraction time per spec.md §4.C6: a call whose
/// token matches a def in the same file is PROVEN; a call anchored by a
/// member-access chain (richer context, still unresolved) starts STRONG;
/// everything else starts ANCHORED. Import-role refs are handled in
/// `insert_imports`, not here.
fn insert_refs(
    writer: &crate::store::bulk::BulkWriter<'_>,
    file_id: i64,
    unit: &ExtractedUnit,
    def_uids_by_name: &HashMap<String, Vec<String>>,
) -> Result<Vec<i64>> {
    let access_ref_indices: std::collections::HashSet<usize> =
        unit.access_sites.iter().map(|a| a.ref_index).collect();

    let mut ref_ids = Vec::with_capacity(unit.refs.len());
    for (i, r) in unit.refs.iter().enumerate() {
        let (target_def_uid, tier) = match def_uids_by_name.get(&r.token_text) {
            Some(uids) => (Some(uids[0].clone()), RefTier::Proven),
            None if access_ref_indices.contains(&i) => (None, RefTier::Strong),
            None => (None, RefTier::Anchored),
        };
        writer.execute(
            "INSERT INTO ref_facts (file_id, target_def_uid, token_text, role, ref_tier, start_line, start_col, end_line, end_col)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                file_id,
                target_def_uid,
                r.token_text,
                r.role.as_str(),
                tier.as_str(),
                r.span.start_line,
                r.span.start_col,
                r.span.end_line,
                r.span.end_col,
            ],
        )?;
        ref_ids.push(writer.last_insert_rowid());
    }
    Ok(ref_ids)
}

fn insert_access_sites(
    writer: &crate::store::bulk::BulkWriter<'_>,
    file_id: i64,
    unit: &ExtractedUnit,
    ref_ids: &[i64],
) -> Result<()> {
    for site in &unit.access_sites {
        let Some(&ref_id) = ref_ids.get(site.ref_index) else { continue };
        let chain_json = serde_json::to_string(&site.chain)?;
        writer.execute(
            "INSERT INTO member_access_facts (file_id, ref_id, receiver_name, chain_json, resolution_method, ambiguous, candidates_json)
             VALUES (?1, ?2, ?3, ?4, NULL, 0, '[]')",
            rusqlite::params![file_id, ref_id, site.receiver_name, chain_json],
        )?;
    }
    Ok(())
}

fn insert_locals(
    writer: &crate::store::bulk::BulkWriter<'_>,
    file_id: i64,
    unit: &ExtractedUnit,
    scope_ids: &[i64],
) -> Result<()> {
    for local in &unit.locals {
        let Some(&scope_id) = scope_ids.get(local.scope_index) else { continue };
        writer.execute(
            "INSERT INTO local_bind_facts (file_id, scope_id, name, declared_type, start_line, start_col, end_line, end_col)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                file_id,
                scope_id,
                local.name,
                local.declared_type,
                local.span.start_line,
                local.span.start_col,
                local.span.end_line,
                local.span.end_col,
            ],
        )?;
    }
    Ok(())
}

fn insert_dynamic_sites(writer: &crate::store::bulk::BulkWriter<'_>, file_id: i64, unit: &ExtractedUnit) -> Result<()> {
    for site in &unit.dynamic_sites {
        writer.execute(
            "INSERT INTO dynamic_access_sites (file_id, kind, start_line, start_col, end_line, end_col)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                file_id,
                site.kind,
                site.span.start_line,
                site.span.start_col,
                site.span.end_line,
                site.span.end_col,
            ],
        )?;
    }
    Ok(())
}

/// `ImportFact` carries its own `certainty` field, separate from the
/// `ref_facts` row inserted alongside it: certainty describes confidence in
/// `resolved_path` (stays `heuristic` until C7 pass 4's config-file
/// references, which resolve against the module-path index before
/// recording anything as `certain`), while the ref's tier follows spec.md
/// §4.C6's rule for import-statement refs — UNKNOWN by default, STRONG when
/// the source literal looks repo-relative (leading `.` or `/`), since a
/// relative literal is the only signal extraction time has for "this
/// resolves inside the repo" before C7 pass 2 runs the module-path index.
fn insert_imports(writer: &crate::store::bulk::BulkWriter<'_>, file_id: i64, context_id: i64, unit: &ExtractedUnit) -> Result<()> {
    for import in &unit.imports {
        let certainty = "heuristic";
        writer.execute(
            "INSERT INTO import_facts (file_id, unit_id, imported_name, source_literal, resolved_path, import_kind, alias, certainty)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7)",
            rusqlite::params![
                file_id,
                context_id,
                import.imported_name,
                import.source_literal,
                import.import_kind,
                import.alias,
                certainty,
            ],
        )?;

        let looks_repo_relative = import
            .source_literal
            .as_deref()
            .is_some_and(|lit| lit.starts_with('.') || lit.starts_with('/'));
        let tier = if looks_repo_relative { RefTier::Strong } else { RefTier::Unknown };
        writer.execute(
            "INSERT INTO ref_facts (file_id, target_def_uid, token_text, role, ref_tier, start_line, start_col, end_line, end_col)
             VALUES (?1, NULL, ?2, 'import', ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                file_id,
                import.imported_name,
                tier.as_str(),
                import.span.start_line,
                import.span.start_col,
                import.span.end_line,
                import.span.end_col,
            ],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IndexConfig;
    use crate::reconcile::Reconciler;
    use std::fs;

    fn setup() -> (tempfile::TempDir, Store, Config) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory(IndexConfig::default()).unwrap();
        (dir, store, Config::default())
    }

    #[test]
    fn test_index_batch_extracts_defs() {
        let (dir, store, config) = setup();
        fs::write(dir.path().join("a.rs"), "pub fn greet() {}\n").unwrap();
        let reconciler = Reconciler::new(store.clone(), dir.path().to_path_buf(), config.clone());
        reconciler
            .reconcile(Some(&[std::path::PathBuf::from("a.rs")]))
            .unwrap();

        let indexer = StructuralIndexer::new(store.clone(), dir.path().to_path_buf(), config);
        let result = indexer.index_batch(&["a.rs".to_string()], 1).unwrap();
        assert_eq!(result.errors.len(), 0);
        assert_eq!(result.files[0].defs_extracted, 1);

        let count: i64 = store
            .session(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM def_facts", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reindex_replaces_not_merges() {
        let (dir, store, config) = setup();
        fs::write(dir.path().join("a.rs"), "pub fn greet() {}\n").unwrap();
        let reconciler = Reconciler::new(store.clone(), dir.path().to_path_buf(), config.clone());
        reconciler
            .reconcile(Some(&[std::path::PathBuf::from("a.rs")]))
            .unwrap();
        let indexer = StructuralIndexer::new(store.clone(), dir.path().to_path_buf(), config);
        indexer.index_batch(&["a.rs".to_string()], 1).unwrap();
        indexer.index_batch(&["a.rs".to_string()], 1).unwrap();

        let count: i64 = store
            .session(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM def_facts", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1, "reindexing must replace, not duplicate, facts");
    }

    #[test]
    fn test_untracked_file_errors() {
        let (dir, store, config) = setup();
        let indexer = StructuralIndexer::new(store, dir.path().to_path_buf(), config);
        let result = indexer.index_batch(&["missing.rs".to_string()], 1).unwrap();
        assert_eq!(result.files.len(), 0);
        assert_eq!(result.errors.len(), 1);
    }
}
