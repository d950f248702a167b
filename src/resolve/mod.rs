//! C7 Resolver: upgrade reference quality beyond the same-file pass
//! already done at extraction time (`structural::StructuralIndexer`),
//! per spec.md §4.C7. Four passes, each fail-open — a pass that can't
//! resolve something leaves the ref exactly as it found it, never
//! downgrades `ref_tier`.
//!
//! Pass 1 (same-file token matching) lives in `structural::insert_refs`
//! already, at extraction time, since it needs no cross-file state.
//! Passes 2-5 here need the whole batch's files present in the store
//! first, so they run as a separate step after `StructuralIndexer::index_batch`
//! commits.
//!
//! Grounded on `examples/original_source/.../resolve/resolver.py`'s pass
//! ordering and on `src/store/bulk.rs` for batching every pass's writes
//! into one transaction. Reads happen through `Store::session` before any
//! `Store::bulk_writer` is opened in the same pass, since `BulkWriter` and
//! `session` share one non-reentrant `parking_lot::Mutex` guarding the
//! connection.

pub mod module_path;
pub mod shape;

use crate::core::config::Config;
use crate::core::error::Result;
use crate::store::facts::RefTier;
use crate::store::Store;
use module_path::ModulePathIndex;
use regex::Regex;
use shape::ClassShape;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    pub imports_resolved: usize,
    pub import_refs_upgraded: usize,
    pub type_traced_upgraded: usize,
    pub config_refs_found: usize,
    pub shape_matched: usize,
    pub shape_ambiguous: usize,
}

pub struct Resolver {
    store: Store,
    repo_root: PathBuf,
    config: Config,
}

impl Resolver {
    pub fn new(store: Store, repo_root: PathBuf, config: Config) -> Self {
        Self {
            store,
            repo_root,
            config,
        }
    }

    /// Run passes 2-5 against every file in `paths` (repo-relative).
    /// `paths` identifies which files' refs/imports are candidates for
    /// upgrade; the module-path index and type-member lookups span the
    /// whole repo regardless, since an import can resolve to any tracked
    /// file.
    pub fn resolve_batch(&self, paths: &[String]) -> Result<ResolveResult> {
        let mut result = ResolveResult::default();
        let file_ids = self.file_ids(paths)?;
        if file_ids.is_empty() {
            return Ok(result);
        }

        self.pass2_import_resolution(&file_ids, &mut result)?;
        self.pass3_type_traced(&file_ids, &mut result)?;
        self.pass4_config_refs(paths, &mut result)?;
        self.pass5_shape_inference(&file_ids, &mut result)?;

        debug!(
            imports_resolved = result.imports_resolved,
            import_refs_upgraded = result.import_refs_upgraded,
            type_traced_upgraded = result.type_traced_upgraded,
            config_refs_found = result.config_refs_found,
            shape_matched = result.shape_matched,
            shape_ambiguous = result.shape_ambiguous,
            "resolve batch complete"
        );
        Ok(result)
    }

    fn file_ids(&self, paths: &[String]) -> Result<Vec<i64>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        self.store.session(|conn| {
            let placeholders = vec!["?"; paths.len()].join(", ");
            let sql = format!("SELECT id FROM files WHERE path IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> = paths.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(rusqlite::params_from_iter(params), |r| r.get::<_, i64>(0))?;
            let mut ids = Vec::new();
            for r in rows {
                ids.push(r?);
            }
            Ok(ids)
        })
    }

    /// Pass 2: populate `ImportFact.resolved_path` via the module-path
    /// index; upgrade a STRONG import ref naming an alias to PROVEN when
    /// the resolved file has exactly one matching top-level def.
    fn pass2_import_resolution(&self, file_ids: &[i64], result: &mut ResolveResult) -> Result<()> {
        struct Unresolved {
            id: i64,
            file_id: i64,
            file_path: String,
            imported_name: String,
            source_literal: Option<String>,
            alias: Option<String>,
        }

        let (all_paths, rows): (Vec<String>, Vec<Unresolved>) = self.store.session(|conn| {
            let mut stmt = conn.prepare("SELECT path FROM files")?;
            let all_paths: Vec<String> = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<rusqlite::Result<_>>()?;

            let placeholders = vec!["?"; file_ids.len()].join(", ");
            let sql = format!(
                "SELECT i.id, i.file_id, f.path, i.imported_name, i.source_literal, i.alias
                 FROM import_facts i JOIN files f ON f.id = i.file_id
                 WHERE i.resolved_path IS NULL AND i.file_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> = file_ids.iter().map(|i| i as &dyn rusqlite::ToSql).collect();
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params), |r| {
                    Ok(Unresolved {
                        id: r.get(0)?,
                        file_id: r.get(1)?,
                        file_path: r.get(2)?,
                        imported_name: r.get(3)?,
                        source_literal: r.get(4)?,
                        alias: r.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<_>>()?;
            Ok((all_paths, rows))
        })?;

        if rows.is_empty() {
            return Ok(());
        }

        let module_index = ModulePathIndex::build(&all_paths);

        struct Resolved {
            import_id: i64,
            resolved_path: String,
            alias_lookup: Option<(i64, String)>, // (file_id, alias)
        }
        let mut resolved_rows = Vec::new();
        for row in &rows {
            let Some(literal) = &row.source_literal else { continue };
            let Some(resolved_path) = module_index.resolve(&row.file_path, literal) else { continue };
            let alias_lookup = row.alias.clone().map(|a| (row.file_id, a));
            resolved_rows.push((row, Resolved {
                import_id: row.id,
                resolved_path,
                alias_lookup,
            }));
        }

        // Gather the target-file def lookups and existing ref states needed
        // to decide alias upgrades, all before opening a bulk writer.
        let mut alias_targets: HashMap<(String, String), Option<String>> = HashMap::new();
        for (_, r) in &resolved_rows {
            if let Some((_, alias)) = &r.alias_lookup {
                alias_targets.entry((r.resolved_path.clone(), alias.clone())).or_insert(None);
            }
        }
        for key in alias_targets.clone().keys() {
            let (path, alias) = key.clone();
            let def_uid: Option<String> = self.store.session(|conn| {
                conn.query_row(
                    "SELECT d.def_uid FROM def_facts d JOIN files f ON f.id = d.file_id
                     WHERE f.path = ?1 AND d.name = ?2",
                    rusqlite::params![path, alias],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(crate::core::error::Error::from(other)),
                })
            })?;
            alias_targets.insert(key, def_uid);
        }

        let writer = self.store.bulk_writer()?;
        for (row, r) in &resolved_rows {
            writer.execute(
                "UPDATE import_facts SET resolved_path = ?1 WHERE id = ?2",
                rusqlite::params![r.resolved_path, r.import_id],
            )?;
            result.imports_resolved += 1;

            if let Some((_, alias)) = &r.alias_lookup {
                if let Some(Some(def_uid)) = alias_targets.get(&(r.resolved_path.clone(), alias.clone())) {
                    let updated = writer.execute(
                        "UPDATE ref_facts SET target_def_uid = ?1, ref_tier = ?2
                         WHERE file_id = ?3 AND role = 'import' AND token_text = ?4 AND ref_tier = ?5",
                        rusqlite::params![
                            def_uid,
                            RefTier::Proven.as_str(),
                            row.file_id,
                            row.imported_name,
                            RefTier::Strong.as_str(),
                        ],
                    )?;
                    result.import_refs_upgraded += updated;
                }
            }
        }
        writer.commit()
    }

    /// Pass 3: trace `obj.member` accesses where `obj`'s declared type is
    /// known (a `LocalBindFact` in the same file) against `TypeMemberFact`
    /// rows for that type.
    fn pass3_type_traced(&self, file_ids: &[i64], result: &mut ResolveResult) -> Result<()> {
        struct Access {
            id: i64,
            file_id: i64,
            ref_id: i64,
            receiver_name: String,
            first_hop: Option<String>,
        }

        let accesses: Vec<Access> = self.store.session(|conn| {
            let placeholders = vec!["?"; file_ids.len()].join(", ");
            let sql = format!(
                "SELECT id, file_id, ref_id, receiver_name, chain_json FROM member_access_facts
                 WHERE resolution_method IS NULL AND file_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> = file_ids.iter().map(|i| i as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(rusqlite::params_from_iter(params), |r| {
                let chain_json: String = r.get(4)?;
                Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?, r.get::<_, String>(3)?, chain_json))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (id, file_id, ref_id, receiver_name, chain_json) = row?;
                let chain: Vec<String> = serde_json::from_str(&chain_json).unwrap_or_default();
                out.push(Access {
                    id,
                    file_id,
                    ref_id,
                    receiver_name,
                    first_hop: chain.first().cloned(),
                });
            }
            Ok(out)
        })?;

        if accesses.is_empty() {
            return Ok(());
        }

        struct Upgrade {
            access_id: i64,
            ref_id: i64,
            member_def_uid: String,
        }
        let mut upgrades = Vec::new();
        for access in &accesses {
            let Some(first_hop) = &access.first_hop else { continue };
            let declared_type: Option<String> = self.store.session(|conn| {
                conn.query_row(
                    "SELECT declared_type FROM local_bind_facts
                     WHERE file_id = ?1 AND name = ?2 AND declared_type IS NOT NULL LIMIT 1",
                    rusqlite::params![access.file_id, access.receiver_name],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(crate::core::error::Error::from(other)),
                })
            })?;
            let Some(declared_type) = declared_type else { continue };

            let member_def_uid: Option<String> = self.store.session(|conn| {
                conn.query_row(
                    "SELECT member_def_uid FROM type_member_facts
                     WHERE parent_type_name = ?1 AND member_name = ?2 AND member_def_uid IS NOT NULL LIMIT 1",
                    rusqlite::params![declared_type, first_hop],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(crate::core::error::Error::from(other)),
                })
            })?;
            if let Some(member_def_uid) = member_def_uid {
                upgrades.push(Upgrade {
                    access_id: access.id,
                    ref_id: access.ref_id,
                    member_def_uid,
                });
            }
        }

        if upgrades.is_empty() {
            return Ok(());
        }
        let writer = self.store.bulk_writer()?;
        for u in &upgrades {
            writer.execute(
                "UPDATE member_access_facts SET resolution_method = 'type_traced' WHERE id = ?1",
                rusqlite::params![u.access_id],
            )?;
            writer.execute(
                "UPDATE ref_facts SET target_def_uid = ?1, ref_tier = ?2 WHERE id = ?3",
                rusqlite::params![u.member_def_uid, RefTier::Proven.as_str(), u.ref_id],
            )?;
            result.type_traced_upgraded += 1;
        }
        writer.commit()
    }

    /// Pass 4: scan config-like files (TOML/YAML/JSON/Makefile) in `paths`
    /// for identifier-shaped tokens and resolve them against the
    /// module-path index, recording hits as `certain` `ImportFact`s of
    /// kind `config_file_ref`.
    fn pass4_config_refs(&self, paths: &[String], result: &mut ResolveResult) -> Result<()> {
        let config_paths: Vec<&String> = paths.iter().filter(|p| is_config_file(p)).collect();
        if config_paths.is_empty() {
            return Ok(());
        }

        let all_paths: Vec<String> = self.store.session(|conn| {
            let mut stmt = conn.prepare("SELECT path FROM files")?;
            Ok(stmt.query_map([], |r| r.get::<_, String>(0))?.collect::<rusqlite::Result<_>>()?)
        })?;
        let module_index = ModulePathIndex::build(&all_paths);

        let file_ids: HashMap<String, i64> = self.store.session(|conn| {
            let placeholders = vec!["?"; paths.len()].join(", ");
            let sql = format!("SELECT path, id FROM files WHERE path IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> = paths.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(rusqlite::params_from_iter(params), |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
            let mut map = HashMap::new();
            for row in rows {
                let (p, id) = row?;
                map.insert(p, id);
            }
            Ok(map)
        })?;

        struct Hit {
            file_id: i64,
            unit_id: i64,
            token: String,
            resolved: String,
        }
        let mut hits = Vec::new();
        for path in &config_paths {
            let Some(&file_id) = file_ids.get(path.as_str()) else { continue };
            let abs = self.repo_root.join(path);
            let Ok(content) = std::fs::read_to_string(&abs) else { continue };
            for token in config_identifier_tokens(&content) {
                if let Some(resolved) = module_index.resolve(path, &token) {
                    hits.push(Hit { file_id, unit_id: 0, token, resolved });
                }
            }
        }

        if hits.is_empty() {
            return Ok(());
        }
        let writer = self.store.bulk_writer()?;
        for hit in &hits {
            writer.execute(
                "INSERT INTO import_facts (file_id, unit_id, imported_name, source_literal, resolved_path, import_kind, alias, certainty)
                 VALUES (?1, ?2, ?3, ?3, ?4, 'config_file_ref', NULL, 'certain')",
                rusqlite::params![hit.file_id, hit.unit_id, hit.token, hit.resolved],
            )?;
            writer.execute(
                "INSERT INTO ref_facts (file_id, target_def_uid, token_text, role, ref_tier, start_line, start_col, end_line, end_col)
                 VALUES (?1, NULL, ?2, 'import', ?3, 0, 0, 0, 0)",
                rusqlite::params![hit.file_id, hit.token, RefTier::Proven.as_str()],
            )?;
            result.config_refs_found += 1;
        }
        writer.commit()
    }

    /// Pass 5: for member accesses pass 3 left unresolved, score the
    /// accessed chain against every known class's member set
    /// (intra-procedural: only the one access's own chain is the observed
    /// shape, not an aggregate across the receiver's other uses).
    fn pass5_shape_inference(&self, file_ids: &[i64], result: &mut ResolveResult) -> Result<()> {
        struct Access {
            id: i64,
            ref_id: i64,
            current_tier: String,
            chain: Vec<String>,
        }
        let accesses: Vec<Access> = self.store.session(|conn| {
            let placeholders = vec!["?"; file_ids.len()].join(", ");
            let sql = format!(
                "SELECT m.id, m.ref_id, r.ref_tier, m.chain_json FROM member_access_facts m
                 JOIN ref_facts r ON r.id = m.ref_id
                 WHERE m.resolution_method IS NULL AND m.ambiguous = 0 AND m.file_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> = file_ids.iter().map(|i| i as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(rusqlite::params_from_iter(params), |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, String>(2)?, r.get::<_, String>(3)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (id, ref_id, current_tier, chain_json) = row?;
                let chain: Vec<String> = serde_json::from_str(&chain_json).unwrap_or_default();
                out.push(Access { id, ref_id, current_tier, chain });
            }
            Ok(out)
        })?;
        if accesses.is_empty() {
            return Ok(());
        }

        struct TypeRow {
            type_name: String,
            def_uid: String,
            members: Vec<(String, bool)>,
        }
        let types: Vec<TypeRow> = self.store.session(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.parent_type_name, t.parent_def_uid, t.member_name, d.kind
                 FROM type_member_facts t LEFT JOIN def_facts d ON d.def_uid = t.member_def_uid",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            })?;
            let mut by_type: HashMap<(String, String), Vec<(String, bool)>> = HashMap::new();
            for row in rows {
                let (type_name, def_uid, member_name, kind) = row?;
                let is_method = matches!(kind.as_deref(), Some("method") | Some("function"));
                by_type.entry((type_name, def_uid)).or_default().push((member_name, is_method));
            }
            Ok(by_type
                .into_iter()
                .map(|((type_name, def_uid), members)| TypeRow { type_name, def_uid, members })
                .collect())
        })?;
        if types.is_empty() {
            return Ok(());
        }

        let threshold = self.config.resolve.shape_match_threshold;
        let bonus = self.config.resolve.shape_method_bonus;

        enum Outcome {
            Matched { access_id: i64, ref_id: i64, current_tier: String, member_def_uid: String, candidates_json: String },
            Ambiguous { access_id: i64, candidates_json: String },
        }
        let mut outcomes = Vec::new();
        for access in &accesses {
            let candidates: Vec<ClassShape<'_>> = types
                .iter()
                .map(|t| ClassShape {
                    type_name: &t.type_name,
                    def_uid: &t.def_uid,
                    members: &t.members,
                })
                .collect();
            let ranked = shape::rank_candidates(&access.chain, &candidates, threshold, bonus);
            if ranked.is_empty() {
                continue;
            }
            let candidates_json = serde_json::to_string(
                &ranked.iter().map(|c| (c.def_uid.clone(), c.score)).collect::<Vec<_>>(),
            )?;
            let tied = ranked.len() > 1 && (ranked[0].score - ranked[1].score).abs() < 1e-9;
            if tied {
                outcomes.push(Outcome::Ambiguous { access_id: access.id, candidates_json });
            } else {
                outcomes.push(Outcome::Matched {
                    access_id: access.id,
                    ref_id: access.ref_id,
                    current_tier: access.current_tier.clone(),
                    member_def_uid: ranked[0].def_uid.clone(),
                    candidates_json,
                });
            }
        }

        if outcomes.is_empty() {
            return Ok(());
        }
        let writer = self.store.bulk_writer()?;
        for outcome in &outcomes {
            match outcome {
                Outcome::Matched { access_id, ref_id, current_tier, member_def_uid, candidates_json } => {
                    writer.execute(
                        "UPDATE member_access_facts SET resolution_method = 'shape_matched', candidates_json = ?1 WHERE id = ?2",
                        rusqlite::params![candidates_json, access_id],
                    )?;
                    if RefTier::from_str(current_tier) < RefTier::Proven {
                        writer.execute(
                            "UPDATE ref_facts SET target_def_uid = ?1, ref_tier = ?2 WHERE id = ?3",
                            rusqlite::params![member_def_uid, RefTier::Proven.as_str(), ref_id],
                        )?;
                    }
                    result.shape_matched += 1;
                }
                Outcome::Ambiguous { access_id, candidates_json } => {
                    writer.execute(
                        "UPDATE member_access_facts SET ambiguous = 1, candidates_json = ?1 WHERE id = ?2",
                        rusqlite::params![candidates_json, access_id],
                    )?;
                    result.shape_ambiguous += 1;
                }
            }
        }
        writer.commit()
    }
}

fn is_config_file(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".toml")
        || lower.ends_with(".yaml")
        || lower.ends_with(".yml")
        || lower.ends_with(".json")
        || lower.ends_with("makefile")
        || lower.rsplit('/').next().map(|n| n == "makefile").unwrap_or(false)
}

fn config_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']([A-Za-z_][A-Za-z0-9_./-]{2,})["']"#).unwrap())
}

/// Extract quoted, path/module-shaped tokens from a config file's text —
/// the only identifier-like content a TOML/YAML/JSON value reliably
/// carries without a format-specific parser per key.
fn config_identifier_tokens(content: &str) -> Vec<String> {
    config_token_regex()
        .captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IndexConfig;
    use crate::reconcile::Reconciler;
    use crate::structural::StructuralIndexer;
    use std::fs;

    fn setup() -> (tempfile::TempDir, Store, Config) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory(IndexConfig::default()).unwrap();
        (dir, store, Config::default())
    }

    #[test]
    fn test_config_identifier_tokens_extracts_quoted_values() {
        let content = "target = \"src/pkg/mod_a.rs\"\nother = \"ab\"\n";
        let tokens = config_identifier_tokens(content);
        assert!(tokens.contains(&"src/pkg/mod_a.rs".to_string()));
    }

    #[test]
    fn test_resolve_batch_no_files_is_noop() {
        let (dir, store, config) = setup();
        let resolver = Resolver::new(store, dir.path().to_path_buf(), config);
        let result = resolver.resolve_batch(&[]).unwrap();
        assert_eq!(result.imports_resolved, 0);
    }

    #[test]
    fn test_pass2_resolves_relative_import() {
        let (dir, store, config) = setup();
        fs::write(dir.path().join("b.py"), "def helper():\n    pass\n").unwrap();
        fs::write(dir.path().join("a.py"), "from .b import helper\n").unwrap();

        let reconciler = Reconciler::new(store.clone(), dir.path().to_path_buf(), config.clone());
        reconciler
            .reconcile(Some(&[std::path::PathBuf::from("a.py"), std::path::PathBuf::from("b.py")]))
            .unwrap();
        let indexer = StructuralIndexer::new(store.clone(), dir.path().to_path_buf(), config.clone());
        indexer.index_batch(&["a.py".to_string(), "b.py".to_string()], 1).unwrap();

        let resolver = Resolver::new(store.clone(), dir.path().to_path_buf(), config);
        let result = resolver.resolve_batch(&["a.py".to_string(), "b.py".to_string()]).unwrap();
        assert!(result.imports_resolved >= 1);

        let resolved_path: String = store
            .session(|conn| {
                Ok(conn.query_row(
                    "SELECT resolved_path FROM import_facts WHERE imported_name = 'helper'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(resolved_path, "b.py");
    }
}
