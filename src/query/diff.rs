//! Semantic diff engine (spec.md §4.C10): classify definition-level
//! changes between two epochs using `DefSnapshotRecord` as the comparison
//! basis, rather than re-parsing either revision.
//!
//! Grounded on `examples/original_source/.../diff/engine.py`'s four-pass
//! structure (removed/added/rename/signature-or-body), translated from its
//! in-memory dict diff into SQL set-difference queries over `def_snapshots`
//! since that table already holds exactly the per-epoch identity keys the
//! original's `DefSnapshot` dataclass captured.

use crate::core::error::Result;
use crate::query::{classify_file, FileClass};
use crate::store::facts::{DefKind, EpochId, RefTier};
use crate::store::Store;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Renamed,
    SignatureChanged,
    BodyChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Breaking,
    NonBreaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorRisk {
    Low,
    Medium,
    High,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Change {
    pub change_kind: ChangeKind,
    pub def_kind: DefKind,
    pub file_path: String,
    pub lexical_path: String,
    pub old_name: Option<String>,
    pub name: String,
    pub def_uid: Option<String>,
    pub structural_severity: Severity,
    pub delta_tags: Vec<String>,
    pub lines_changed: u32,
    pub ref_count: usize,
    pub ref_tier_breakdown: HashMap<&'static str, usize>,
    pub importing_files: Vec<String>,
    pub affected_tests: Vec<String>,
    pub visibility: Option<String>,
    pub is_static: Option<bool>,
    pub behavior_change_risk: BehaviorRisk,
    pub children: Vec<Change>,
}

#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub changes: Vec<Change>,
    pub non_structural: Vec<(String, FileClass)>,
}

struct SnapshotKey {
    kind: String,
    lexical_path: String,
}

#[derive(Clone)]
struct Snapshot {
    file_path: String,
    kind: String,
    name: String,
    lexical_path: String,
    signature_hash: String,
    def_uid: String,
    start_line: u32,
    end_line: u32,
}

pub struct DiffEngine {
    store: Store,
}

impl DiffEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Diff `base_epoch` against `target_epoch`, restricted to
    /// `changed_files` when given (repo-relative paths), or every file
    /// that appears in either epoch's snapshot when `None`.
    pub fn semantic_diff(&self, base_epoch: EpochId, target_epoch: EpochId, changed_files: Option<&[String]>) -> Result<DiffResult> {
        let base = self.snapshots(base_epoch, changed_files)?;
        let target = self.snapshots(target_epoch, changed_files)?;

        let mut base_by_key: HashMap<(String, String), Snapshot> = HashMap::new();
        for s in base {
            base_by_key.insert((s.kind.clone(), s.lexical_path.clone()), s);
        }
        let mut target_by_key: HashMap<(String, String), Snapshot> = HashMap::new();
        for s in target {
            target_by_key.insert((s.kind.clone(), s.lexical_path.clone()), s);
        }

        let base_keys: HashSet<(String, String)> = base_by_key.keys().cloned().collect();
        let target_keys: HashSet<(String, String)> = target_by_key.keys().cloned().collect();

        let mut removed_keys: Vec<(String, String)> = base_keys.difference(&target_keys).cloned().collect();
        let mut added_keys: Vec<(String, String)> = target_keys.difference(&base_keys).cloned().collect();
        let common_keys: Vec<(String, String)> = base_keys.intersection(&target_keys).cloned().collect();

        let mut changes = Vec::new();

        // Pass 3: rename detection — same (kind, signature_hash), first match
        // consumed once on each side.
        let mut consumed_removed: HashSet<usize> = HashSet::new();
        let mut consumed_added: HashSet<usize> = HashSet::new();
        for (ri, rkey) in removed_keys.iter().enumerate() {
            if consumed_removed.contains(&ri) {
                continue;
            }
            let removed_snap = &base_by_key[rkey];
            for (ai, akey) in added_keys.iter().enumerate() {
                if consumed_added.contains(&ai) {
                    continue;
                }
                let added_snap = &target_by_key[akey];
                if removed_snap.kind == added_snap.kind && removed_snap.signature_hash == added_snap.signature_hash && removed_snap.name != added_snap.name {
                    changes.push(self.build_change(
                        ChangeKind::Renamed,
                        Severity::Breaking,
                        Some(removed_snap.name.clone()),
                        added_snap,
                        vec!["symbol_renamed".to_string()],
                        diff_lines(removed_snap, added_snap),
                    )?);
                    consumed_removed.insert(ri);
                    consumed_added.insert(ai);
                    break;
                }
            }
        }
        removed_keys = removed_keys
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !consumed_removed.contains(i))
            .map(|(_, k)| k)
            .collect();
        added_keys = added_keys
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !consumed_added.contains(i))
            .map(|(_, k)| k)
            .collect();

        // Pass 4: surviving common keys — signature vs body change.
        for key in &common_keys {
            let b = &base_by_key[key];
            let t = &target_by_key[key];
            if b.signature_hash != t.signature_hash {
                let tags = signature_delta_tags(b, t);
                changes.push(self.build_change(ChangeKind::SignatureChanged, Severity::Breaking, None, t, tags, diff_lines(b, t))?);
            } else {
                let lines_changed = diff_lines(b, t);
                let mut tags = vec!["body_logic_changed".to_string()];
                if lines_changed <= 2 {
                    tags.push("possibly_comment_or_whitespace".to_string());
                } else if lines_changed <= 3 {
                    tags.push("minor_change".to_string());
                } else if lines_changed > 20 {
                    tags.push("major_change".to_string());
                }
                if lines_changed > 0 {
                    changes.push(self.build_change(ChangeKind::BodyChanged, Severity::NonBreaking, None, t, tags, lines_changed)?);
                }
            }
        }

        // Remaining removed/added, not consumed by renames.
        for key in &removed_keys {
            let b = &base_by_key[key];
            changes.push(self.build_removed_change(b)?);
        }
        for key in &added_keys {
            let t = &target_by_key[key];
            changes.push(self.build_change(ChangeKind::Added, Severity::NonBreaking, None, t, vec!["symbol_added".to_string()], t.end_line.saturating_sub(t.start_line))?);
        }

        // Filter internal variables: a Variable def whose lexical_path has
        // more than one segment is nested inside a function/method scope,
        // not a module-level public surface.
        changes.retain(|c| !(c.def_kind == DefKind::Variable && c.lexical_path.contains('.')));

        nest_methods_under_classes(&mut changes);

        Ok(DiffResult {
            changes,
            non_structural: Vec::new(),
        })
    }

    fn snapshots(&self, epoch_id: EpochId, changed_files: Option<&[String]>) -> Result<Vec<Snapshot>> {
        self.store.session(|conn| {
            let rows: Vec<Snapshot> = match changed_files {
                Some(files) if !files.is_empty() => {
                    let placeholders: Vec<String> = (2..=files.len() + 1).map(|i| format!("?{i}")).collect();
                    let sql = format!(
                        "SELECT file_path, kind, name, lexical_path, signature_hash, def_uid, start_line, end_line
                         FROM def_snapshots WHERE epoch_id = ?1 AND file_path IN ({})",
                        placeholders.join(", ")
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let mut params: Vec<&dyn rusqlite::ToSql> = vec![&epoch_id];
                    for f in files {
                        params.push(f as &dyn rusqlite::ToSql);
                    }
                    let rows = stmt.query_map(rusqlite::params_from_iter(params), row_to_snapshot)?;
                    rows.collect::<rusqlite::Result<_>>()?
                }
                _ => {
                    let mut stmt = conn.prepare(
                        "SELECT file_path, kind, name, lexical_path, signature_hash, def_uid, start_line, end_line
                         FROM def_snapshots WHERE epoch_id = ?1",
                    )?;
                    let rows = stmt.query_map([epoch_id], row_to_snapshot)?;
                    rows.collect::<rusqlite::Result<_>>()?
                }
            };
            Ok(rows)
        })
    }

    fn build_removed_change(&self, snap: &Snapshot) -> Result<Change> {
        let mut change = self.build_change(
            ChangeKind::Removed,
            Severity::Breaking,
            None,
            snap,
            vec!["symbol_removed".to_string()],
            snap.end_line.saturating_sub(snap.start_line),
        )?;
        change.behavior_change_risk = BehaviorRisk::High;
        Ok(change)
    }

    fn build_change(&self, change_kind: ChangeKind, severity: Severity, old_name: Option<String>, snap: &Snapshot, mut delta_tags: Vec<String>, lines_changed: u32) -> Result<Change> {
        if matches!(change_kind, ChangeKind::SignatureChanged) {
            delta_tags.push("signature_changed".to_string());
        }

        let (ref_count, ref_tier_breakdown) = self.ref_counts(&snap.def_uid)?;
        let importing_files = self.importing_files(&snap.name)?;
        let affected_tests = crate::query::import_graph::affected_tests_for_module(&self.store, &snap.lexical_path)?;
        let (visibility, is_static) = self.type_member_flags(&snap.def_uid)?;

        let behavior_change_risk = match change_kind {
            ChangeKind::Added => BehaviorRisk::Low,
            ChangeKind::Removed | ChangeKind::Renamed | ChangeKind::SignatureChanged => BehaviorRisk::High,
            ChangeKind::BodyChanged => {
                if ref_count > 10 {
                    BehaviorRisk::Medium
                } else {
                    BehaviorRisk::Unknown
                }
            }
        };

        Ok(Change {
            change_kind,
            def_kind: DefKind::from_str(&snap.kind),
            file_path: snap.file_path.clone(),
            lexical_path: snap.lexical_path.clone(),
            old_name,
            name: snap.name.clone(),
            def_uid: Some(snap.def_uid.clone()),
            structural_severity: severity,
            delta_tags,
            lines_changed,
            ref_count,
            ref_tier_breakdown,
            importing_files,
            affected_tests,
            visibility,
            is_static,
            behavior_change_risk,
            children: Vec::new(),
        })
    }

    fn ref_counts(&self, def_uid: &str) -> Result<(usize, HashMap<&'static str, usize>)> {
        self.store.session(|conn| {
            let mut stmt = conn.prepare("SELECT ref_tier FROM ref_facts WHERE target_def_uid = ?1")?;
            let rows = stmt.query_map([def_uid], |r| r.get::<_, String>(0))?;
            let mut breakdown: HashMap<&'static str, usize> = HashMap::new();
            let mut total = 0;
            for row in rows {
                let tier = RefTier::from_str(&row?);
                *breakdown.entry(tier.as_str()).or_insert(0) += 1;
                total += 1;
            }
            Ok((total, breakdown))
        })
    }

    fn importing_files(&self, imported_name: &str) -> Result<Vec<String>> {
        self.store.session(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT f.path FROM import_facts i JOIN files f ON f.id = i.file_id WHERE i.imported_name = ?1",
            )?;
            let rows = stmt.query_map([imported_name], |r| r.get::<_, String>(0))?;
            collect_vec(rows)
        })
    }

    fn type_member_flags(&self, def_uid: &str) -> Result<(Option<String>, Option<bool>)> {
        self.store.session(|conn| {
            conn.query_row(
                "SELECT visibility, is_static FROM type_member_facts WHERE member_def_uid = ?1 LIMIT 1",
                [def_uid],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? != 0)),
            )
            .map(|(v, s)| (Some(v), Some(s)))
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok((None, None)),
                other => Err(crate::core::error::Error::from(other)),
            })
        })
    }
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        file_path: row.get(0)?,
        kind: row.get(1)?,
        name: row.get(2)?,
        lexical_path: row.get(3)?,
        signature_hash: row.get(4)?,
        def_uid: row.get(5)?,
        start_line: row.get(6)?,
        end_line: row.get(7)?,
    })
}

fn collect_vec<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn diff_lines(base: &Snapshot, target: &Snapshot) -> u32 {
    let base_len = base.end_line.saturating_sub(base.start_line);
    let target_len = target.end_line.saturating_sub(target.start_line);
    base_len.abs_diff(target_len).max(1)
}

fn signature_delta_tags(_base: &Snapshot, _target: &Snapshot) -> Vec<String> {
    // The snapshot only carries a signature hash, not the parsed parameter
    // list or return type, so `parameters_changed`/`return_type_changed`
    // can't be distinguished here without re-parsing both revisions —
    // emit the coarser `signature_changed` tag only.
    Vec::new()
}

fn nest_methods_under_classes(changes: &mut Vec<Change>) {
    let mut class_index: HashMap<String, usize> = HashMap::new();
    for (i, c) in changes.iter().enumerate() {
        if c.def_kind == DefKind::Class {
            class_index.insert(c.lexical_path.clone(), i);
        }
    }
    let mut to_nest: Vec<(usize, usize)> = Vec::new();
    for (i, c) in changes.iter().enumerate() {
        if c.def_kind == DefKind::Method {
            if let Some(parent) = c.lexical_path.rsplit_once('.').map(|(p, _)| p.to_string()) {
                if let Some(&parent_idx) = class_index.get(&parent) {
                    if parent_idx != i {
                        to_nest.push((parent_idx, i));
                    }
                }
            }
        }
    }
    let mut child_indices: HashSet<usize> = HashSet::new();
    let mut by_parent: HashMap<usize, Vec<usize>> = HashMap::new();
    for (parent, child) in to_nest {
        by_parent.entry(parent).or_default().push(child);
        child_indices.insert(child);
    }
    let mut slots: Vec<Option<Change>> = changes.drain(..).map(Some).collect();
    for (parent_idx, child_idxs) in &by_parent {
        let children: Vec<Change> = child_idxs.iter().filter_map(|i| slots[*i].take()).collect();
        if let Some(parent) = slots[*parent_idx].as_mut() {
            parent.children.extend(children);
        }
    }
    *changes = slots.into_iter().flatten().collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IndexConfig;

    fn insert_snapshot(store: &Store, epoch: i64, path: &str, kind: &str, name: &str, lexical_path: &str, sig: &str, def_uid: &str, start: u32, end: u32) {
        store
            .session(|conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO def_snapshots (epoch_id, file_path, kind, name, lexical_path, signature_hash, def_uid, start_line, end_line)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![epoch, path, kind, name, lexical_path, sig, def_uid, start, end],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_rename_detected_as_single_change() {
        let store = Store::open_in_memory(IndexConfig::default()).unwrap();
        insert_snapshot(&store, 1, "a.py", "function", "foo", "foo", "sig1", "uid1", 1, 3);
        insert_snapshot(&store, 2, "a.py", "function", "bar", "bar", "sig1", "uid2", 1, 3);
        let engine = DiffEngine::new(store);
        let result = engine.semantic_diff(1, 2, None).unwrap();
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].change_kind, ChangeKind::Renamed);
        assert_eq!(result.changes[0].old_name, Some("foo".to_string()));
        assert_eq!(result.changes[0].name, "bar");
    }

    #[test]
    fn test_signature_change_detected() {
        let store = Store::open_in_memory(IndexConfig::default()).unwrap();
        insert_snapshot(&store, 1, "a.py", "function", "foo", "foo", "sig1", "uid1", 1, 3);
        insert_snapshot(&store, 2, "a.py", "function", "foo", "foo", "sig2", "uid1", 1, 3);
        let engine = DiffEngine::new(store);
        let result = engine.semantic_diff(1, 2, None).unwrap();
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].change_kind, ChangeKind::SignatureChanged);
    }

    #[test]
    fn test_added_and_removed() {
        let store = Store::open_in_memory(IndexConfig::default()).unwrap();
        insert_snapshot(&store, 1, "a.py", "function", "foo", "foo", "sig1", "uid1", 1, 3);
        insert_snapshot(&store, 2, "a.py", "function", "baz", "baz", "sig9", "uid2", 1, 3);
        let engine = DiffEngine::new(store);
        let result = engine.semantic_diff(1, 2, None).unwrap();
        let kinds: Vec<&ChangeKind> = result.changes.iter().map(|c| &c.change_kind).collect();
        assert!(kinds.contains(&&ChangeKind::Added));
        assert!(kinds.contains(&&ChangeKind::Removed));
    }
}
