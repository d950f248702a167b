//! C10 Query surface: bounded fact queries, semantic diff, import-graph
//! queries, refactor preview/apply (spec.md §4.C10).
//!
//! Readers here are invoked directly by the caller, never through the
//! coordinator lock (spec.md §5: "no reader may take a write lock") —
//! every query in this module reads through `Store::session` only; the one
//! exception is `refactor::RefactorEngine::apply`, which writes through the
//! mutation engine seam, not the store directly.

pub mod diff;
pub mod import_graph;
pub mod refactor;

use crate::core::error::Result;
use crate::store::facts::{DefFact, DefKind, Span};
use crate::store::Store;

pub struct QueryEngine {
    store: Store,
}

impl QueryEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// All defs in `file_id`, capped at `limit` — every fact query in this
    /// surface is bounded, per spec.md §4.C10.
    pub fn list_defs_in_file(&self, file_id: i64, limit: usize) -> Result<Vec<DefFact>> {
        self.store.session(|conn| {
            let mut stmt = conn.prepare(
                "SELECT def_uid, file_id, unit_id, kind, name, qualified_name, lexical_path,
                        signature_hash, display_name, start_line, start_col, end_line, end_col, docstring
                 FROM def_facts WHERE file_id = ?1 ORDER BY start_line LIMIT ?2",
            )?;
            let rows = stmt.query_map(rusqlite::params![file_id, limit as i64], row_to_def_fact)?;
            collect(rows)
        })
    }

    /// Defs named `name` within `unit_id` (a context), capped at `limit`.
    pub fn list_defs_by_name(&self, unit_id: i64, name: &str, limit: usize) -> Result<Vec<DefFact>> {
        self.store.session(|conn| {
            let mut stmt = conn.prepare(
                "SELECT def_uid, file_id, unit_id, kind, name, qualified_name, lexical_path,
                        signature_hash, display_name, start_line, start_col, end_line, end_col, docstring
                 FROM def_facts WHERE unit_id = ?1 AND name = ?2 LIMIT ?3",
            )?;
            let rows = stmt.query_map(rusqlite::params![unit_id, name, limit as i64], row_to_def_fact)?;
            collect(rows)
        })
    }

    pub fn get_def(&self, def_uid: &str) -> Result<Option<DefFact>> {
        self.store.session(|conn| {
            conn.query_row(
                "SELECT def_uid, file_id, unit_id, kind, name, qualified_name, lexical_path,
                        signature_hash, display_name, start_line, start_col, end_line, end_col, docstring
                 FROM def_facts WHERE def_uid = ?1",
                [def_uid],
                row_to_def_fact,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(crate::core::error::Error::from(other)),
            })
        })
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }
}

fn row_to_def_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<DefFact> {
    Ok(DefFact {
        def_uid: row.get(0)?,
        file_id: row.get(1)?,
        unit_id: row.get(2)?,
        kind: DefKind::from_str(&row.get::<_, String>(3)?),
        name: row.get(4)?,
        qualified_name: row.get(5)?,
        lexical_path: row.get(6)?,
        signature_hash: row.get(7)?,
        display_name: row.get(8)?,
        span: Span {
            start_line: row.get(9)?,
            start_col: row.get(10)?,
            end_line: row.get(11)?,
            end_col: row.get(12)?,
        },
        docstring: row.get(13)?,
    })
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Non-structural file classification (spec.md §2 supplement, ported from
/// `diff/engine.py`'s classifier): files without a grammar, or that carry
/// no structural facts, are still meaningful to a diff/coverage report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Prod,
    Test,
    Build,
    Config,
    Docs,
}

pub fn classify_file(path: &str) -> FileClass {
    let lower = path.to_ascii_lowercase();
    let segments: Vec<&str> = lower.split('/').collect();
    let file_name = segments.last().copied().unwrap_or(&lower);

    if segments.iter().any(|s| *s == "tests" || *s == "test" || *s == "__tests__")
        || file_name.starts_with("test_")
        || file_name.ends_with("_test.py")
        || file_name.ends_with(".test.ts")
        || file_name.ends_with(".test.js")
        || file_name.ends_with("_test.go")
        || file_name.ends_with("_test.rs")
        || file_name.ends_with(".spec.ts")
    {
        return FileClass::Test;
    }
    if segments.iter().any(|s| matches!(*s, "build" | "dist" | "target" | "out" | "node_modules")) {
        return FileClass::Build;
    }
    if lower.ends_with(".md") || lower.ends_with(".rst") || segments.iter().any(|s| *s == "docs" || *s == "doc") {
        return FileClass::Docs;
    }
    if lower.ends_with(".toml")
        || lower.ends_with(".yaml")
        || lower.ends_with(".yml")
        || lower.ends_with(".json")
        || lower.ends_with(".ini")
        || file_name == "makefile"
        || file_name == "dockerfile"
    {
        return FileClass::Config;
    }
    FileClass::Prod
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IndexConfig;

    #[test]
    fn test_classify_test_file() {
        assert_eq!(classify_file("tests/unit/test_foo.py"), FileClass::Test);
        assert_eq!(classify_file("src/foo_test.go"), FileClass::Test);
    }

    #[test]
    fn test_classify_config_file() {
        assert_eq!(classify_file("Cargo.toml"), FileClass::Config);
    }

    #[test]
    fn test_classify_prod_file() {
        assert_eq!(classify_file("src/lib.rs"), FileClass::Prod);
    }

    #[test]
    fn test_list_defs_in_file_respects_limit() {
        let store = Store::open_in_memory(IndexConfig::default()).unwrap();
        store
            .session(|conn| {
                conn.execute(
                    "INSERT INTO files (path, content_hash, language) VALUES ('a.rs', 'h', 'rust')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        let engine = QueryEngine::new(store);
        let defs = engine.list_defs_in_file(1, 10).unwrap();
        assert!(defs.is_empty());
    }
}
