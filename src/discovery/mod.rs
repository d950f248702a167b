//! C4 Discovery: walk the tree, identify language-family roots by
//! well-known markers, probe each candidate for validity.
//!
//! Grounded on `src/core/project.rs`'s `PROJECT_MARKERS`/`detect_project_type`
//! table (single-root marker search), generalized from "find the one
//! enclosing project root" to "find every family root anywhere in the
//! tree", since a repo indexed by this crate may be a monorepo with several
//! language-family roots rather than the single project the teacher's CLI
//! opens.

pub mod router;

use crate::core::config::Config;
use crate::core::error::Result;
use crate::store::facts::{Context, ProbeStatus};
use crate::store::Store;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use router::{route, RoutingResult};

/// A manifest file name, the family it signals, and how specific a root it
/// implies (lower tier wins when roots are nested).
const FAMILY_MARKERS: &[(&str, &str, u8)] = &[
    ("Cargo.toml", "rust", 0),
    ("package.json", "javascript", 0),
    ("pyproject.toml", "python", 0),
    ("setup.py", "python", 1),
    ("go.mod", "go", 0),
    ("pom.xml", "java", 0),
    ("build.gradle", "java", 1),
    ("build.gradle.kts", "java", 1),
    ("Gemfile", "ruby", 0),
    ("composer.json", "php", 0),
    ("mix.exs", "elixir", 0),
    (".git", "repo", 2),
];

#[derive(Debug, Clone)]
pub struct Candidate {
    pub family: String,
    pub root_path: PathBuf,
    pub markers: Vec<String>,
    pub tier: u8,
    pub probe_status: ProbeStatus,
}

/// Walk `repo_root`, skipping the watcher's hard-ignored/prunable
/// directories (`.git`, `node_modules`, `target`, ...), and return one
/// candidate per (family, directory) pair that has a marker file.
pub fn discover(repo_root: &Path, config: &Config) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let walker = WalkDir::new(repo_root)
        .into_iter()
        .filter_entry(|entry| !is_pruned(entry.file_name().to_str().unwrap_or(""), config));

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        for (marker, family, tier) in FAMILY_MARKERS {
            if file_name == *marker {
                let abs_root = entry.path().parent().unwrap_or(repo_root);
                let root_path = abs_root.strip_prefix(repo_root).unwrap_or(abs_root).to_path_buf();
                let probe_status = probe(&entry.path().to_path_buf());
                candidates.push(Candidate {
                    family: family.to_string(),
                    root_path,
                    markers: vec![marker.to_string()],
                    tier: *tier,
                    probe_status,
                });
            }
        }
    }

    candidates
}

/// Upsert every `Candidate` into the `contexts` table (keyed on the schema's
/// `UNIQUE(family, root_path)`) and return the current full set of
/// `Context` rows for the router to match files against. Candidates absent
/// from this discovery pass are left in place — a root doesn't stop
/// existing just because one cycle's walk didn't reach it (e.g. a
/// path-scoped reconcile).
pub fn sync_contexts(store: &Store, candidates: &[Candidate]) -> Result<Vec<Context>> {
    if !candidates.is_empty() {
        let writer = store.bulk_writer()?;
        for c in candidates {
            let root = c.root_path.to_string_lossy().replace('\\', "/");
            writer.execute(
                "INSERT INTO contexts (name, family, root_path, probe_status, include_globs, exclude_globs)
                 VALUES (?1, ?2, ?3, ?4, '[]', '[]')
                 ON CONFLICT(family, root_path) DO UPDATE SET probe_status = excluded.probe_status",
                rusqlite::params![root, c.family, root, c.probe_status.as_str()],
            )?;
        }
        writer.commit()?;
    }

    store.session(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, family, root_path, probe_status, include_globs, exclude_globs FROM contexts",
        )?;
        let rows = stmt.query_map([], |row| {
            let include_globs: String = row.get(5)?;
            let exclude_globs: String = row.get(6)?;
            let probe_status: String = row.get(4)?;
            Ok(Context {
                id: row.get(0)?,
                name: row.get(1)?,
                family: row.get(2)?,
                root_path: row.get(3)?,
                probe_status: ProbeStatus::from_str(&probe_status),
                include_globs: serde_json::from_str(&include_globs).unwrap_or_default(),
                exclude_globs: serde_json::from_str(&exclude_globs).unwrap_or_default(),
            })
        })?;
        let mut contexts = Vec::new();
        for row in rows {
            contexts.push(row?);
        }
        Ok(contexts)
    })
}

pub(crate) fn is_pruned(name: &str, config: &Config) -> bool {
    config.watch.hard_ignored_dirs.iter().any(|d| d == name)
        || config.watch.prunable_dirs.iter().any(|d| d == name)
}

/// Validate a candidate's manifest actually parses as the format its
/// extension implies. A marker file that merely exists but is garbage
/// (corrupt `package.json`, etc.) downgrades the candidate to `Invalid`
/// rather than aborting discovery.
fn probe(manifest_path: &Path) -> ProbeStatus {
    let Ok(content) = std::fs::read_to_string(manifest_path) else {
        return ProbeStatus::Invalid;
    };
    let ext = manifest_path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let ok = match ext {
        "json" => serde_json::from_str::<serde_json::Value>(&content).is_ok(),
        "toml" => toml::from_str::<toml::Value>(&content).is_ok(),
        // No XML/Gemfile/mix.exs parser in the stack; existence plus a
        // non-empty read is as far as a cheap probe can validate.
        _ => !content.trim().is_empty() || manifest_path.file_name().map(|n| n == ".git").unwrap_or(false),
    };
    if ok {
        ProbeStatus::Valid
    } else {
        ProbeStatus::Invalid
    }
}
