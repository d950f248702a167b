//! Hierarchical `.cplignore` discovery and hashing.
//!
//! A `.cplignore` can live at any directory level in the tree (not just
//! `.codeplane/`), the way `.gitignore` does. The reconciler only needs to
//! know *whether any of them changed*; the combined hash is a stand-in for
//! "the set of ignore patterns in effect may have changed, so previously
//! excluded files might now be in scope (or vice versa) — schedule a full
//! re-index rather than reason about exactly what changed."
//!
//! Grounded on `src/discovery/mod.rs`'s `is_pruned` walk-skip logic,
//! reused here so the ignore scan does not descend into directories the
//! watcher itself would never watch.

use crate::core::config::{Config, CPLIGNORE_FILE};
use sha2::{Digest, Sha256};
use std::path::Path;
use walkdir::WalkDir;

/// Compute a combined hash of every `.cplignore` file in the tree, or
/// `None` if none exist. Order-independent with respect to filesystem
/// walk order: entries are sorted by path before hashing.
pub fn compute_combined_hash(repo_root: &Path, config: &Config) -> Option<String> {
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

    let walker = WalkDir::new(repo_root).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_str().unwrap_or("");
        entry.depth() == 0
            || !(config.watch.hard_ignored_dirs.iter().any(|d| d == name)
                || config.watch.prunable_dirs.iter().any(|d| d == name))
    });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name() != CPLIGNORE_FILE {
            continue;
        }
        let Ok(content) = std::fs::read(entry.path()) else {
            continue;
        };
        let rel = entry
            .path()
            .strip_prefix(repo_root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        entries.push((rel, content));
    }

    if entries.is_empty() {
        return None;
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (path, content) in &entries {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(content);
        hasher.update(b"\0");
    }
    Some(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_no_cplignore_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        assert_eq!(compute_combined_hash(dir.path(), &config), None);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        fs::write(dir.path().join(".cplignore"), "*.log\n").unwrap();
        let first = compute_combined_hash(dir.path(), &config);
        assert!(first.is_some());

        fs::write(dir.path().join(".cplignore"), "*.log\n*.tmp\n").unwrap();
        let second = compute_combined_hash(dir.path(), &config);
        assert_ne!(first, second);
    }

    #[test]
    fn test_nested_cplignore_included() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join(".cplignore"), "a\n").unwrap();
        fs::write(dir.path().join("sub/.cplignore"), "b\n").unwrap();
        let combined = compute_combined_hash(dir.path(), &config).unwrap();

        fs::remove_file(dir.path().join("sub/.cplignore")).unwrap();
        let without_nested = compute_combined_hash(dir.path(), &config).unwrap();
        assert_ne!(combined, without_nested);
    }
}
