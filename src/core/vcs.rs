//! Thin libgit2 wrapper: HEAD and tracked-file enumeration only.
//!
//! Grounded on `examples/Loctree-Loctree/loctree_rs/src/git.rs`'s `GitRepo`
//! wrapper, narrowed to the two read operations spec.md scopes the core to
//! (HEAD lookup, tracked-file listing) — the original's `GitOps` in
//! `examples/original_source/src/codeplane/git/ops.py` wraps pygit2 for a
//! much larger surface (diff, blame, branches, rebase) this crate has no
//! corresponding operations for.

use crate::core::error::{Error, Result};
use git2::Repository;
use std::path::Path;

/// Read-only view onto a repository's VCS state. Absent or non-git
/// directories are valid: every method degrades to `None`/empty rather
/// than erroring, since reconciliation must work on a plain directory tree
/// too.
pub struct Vcs {
    repo: Option<Repository>,
}

impl Vcs {
    pub fn open(repo_root: &Path) -> Self {
        Self {
            repo: Repository::discover(repo_root).ok(),
        }
    }

    /// Current HEAD commit hash, or `None` if this isn't a git repo or HEAD
    /// is unborn (no commits yet).
    pub fn head(&self) -> Option<String> {
        let repo = self.repo.as_ref()?;
        let head = repo.head().ok()?;
        head.target().map(|oid| oid.to_string())
    }

    /// All paths git currently tracks in the index, repo-relative POSIX.
    /// Empty when there's no repository.
    pub fn tracked_files(&self) -> Result<Vec<String>> {
        let Some(repo) = self.repo.as_ref() else {
            return Ok(Vec::new());
        };
        let index = repo.index().map_err(|e| Error::Vcs(e.message().to_string()))?;
        Ok(index
            .iter()
            .filter_map(|entry| String::from_utf8(entry.path).ok())
            .collect())
    }

    pub fn is_repo(&self) -> bool {
        self.repo.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_repo_degrades_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = Vcs::open(dir.path());
        assert!(!vcs.is_repo());
        assert_eq!(vcs.head(), None);
        assert_eq!(vcs.tracked_files().unwrap(), Vec::<String>::new());
    }
}
