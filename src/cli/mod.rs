//! Demonstration front-door: thin `clap` subcommands over `codeplane_core`.
//!
//! Mirrors the teacher's `Cli`/`Commands` derive shape. This is
//! scaffolding to exercise the library end-to-end, not the richer
//! "CLI front-end" spec.md §1 puts out of scope.

pub mod defs;
pub mod diff;
pub mod index;
pub mod rename;
pub mod search;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cplcore", version, about = "Code intelligence core demonstration CLI")]
pub struct Cli {
    /// Repository root. Defaults to the current directory.
    #[arg(long, global = true)]
    pub path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one reconcile -> extract -> resolve -> publish cycle over the
    /// whole repo.
    Index,
    /// Lexical search over indexed file content/symbols.
    Search(search::SearchArgs),
    /// List definitions in a file, or by name within a context.
    Defs(defs::DefsArgs),
    /// Semantic diff between two epochs.
    Diff(diff::DiffArgs),
    /// Preview (and optionally apply) a symbol rename.
    Rename(rename::RenameArgs),
}

/// Shared setup: open the store/lexical index/config at `repo_root`,
/// creating `.codeplane/` on first run, then run recovery.
pub(crate) fn open(repo_root: &std::path::Path) -> codeplane_core::core::error::Result<(codeplane_core::store::Store, codeplane_core::lexical::LexicalIndex, codeplane_core::core::config::Config)> {
    use codeplane_core::core::config::{Config, IndexConfig};
    use codeplane_core::lexical::LexicalIndex;
    use codeplane_core::store::Store;

    Config::ensure_state_dir(repo_root)?;
    let config = Config::load(repo_root)?;
    let store = Store::open(&Config::store_path(repo_root), IndexConfig::default())?;
    let lexical = LexicalIndex::open_or_create(&Config::lexical_dir(repo_root))?;
    Ok((store, lexical, config))
}

pub(crate) fn repo_root(path: &Option<PathBuf>) -> codeplane_core::core::error::Result<PathBuf> {
    match path {
        Some(p) => Ok(p.clone()),
        None => std::env::current_dir().map_err(codeplane_core::core::error::Error::Io),
    }
}
