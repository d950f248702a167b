use codeplane_core::core::error::Result;
use codeplane_core::query::diff::DiffEngine;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct DiffArgs {
    pub base_epoch: i64,
    pub target_epoch: i64,
    /// Restrict the diff to these repo-relative paths; omit for the whole
    /// changed set between the two epochs.
    #[arg(long)]
    pub file: Vec<String>,
}

pub fn run(path: &Option<PathBuf>, args: &DiffArgs) -> Result<()> {
    let repo_root = super::repo_root(path)?;
    let (store, _lexical, _config) = super::open(&repo_root)?;
    let engine = DiffEngine::new(store);
    let changed = if args.file.is_empty() { None } else { Some(args.file.as_slice()) };
    let result = engine.semantic_diff(args.base_epoch, args.target_epoch, changed)?;

    for change in &result.changes {
        println!(
            "{:?} {} {:?} ({:?}, risk {:?})",
            change.change_kind, change.name, change.structural_severity, change.delta_tags, change.behavior_change_risk
        );
    }
    if !result.non_structural.is_empty() {
        println!("non-structural file changes: {}", result.non_structural.len());
    }
    Ok(())
}
