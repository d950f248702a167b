use codeplane_core::core::error::Result;
use codeplane_core::query::refactor::{NoopMutationEngine, RefactorEngine};
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct RenameArgs {
    pub symbol: String,
    pub new_name: String,
    /// Apply the preview immediately via the default no-op mutation engine
    /// (demonstration only; writes nothing to disk).
    #[arg(long)]
    pub apply: bool,
}

pub fn run(path: &Option<PathBuf>, args: &RenameArgs) -> Result<()> {
    let repo_root = super::repo_root(path)?;
    let (store, _lexical, _config) = super::open(&repo_root)?;
    let engine = RefactorEngine::new(store, repo_root, Box::new(NoopMutationEngine));
    let preview = engine.rename(&args.symbol, &args.new_name)?;

    println!("preview {} ({} files, verification_required={})", preview.id, preview.edits.len(), preview.verification_required);
    for edit in &preview.edits {
        for hunk in &edit.hunks {
            println!("  {}:{} [{:?}] {} -> {}", edit.path, hunk.line, hunk.certainty, hunk.old, hunk.new);
        }
    }

    if args.apply {
        match engine.apply(&preview.id)? {
            Ok(()) => println!("applied"),
            Err(report) => println!("diverged, conflicting paths: {}", report.conflicting_paths.join(", ")),
        }
    }
    Ok(())
}
