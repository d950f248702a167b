use codeplane_core::core::config::NullSink;
use codeplane_core::core::error::Result;
use codeplane_core::watch::coordinator::Coordinator;
use std::path::PathBuf;
use std::sync::Arc;

pub fn run(path: &Option<PathBuf>) -> Result<()> {
    let repo_root = super::repo_root(path)?;
    let (store, lexical, config) = super::open(&repo_root)?;
    let coordinator = Coordinator::new(store, repo_root, config, lexical, Arc::new(NullSink));
    coordinator.recover()?;
    let result = coordinator.cycle(None)?;

    println!(
        "reconciled: +{} ~{} -{}",
        result.reconcile.files_added, result.reconcile.files_modified, result.reconcile.files_removed
    );
    println!("routed: {} files ({} unrouted)", result.routed_files, result.unrouted_files);
    if let Some(structural) = &result.structural {
        println!("structural: {} files, {} errors", structural.files.len(), structural.errors.len());
    }
    if let Some(resolve) = &result.resolve {
        println!(
            "resolve: {} imports, {} refs upgraded, {} type-traced, {} config refs, {} shape-matched",
            resolve.imports_resolved, resolve.import_refs_upgraded, resolve.type_traced_upgraded, resolve.config_refs_found, resolve.shape_matched
        );
    }
    match result.epoch_id {
        Some(id) => println!("published epoch {id}"),
        None => println!("no changes to publish"),
    }
    Ok(())
}
