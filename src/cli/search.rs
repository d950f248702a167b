use codeplane_core::core::error::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct SearchArgs {
    /// Query text.
    pub query: String,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

pub fn run(path: &Option<PathBuf>, args: &SearchArgs) -> Result<()> {
    let repo_root = super::repo_root(path)?;
    let (_store, lexical, _config) = super::open(&repo_root)?;
    let reader = lexical.reader()?;
    let hits = reader.search(&args.query, args.limit)?;
    for hit in hits {
        println!("{:>7.3}  {}:{}-{}", hit.score, hit.path, hit.start_line, hit.end_line);
    }
    Ok(())
}
