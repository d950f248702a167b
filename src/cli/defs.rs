use codeplane_core::core::error::Result;
use codeplane_core::query::QueryEngine;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct DefsArgs {
    /// Repo-relative file path to list definitions for.
    #[arg(long)]
    pub file: Option<String>,
    /// Definition name to look up within a context.
    #[arg(long)]
    pub name: Option<String>,
    /// Context (unit) id, required together with `--name`.
    #[arg(long)]
    pub unit_id: Option<i64>,
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

pub fn run(path: &Option<PathBuf>, args: &DefsArgs) -> Result<()> {
    let repo_root = super::repo_root(path)?;
    let (store, _lexical, _config) = super::open(&repo_root)?;
    let engine = QueryEngine::new(store.clone());

    let defs = if let Some(file) = &args.file {
        let file_id: Option<i64> = store.session(|conn| {
            conn.query_row("SELECT id FROM files WHERE path = ?1", [file], |r| r.get(0))
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(codeplane_core::core::error::Error::from(other)),
                })
        })?;
        match file_id {
            Some(id) => engine.list_defs_in_file(id, args.limit)?,
            None => Vec::new(),
        }
    } else if let (Some(name), Some(unit_id)) = (&args.name, args.unit_id) {
        engine.list_defs_by_name(unit_id, name, args.limit)?
    } else {
        println!("pass either --file <path> or --name <name> --unit-id <id>");
        return Ok(());
    };

    for def in defs {
        println!("{:?} {} ({}:{})", def.kind, def.qualified_name, def.span.start_line, def.span.end_line);
    }
    Ok(())
}
