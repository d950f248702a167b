//! `cplcore` - demonstration binary for `codeplane_core`.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use codeplane_core::core::error::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_env("CPLCORE_LOG"))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Index => cli::index::run(&cli.path),
        Commands::Search(args) => cli::search::run(&cli.path, args),
        Commands::Defs(args) => cli::defs::run(&cli.path, args),
        Commands::Diff(args) => cli::diff::run(&cli.path, args),
        Commands::Rename(args) => cli::rename::run(&cli.path, args),
    }
}
