//! Error types for the code intelligence core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors the core produces.
///
/// VCS/rebase-flow error kinds named in the design notes belong to a layer
/// this core does not implement operations for (it only reads HEAD and
/// tracked-file enumeration); they are represented by the single `Vcs`
/// passthrough variant rather than a full taxonomy this crate has no
/// corresponding behavior for.
#[derive(Error, Debug)]
pub enum Error {
    #[error("project not found: {path}")]
    ProjectNotFound { path: PathBuf },

    #[error("no project root found (looked for .git, package.json, Cargo.toml, etc.)")]
    NoProjectRoot,

    #[error("not a repository: {path}")]
    NotARepository { path: PathBuf },

    #[error("index not found for project: {path}")]
    IndexNotFound { path: PathBuf },

    #[error("index error: {message}")]
    IndexError { message: String },

    #[error("search error: {message}")]
    SearchError { message: String },

    #[error("configuration error: {message}")]
    ConfigError { message: String },

    #[error("database is locked")]
    DatabaseLocked,

    #[error("database is corrupt: {message}")]
    DatabaseCorrupt { message: String },

    #[error("epoch journal at {path} is unreadable: {message}")]
    JournalUnreadable { path: PathBuf, message: String },

    #[error("lexical index desynced from store ({lexical_count} vs {store_count} docs)")]
    TantivyDesync {
        lexical_count: usize,
        store_count: usize,
    },

    #[error("parse error in {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("gate validation failed: {reason}")]
    GateValidationFailed { reason: String },

    #[error("refactor preview {id} diverged: file contents changed since preview")]
    RefactorDiverged { id: String },

    #[error("vcs error: {0}")]
    Vcs(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("toml serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Whether the caller should retry this operation within a retry budget.
    ///
    /// Only a busy/locked store qualifies; everything else is terminal for
    /// the calling operation.
    pub fn retriable(&self) -> bool {
        match self {
            Error::DatabaseLocked => true,
            Error::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
            }
            _ => false,
        }
    }
}
