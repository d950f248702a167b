//! Configuration and on-disk layout
//!
//! `.codeplane/` under the repository root holds all core state:
//! `index.db` (the relational store), `lexical/` (the tantivy index),
//! `embedding/` (optional dense vectors), `epoch_<N>.journal` (ephemeral,
//! one per in-flight publish) and `.cplignore` (hierarchical ignore
//! patterns, read from the repo tree itself, not `.codeplane/`).

use crate::core::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const STATE_DIR: &str = ".codeplane";
pub const STORE_FILE: &str = "index.db";
pub const LEXICAL_DIR: &str = "lexical";
pub const EMBEDDING_DIR: &str = "embedding";
pub const CPLIGNORE_FILE: &str = ".cplignore";

pub const MAX_FILE_SIZE: u64 = 4 * 1_048_576;

/// Environment contract the core receives: repository root plus a
/// configuration object. The mutation callback and observability sink are
/// modeled as traits (see `query::refactor::MutationEngine` and
/// `core::config::ObservabilitySink`) rather than fields here, since they
/// carry behavior, not data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub watch: WatchConfig,
    pub resolve: ResolveConfig,
    pub ignore: IgnoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            watch: WatchConfig::default(),
            resolve: ResolveConfig::default(),
            ignore: IgnoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum file size to parse/index (bytes). Larger files are tracked
    /// in `File` but skipped by the parser (`skipped_too_large`).
    pub max_file_size: u64,
    /// Store busy-retry budget: base delay, max delay, attempt count.
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub retry_attempts: u32,
    /// Busy timeout the store connection itself waits on the engine
    /// (spec.md §5 default 30s) before surfacing a locked error.
    pub busy_timeout: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            retry_base: Duration::from_millis(100),
            retry_max: Duration::from_secs(2),
            retry_attempts: 3,
            busy_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_window: Duration,
    pub max_debounce_wait: Duration,
    pub queue_capacity: usize,
    /// Directories never watched regardless of `.cplignore` — would cause
    /// feedback loops or are pure noise.
    pub hard_ignored_dirs: Vec<String>,
    /// Common prunable directories (policy, not correctness — see
    /// DESIGN.md Open Question 1).
    pub prunable_dirs: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(500),
            max_debounce_wait: Duration::from_secs(2),
            queue_capacity: 10_000,
            hard_ignored_dirs: vec![
                ".git".into(),
                STATE_DIR.into(),
                ".hg".into(),
                ".svn".into(),
            ],
            prunable_dirs: vec![
                "node_modules".into(),
                "dist".into(),
                "build".into(),
                "target".into(),
                "__pycache__".into(),
                ".venv".into(),
                "venv".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Minimum shape-match score (pass 5) to upgrade a MemberAccessFact.
    pub shape_match_threshold: f64,
    /// Bonus added per matched method beyond the raw field/method ratio.
    pub shape_method_bonus: f64,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            shape_match_threshold: 0.7,
            shape_method_bonus: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Extra global ignore patterns, in addition to `.cplignore` files
    /// discovered in the tree.
    pub patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self { patterns: vec![] }
    }
}

/// A sink for the core's operational events (epoch publishes, reconcile
/// summaries, watcher overflow counts). Optional: a no-op sink is used when
/// the caller supplies none. Kept as a trait, per the Environment contract's
/// "optional observability sink" — the core never assumes a particular
/// telemetry backend, only emits `tracing` events plus calls through this
/// trait for structured consumption.
pub trait ObservabilitySink: Send + Sync {
    fn epoch_published(&self, epoch_id: i64, files_indexed: usize) {
        let _ = (epoch_id, files_indexed);
    }
    fn reconcile_completed(&self, added: usize, modified: usize, removed: usize) {
        let _ = (added, modified, removed);
    }
    fn watcher_queue_overflow(&self, dropped: usize) {
        let _ = dropped;
    }
}

/// No-op sink used when the caller does not supply one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;
impl ObservabilitySink for NullSink {}

impl Config {
    /// Load configuration from `<repo_root>/.codeplane/config.toml`, falling
    /// back to defaults when absent.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = Self::config_path(repo_root);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self, repo_root: &Path) -> Result<()> {
        Self::ensure_state_dir(repo_root)?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::config_path(repo_root), content)?;
        Ok(())
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        Self::state_dir(repo_root).join("config.toml")
    }

    pub fn state_dir(repo_root: &Path) -> PathBuf {
        repo_root.join(STATE_DIR)
    }

    pub fn store_path(repo_root: &Path) -> PathBuf {
        Self::state_dir(repo_root).join(STORE_FILE)
    }

    pub fn lexical_dir(repo_root: &Path) -> PathBuf {
        Self::state_dir(repo_root).join(LEXICAL_DIR)
    }

    pub fn embedding_dir(repo_root: &Path) -> PathBuf {
        Self::state_dir(repo_root).join(EMBEDDING_DIR)
    }

    pub fn journal_path(repo_root: &Path, epoch_id: i64) -> PathBuf {
        Self::state_dir(repo_root).join(format!("epoch_{epoch_id}.journal"))
    }

    pub fn cplignore_path(dir: &Path) -> PathBuf {
        dir.join(CPLIGNORE_FILE)
    }

    pub fn ensure_state_dir(repo_root: &Path) -> Result<()> {
        let dir = Self::state_dir(repo_root);
        std::fs::create_dir_all(&dir)?;
        std::fs::create_dir_all(dir.join(LEXICAL_DIR))?;
        std::fs::create_dir_all(dir.join(EMBEDDING_DIR))?;
        Ok(())
    }

    /// Per-user home directory, used only by the demonstration CLI for a
    /// cross-project registry; the core engine itself is entirely
    /// repo-local.
    pub fn codeplane_home() -> Result<PathBuf> {
        if let Ok(home) = std::env::var("CODEPLANE_HOME") {
            return Ok(PathBuf::from(home));
        }
        ProjectDirs::from("dev", "codeplane", "codeplane")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| Error::ConfigError {
                message: "could not determine codeplane home directory".to_string(),
            })
    }
}
