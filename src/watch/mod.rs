//! C9 Watcher: monitors the repo tree for changes and debounces them into
//! batches for the coordinator.
//!
//! Native mode wraps `notify`'s recommended (OS-level) backend, the
//! teacher's only mode. Polling mode is added for repos that live on a
//! mount native notification doesn't reliably cover, detected by path
//! heuristics ported from `examples/original_source/.../watcher/watcher.py`
//! (the original is polling-only, since Python has no native recommend).
//! Debouncing keeps the teacher's `tokio::select!` shape from its
//! `WatchManager::process_changes` (event arm vs. timer arm), generalized
//! from one fixed delay to the two-knob `debounce_window`/`max_debounce_wait`
//! spec.md §4.C9 names.

pub mod coordinator;

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherTrait};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Mount-path prefixes under which native change notification is
/// unreliable (network shares, removable media) — carried over from the
/// original's polling-only watcher.
const POLLING_MOUNT_PREFIXES: &[&str] = &["/mnt/", "/media/", "/net/"];

fn looks_like_polling_mount(repo_root: &Path) -> bool {
    let s = repo_root.to_string_lossy();
    if POLLING_MOUNT_PREFIXES.iter().any(|p| s.starts_with(p)) {
        return true;
    }
    if let Some(rest) = s.strip_prefix("/run/user/") {
        if let Some(slash) = rest.find('/') {
            return rest[slash + 1..].starts_with("gvfs/");
        }
    }
    false
}

/// One debounced batch of changed paths (absolute).
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    pub paths: Vec<PathBuf>,
}

/// Builds a matcher for hierarchical `.cplignore` files plus the
/// configured hard-ignored/prunable directory names, using the `ignore`
/// crate's gitignore engine rather than hand-rolling pattern matching.
fn build_ignore_matcher(repo_root: &Path, config: &Config) -> ignore::gitignore::Gitignore {
    let mut builder = ignore::gitignore::GitignoreBuilder::new(repo_root);
    for dir in config.watch.hard_ignored_dirs.iter().chain(&config.watch.prunable_dirs) {
        let _ = builder.add_line(None, &format!("{dir}/"));
    }
    for pattern in &config.ignore.patterns {
        let _ = builder.add_line(None, pattern);
    }
    for entry in walkdir::WalkDir::new(repo_root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !crate::discovery::is_pruned(e.file_name().to_str().unwrap_or(""), config))
        .filter_map(|e| e.ok())
    {
        if entry.file_name() == crate::core::config::CPLIGNORE_FILE {
            builder.add(entry.path());
        }
    }
    builder.build().unwrap_or_else(|_| ignore::gitignore::Gitignore::empty())
}

enum Backend {
    Notify(RecommendedWatcher),
}

/// Owns the underlying OS/polling watcher and the debounced batch stream.
pub struct Watcher {
    _backend: Backend,
    pub batches: mpsc::Receiver<ChangeBatch>,
    pub overflow_count: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl Watcher {
    /// Start watching `repo_root`. Returns immediately; debounced batches
    /// arrive on `batches` as they flush.
    pub fn start(repo_root: PathBuf, config: Config) -> Result<Self> {
        let polling = looks_like_polling_mount(&repo_root);
        let poll_interval = if polling { Duration::from_secs(2) } else { Duration::from_secs(30) };

        let (raw_tx, mut raw_rx) = mpsc::channel::<Event>(4096);
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = raw_tx.blocking_send(event);
                }
            },
            NotifyConfig::default().with_poll_interval(poll_interval),
        )
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

        watcher
            .watch(&repo_root, RecursiveMode::Recursive)
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

        debug!(?repo_root, polling, "watcher started");

        let (batch_tx, batch_rx) = mpsc::channel::<ChangeBatch>(config.watch.queue_capacity);
        let overflow_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let overflow_for_task = overflow_count.clone();

        let ignore_matcher = build_ignore_matcher(&repo_root, &config);
        let watch_config = config.watch.clone();
        let root_for_task = repo_root.clone();

        tokio::spawn(async move {
            debounce_loop(&mut raw_rx, batch_tx, root_for_task, watch_config, ignore_matcher, overflow_for_task).await;
        });

        Ok(Self {
            _backend: Backend::Notify(watcher),
            batches: batch_rx,
            overflow_count,
        })
    }
}

async fn debounce_loop(
    raw_rx: &mut mpsc::Receiver<Event>,
    batch_tx: mpsc::Sender<ChangeBatch>,
    repo_root: PathBuf,
    watch_config: crate::core::config::WatchConfig,
    ignore_matcher: ignore::gitignore::Gitignore,
    overflow_count: std::sync::Arc<std::sync::atomic::AtomicUsize>,
) {
    let mut pending: std::collections::HashSet<PathBuf> = std::collections::HashSet::new();
    let mut window_deadline: Option<tokio::time::Instant> = None;
    let mut hard_deadline: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            event = raw_rx.recv() => {
                let Some(event) = event else { break };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                    continue;
                }
                let mut touched = false;
                for path in &event.paths {
                    if should_ignore(path, &repo_root, &ignore_matcher) {
                        continue;
                    }
                    pending.insert(path.clone());
                    touched = true;
                }
                if touched {
                    let now = tokio::time::Instant::now();
                    window_deadline = Some(now + watch_config.debounce_window);
                    if hard_deadline.is_none() {
                        hard_deadline = Some(now + watch_config.max_debounce_wait);
                    }
                }
            }
            _ = sleep_until_or_pending(window_deadline) => {
                flush(&mut pending, &batch_tx, &overflow_count).await;
                window_deadline = None;
                hard_deadline = None;
            }
            _ = sleep_until_or_pending(hard_deadline) => {
                flush(&mut pending, &batch_tx, &overflow_count).await;
                window_deadline = None;
                hard_deadline = None;
            }
        }
    }
}

async fn sleep_until_or_pending(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

async fn flush(
    pending: &mut std::collections::HashSet<PathBuf>,
    batch_tx: &mpsc::Sender<ChangeBatch>,
    overflow_count: &std::sync::Arc<std::sync::atomic::AtomicUsize>,
) {
    if pending.is_empty() {
        return;
    }
    let paths: Vec<PathBuf> = pending.drain().collect();
    let batch = ChangeBatch { paths };
    if let Err(e) = batch_tx.try_send(batch) {
        overflow_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        warn!(error = %e, "watch queue full, batch dropped");
    }
}

fn should_ignore(path: &Path, repo_root: &Path, matcher: &ignore::gitignore::Gitignore) -> bool {
    if path.starts_with(repo_root.join(crate::core::config::STATE_DIR)) {
        return true;
    }
    matcher.matched(path, path.is_dir()).is_ignore()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_mount_heuristics() {
        assert!(looks_like_polling_mount(Path::new("/mnt/c/repo")));
        assert!(looks_like_polling_mount(Path::new("/media/usb/repo")));
        assert!(looks_like_polling_mount(Path::new("/run/user/1000/gvfs/repo")));
        assert!(!looks_like_polling_mount(Path::new("/home/user/repo")));
    }

    #[test]
    fn test_state_dir_always_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let matcher = build_ignore_matcher(dir.path(), &config);
        let state_path = dir.path().join(".codeplane").join("index.db");
        assert!(should_ignore(&state_path, dir.path(), &matcher));
    }
}
