//! Router: assign each discovered file to the most specific valid context
//! whose root contains it and whose include/exclude globs allow it.
//!
//! Path containment is segment-safe: `apps-legacy/x` must not match a root
//! `apps`. Grounded on `src/parse/languages.rs`'s extension-based dispatch
//! generalized with a path-component comparison, since the teacher never
//! had a multi-root routing concern (one project, one context).

use crate::store::facts::{Context, ProbeStatus};
use std::path::{Component, Path};

#[derive(Debug, Clone)]
pub struct RoutingResult {
    pub routed: Vec<(String, i64)>,
    pub unrouted: Vec<(String, String)>,
}

/// True when `root` contains `file`, comparing path components rather than
/// raw string prefixes (`apps` must not match `apps-legacy`).
fn segment_safe_contains(root: &Path, file: &Path) -> bool {
    let root_components: Vec<Component> = root.components().collect();
    let file_components: Vec<Component> = file.components().collect();
    if root_components.len() > file_components.len() {
        return false;
    }
    root_components
        .iter()
        .zip(file_components.iter())
        .all(|(a, b)| a == b)
}

fn glob_allows(rel_path: &str, include: &[String], exclude: &[String]) -> bool {
    for pattern in exclude {
        if glob::Pattern::new(pattern)
            .map(|p| p.matches(rel_path))
            .unwrap_or(false)
        {
            return false;
        }
    }
    if include.is_empty() {
        return true;
    }
    include.iter().any(|pattern| {
        glob::Pattern::new(pattern)
            .map(|p| p.matches(rel_path))
            .unwrap_or(false)
    })
}

/// Route every file in `files` (repo-relative) against `contexts`. Each
/// file is assigned to the valid context whose root is the deepest
/// (most specific) containing match; ties are broken by context id order.
pub fn route(files: &[String], contexts: &[Context]) -> RoutingResult {
    let mut routed = Vec::new();
    let mut unrouted = Vec::new();

    for file in files {
        let file_path = Path::new(file);
        let mut best: Option<&Context> = None;

        for ctx in contexts {
            if ctx.probe_status != ProbeStatus::Valid {
                continue;
            }
            let root = Path::new(&ctx.root_path);
            if !segment_safe_contains(root, file_path) {
                continue;
            }
            if !glob_allows(file, &ctx.include_globs, &ctx.exclude_globs) {
                continue;
            }
            match best {
                None => best = Some(ctx),
                Some(current) if ctx.root_path.len() > current.root_path.len() => best = Some(ctx),
                _ => {}
            }
        }

        match best {
            Some(ctx) => routed.push((file.clone(), ctx.id)),
            None => unrouted.push((file.clone(), "no valid context contains this path".to_string())),
        }
    }

    RoutingResult { routed, unrouted }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(id: i64, root: &str) -> Context {
        Context {
            id,
            name: root.to_string(),
            family: "rust".to_string(),
            root_path: root.to_string(),
            probe_status: ProbeStatus::Valid,
            include_globs: vec![],
            exclude_globs: vec![],
        }
    }

    #[test]
    fn test_segment_safe_rejects_prefix_collision() {
        let root = Path::new("apps");
        assert!(!segment_safe_contains(root, Path::new("apps-legacy/x.rs")));
        assert!(segment_safe_contains(root, Path::new("apps/x.rs")));
    }

    #[test]
    fn test_most_specific_root_wins() {
        let contexts = vec![ctx(1, "apps"), ctx(2, "apps/web")];
        let files = vec!["apps/web/main.rs".to_string()];
        let result = route(&files, &contexts);
        assert_eq!(result.routed, vec![("apps/web/main.rs".to_string(), 2)]);
    }

    #[test]
    fn test_unrouted_reason_recorded() {
        let contexts = vec![ctx(1, "apps")];
        let files = vec!["other/main.rs".to_string()];
        let result = route(&files, &contexts);
        assert_eq!(result.routed.len(), 0);
        assert_eq!(result.unrouted[0].0, "other/main.rs");
    }
}
