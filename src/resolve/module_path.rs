//! Module-path index: maps a normalized module key to the repo-relative
//! file that defines it, so pass 2 (import resolution) and pass 4
//! (config-file references) can turn a source literal or bare identifier
//! into an actual tracked file.
//!
//! Grounded on `examples/original_source/.../resolve/module_index.py`'s
//! normalization rules (`src/` stripping, `__init__`/`index` package
//! roots) translated into a plain `HashMap` lookup rather than the
//! original's trie, since this crate's repos are small enough that a flat
//! map costs nothing extra and is far simpler to reason about.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Package-root file stems that collapse to their containing directory's
/// module key (`pkg/__init__.py` is importable as `pkg`, same for
/// `pkg/index.ts`).
const PACKAGE_ROOT_STEMS: &[&str] = &["__init__", "index", "mod"];

pub struct ModulePathIndex {
    by_key: HashMap<String, String>,
}

impl ModulePathIndex {
    pub fn build(file_paths: &[String]) -> Self {
        let mut by_key = HashMap::new();
        for path in file_paths {
            by_key.insert(module_key(path), path.clone());
        }
        Self { by_key }
    }

    /// Resolve `source_literal` as written in `importing_file`'s import
    /// statement. Relative literals (`./foo`, `../bar`) resolve against the
    /// importing file's directory; bare literals (`pkg.mod`, `pkg/mod`)
    /// resolve against the whole-repo module key index.
    pub fn resolve(&self, importing_file: &str, source_literal: &str) -> Option<String> {
        if source_literal.starts_with('.') {
            let base = Path::new(importing_file).parent().unwrap_or(Path::new(""));
            let joined = normalize_relative(base, source_literal);
            let key = module_key(&joined);
            return self.by_key.get(&key).cloned().or_else(|| {
                // try package-root form: pkg/foo -> pkg/foo/__init__
                PACKAGE_ROOT_STEMS.iter().find_map(|stem| {
                    self.by_key.get(&format!("{key}.{stem}")).cloned()
                })
            });
        }

        let key = source_literal.replace(['/', '\\'], ".");
        self.by_key.get(&key).cloned().or_else(|| {
            PACKAGE_ROOT_STEMS
                .iter()
                .find_map(|stem| self.by_key.get(&format!("{key}.{stem}")).cloned())
        })
    }

    pub fn lookup_key(&self, key: &str) -> Option<&String> {
        self.by_key.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.by_key.keys()
    }

    /// The module key a given repo-relative path was indexed under, if any.
    pub fn key_for_path(&self, path: &str) -> Option<String> {
        self.by_key.iter().find(|(_, p)| p.as_str() == path).map(|(k, _)| k.clone())
    }
}

/// Normalize a repo-relative file path to a dotted module key: strip a
/// leading `src/`, strip the extension, collapse a package-root file stem
/// (`__init__`, `index`, `mod`) into its parent directory, join the
/// remaining components with `.`.
fn module_key(path: &str) -> String {
    let path = Path::new(path);
    let stripped = path.strip_prefix("src").unwrap_or(path);
    let stem = stripped.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let dir = stripped.parent();

    let mut segments: Vec<String> = dir
        .map(|d| {
            d.components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    if !PACKAGE_ROOT_STEMS.contains(&stem) && !stem.is_empty() {
        segments.push(stem.to_string());
    }

    segments.join(".")
}

fn normalize_relative(base: &Path, literal: &str) -> String {
    let mut components: Vec<String> = base
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();

    for part in literal.split('/') {
        match part {
            "." | "" => {}
            ".." => {
                components.pop();
            }
            other => components.push(other.to_string()),
        }
    }

    PathBuf::from(components.join("/")).to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_key_strips_src_and_extension() {
        assert_eq!(module_key("src/core/config.rs"), "core.config");
        assert_eq!(module_key("core/config.rs"), "core.config");
    }

    #[test]
    fn test_module_key_collapses_package_root() {
        assert_eq!(module_key("src/pkg/__init__.py"), "pkg");
        assert_eq!(module_key("src/pkg/index.ts"), "pkg");
    }

    #[test]
    fn test_resolve_relative_literal() {
        let index = ModulePathIndex::build(&["src/a/b.py".to_string(), "src/a/c.py".to_string()]);
        let resolved = index.resolve("src/a/c.py", "./b");
        assert_eq!(resolved, Some("src/a/b.py".to_string()));
    }

    #[test]
    fn test_resolve_bare_module_literal() {
        let index = ModulePathIndex::build(&["src/pkg/mod_a.rs".to_string()]);
        let resolved = index.resolve("src/main.rs", "pkg.mod_a");
        assert_eq!(resolved, Some("src/pkg/mod_a.rs".to_string()));
    }

    #[test]
    fn test_resolve_unknown_literal_returns_none() {
        let index = ModulePathIndex::build(&["src/a.py".to_string()]);
        assert_eq!(index.resolve("src/b.py", "nonexistent"), None);
    }
}
