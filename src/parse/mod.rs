//! C3 Parser: language-family-agnostic syntactic extraction.
//!
//! A parser run over one file yields facts with full spans but no file_id
//! or def_uid yet — those are assigned by the structural indexer (C6) once
//! the file's row exists in the store, since `def_uid` is a hash over
//! `(file_path, start_line, kind, name, signature_hash)` and `file_path` is
//! only known to the caller.
//!
//! Grounded on `src/trace/extract/{mod,treesitter,regex}.rs` (tree-sitter
//! primary, regex fallback split) and `src/parse/{treesitter,languages}.rs`
//! (per-language grammar table), generalized to the richer fact set
//! spec.md §4.C3 requires: defs, refs, scopes (tree), imports, local
//! bindings, access sites, dynamic-access markers.

pub mod heuristic;
pub mod languages;
pub mod treesitter;

use crate::store::facts::{DefKind, RefRole, RefTier, ScopeKind, Span};
use sha2::{Digest, Sha256};

pub use languages::Language;

#[derive(Debug, Clone)]
pub struct RawDef {
    pub kind: DefKind,
    pub name: String,
    /// Index into the unit's `scopes`, used by the indexer to build the
    /// dotted `lexical_path`; the parser only supplies `name` plus
    /// enclosing scope.
    pub parent_scope: Option<usize>,
    pub signature_hash: String,
    pub display_name: String,
    pub span: Span,
    pub docstring: Option<String>,
    pub is_exported: bool,
}

#[derive(Debug, Clone)]
pub struct RawRef {
    pub token_text: String,
    pub role: RefRole,
    pub ref_tier: RefTier,
    pub span: Span,
    pub containing_scope: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RawScope {
    pub kind: ScopeKind,
    pub name: Option<String>,
    pub span: Span,
    pub parent_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RawImport {
    pub imported_name: String,
    pub source_literal: Option<String>,
    pub import_kind: String,
    pub alias: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct RawLocalBind {
    pub scope_index: usize,
    pub name: String,
    pub declared_type: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct RawAccessSite {
    pub ref_index: usize,
    pub receiver_name: String,
    pub chain: Vec<String>,
    /// Declared type of the receiver, if syntactically visible (a type
    /// annotation on the binding) — used by resolver pass 3.
    pub receiver_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RawDynamicSite {
    pub kind: String,
    pub span: Span,
}

/// Complete extraction results from one source file.
#[derive(Debug, Clone, Default)]
pub struct ExtractedUnit {
    pub language: String,
    pub sha256: String,
    pub defs: Vec<RawDef>,
    pub refs: Vec<RawRef>,
    pub scopes: Vec<RawScope>,
    pub imports: Vec<RawImport>,
    pub locals: Vec<RawLocalBind>,
    pub access_sites: Vec<RawAccessSite>,
    pub dynamic_sites: Vec<RawDynamicSite>,
    /// True when the language has no grammar (`skipped_no_grammar`) and
    /// regex heuristics were used instead of tree-sitter.
    pub used_fallback: bool,
}

impl ExtractedUnit {
    pub fn empty(language: &str, content: &[u8]) -> Self {
        Self {
            language: language.to_string(),
            sha256: sha256_hex(content),
            ..Default::default()
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Extract facts from a source file, routing to tree-sitter when the
/// language has a grammar and to the regex fallback otherwise. Never
/// errors: a parse failure degrades to an empty, `used_fallback` unit
/// rather than aborting the batch (spec.md §4.C3, §7 ParseError: "never
/// aborts the batch; recorded per-file" — the caller records the failure,
/// this function just returns the best available result).
pub fn extract(path: &std::path::Path, content: &str) -> ExtractedUnit {
    let language = Language::from_path(path);
    let bytes = content.as_bytes();

    if content.trim().is_empty() {
        return ExtractedUnit::empty(language.as_str(), bytes);
    }

    if let Some(ts_lang) = language.tree_sitter_language() {
        match treesitter::extract(content, ts_lang, language) {
            Ok(mut unit) => {
                unit.sha256 = sha256_hex(bytes);
                return unit;
            }
            Err(e) => {
                tracing::warn!(
                    "tree-sitter extraction failed for {}: {e}, falling back to regex",
                    path.display()
                );
            }
        }
    }

    let mut unit = heuristic::extract(content, language);
    unit.sha256 = sha256_hex(bytes);
    unit.used_fallback = true;
    unit
}
