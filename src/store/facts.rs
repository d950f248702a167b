//! Row types for every entity in the data model (spec.md §3).
//!
//! These are plain data structs mapped to/from rusqlite rows by the
//! modules that query them (`store::bulk`, `query::*`); the store itself
//! stays generic over raw SQL rather than an ORM, matching the teacher's
//! preference for direct, typed access over a heavier abstraction.

use serde::{Deserialize, Serialize};

pub type FileId = i64;
pub type UnitId = i64;
pub type EpochId = i64;

/// A tracked source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: FileId,
    /// Repo-relative POSIX path, unique.
    pub path: String,
    /// Hex SHA-256 digest of raw bytes.
    pub content_hash: String,
    pub language: String,
    pub line_count: i64,
    pub indexed_at: Option<i64>,
    pub last_indexed_epoch: Option<EpochId>,
}

/// Freshness of a tracked file relative to the store, per spec.md §8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// File exists but has no stored `indexed_at`.
    Unindexed,
    /// Stored `content_hash` != current working-tree hash.
    Dirty,
    /// Hash matches and the file has been indexed.
    Clean,
}

/// A language-family root with probe status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub id: UnitId,
    pub name: String,
    pub family: String,
    /// Repo-relative root path.
    pub root_path: String,
    pub probe_status: ProbeStatus,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeStatus {
    Valid,
    Invalid,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Valid => "valid",
            ProbeStatus::Invalid => "invalid",
        }
    }
    pub fn from_str(s: &str) -> Self {
        match s {
            "valid" => ProbeStatus::Valid,
            _ => ProbeStatus::Invalid,
        }
    }
}

/// Singleton repository state row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoState {
    pub last_seen_head: Option<String>,
    pub checked_at: i64,
    pub current_epoch_id: EpochId,
    pub cplignore_hash: String,
}

impl Default for RepoState {
    fn default() -> Self {
        Self {
            last_seen_head: None,
            checked_at: 0,
            current_epoch_id: 0,
            cplignore_hash: String::new(),
        }
    }
}

/// A snapshot barrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epoch {
    pub epoch_id: EpochId,
    pub published_at: i64,
    pub files_indexed: i64,
    pub commit_hash: Option<String>,
}

/// Kind of a definition site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Interface,
    Trait,
    TypeAlias,
    Variable,
    Constant,
    Module,
}

impl DefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefKind::Function => "function",
            DefKind::Method => "method",
            DefKind::Class => "class",
            DefKind::Struct => "struct",
            DefKind::Enum => "enum",
            DefKind::Interface => "interface",
            DefKind::Trait => "trait",
            DefKind::TypeAlias => "type_alias",
            DefKind::Variable => "variable",
            DefKind::Constant => "constant",
            DefKind::Module => "module",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "method" => DefKind::Method,
            "class" => DefKind::Class,
            "struct" => DefKind::Struct,
            "enum" => DefKind::Enum,
            "interface" => DefKind::Interface,
            "trait" => DefKind::Trait,
            "type_alias" => DefKind::TypeAlias,
            "variable" => DefKind::Variable,
            "constant" => DefKind::Constant,
            "module" => DefKind::Module,
            _ => DefKind::Function,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

/// A definition site.
#[derive(Debug, Clone)]
pub struct DefFact {
    /// Stable 16-char hash of (file_path, start_line, kind, name, signature_hash).
    pub def_uid: String,
    pub file_id: FileId,
    pub unit_id: UnitId,
    pub kind: DefKind,
    pub name: String,
    pub qualified_name: String,
    /// Dotted path used as identity key for diff, e.g. `pkg.mod.Class.method`.
    pub lexical_path: String,
    pub signature_hash: String,
    pub display_name: String,
    pub span: Span,
    pub docstring: Option<String>,
}

/// The quality ladder on a reference's resolution. Ordinal, monotonic
/// non-decreasing: a pass may only move a ref upward, never downward, and
/// (per DESIGN.md Open Question 3) `Anchored` is never auto-upgraded to
/// `Strong` — only explicitly to `Proven` by pass 3's type-traced walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RefTier {
    Unknown,
    Anchored,
    Strong,
    Proven,
}

impl RefTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefTier::Unknown => "unknown",
            RefTier::Anchored => "anchored",
            RefTier::Strong => "strong",
            RefTier::Proven => "proven",
        }
    }
    pub fn from_str(s: &str) -> Self {
        match s {
            "anchored" => RefTier::Anchored,
            "strong" => RefTier::Strong,
            "proven" => RefTier::Proven,
            _ => RefTier::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefRole {
    Definition,
    Reference,
    Import,
    Call,
}

impl RefRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefRole::Definition => "definition",
            RefRole::Reference => "reference",
            RefRole::Import => "import",
            RefRole::Call => "call",
        }
    }
    pub fn from_str(s: &str) -> Self {
        match s {
            "definition" => RefRole::Definition,
            "import" => RefRole::Import,
            "call" => RefRole::Call,
            _ => RefRole::Reference,
        }
    }
}

/// A reference site.
#[derive(Debug, Clone)]
pub struct RefFact {
    pub id: i64,
    pub file_id: FileId,
    /// Nullable until resolved.
    pub target_def_uid: Option<String>,
    pub token_text: String,
    pub role: RefRole,
    pub ref_tier: RefTier,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    File,
    Class,
    Function,
    Method,
    Block,
    Lambda,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::File => "file",
            ScopeKind::Class => "class",
            ScopeKind::Function => "function",
            ScopeKind::Method => "method",
            ScopeKind::Block => "block",
            ScopeKind::Lambda => "lambda",
        }
    }
    pub fn from_str(s: &str) -> Self {
        match s {
            "class" => ScopeKind::Class,
            "function" => ScopeKind::Function,
            "method" => ScopeKind::Method,
            "block" => ScopeKind::Block,
            "lambda" => ScopeKind::Lambda,
            _ => ScopeKind::File,
        }
    }
}

/// A lexical scope.
#[derive(Debug, Clone)]
pub struct ScopeFact {
    pub id: i64,
    pub file_id: FileId,
    pub unit_id: UnitId,
    pub kind: ScopeKind,
    pub parent_scope_id: Option<i64>,
    pub span: Span,
}

/// An import edge.
#[derive(Debug, Clone)]
pub struct ImportFact {
    pub id: i64,
    pub file_id: FileId,
    pub unit_id: UnitId,
    pub imported_name: String,
    pub source_literal: Option<String>,
    pub resolved_path: Option<String>,
    pub import_kind: String,
    pub alias: Option<String>,
    /// certain | heuristic, matching the resolver's certainty vocabulary
    /// (pass 4 config-file refs always record `certain`).
    pub certainty: String,
}

/// A member of a type declaration.
#[derive(Debug, Clone)]
pub struct TypeMemberFact {
    pub id: i64,
    pub parent_def_uid: String,
    pub parent_type_name: String,
    pub parent_kind: DefKind,
    pub member_name: String,
    pub member_def_uid: Option<String>,
    pub type_annotation: Option<String>,
    pub visibility: String,
    pub is_static: bool,
    pub span: Span,
}

/// An intra-procedural access chain (`obj.a.b.c()`).
#[derive(Debug, Clone)]
pub struct MemberAccessFact {
    pub id: i64,
    pub file_id: FileId,
    pub ref_id: i64,
    pub receiver_name: String,
    pub chain: Vec<String>,
    pub resolution_method: Option<String>,
    pub ambiguous: bool,
    /// Every candidate def_uid at or above threshold, even when ambiguous
    /// (original `shape_resolver.py` keeps the full candidate list, not
    /// just a boolean).
    pub candidates: Vec<(String, f64)>,
}

/// The accumulated shape of a receiver: set of fields/methods observed on
/// it, used for shape-based type inference (pass 5) when declared types
/// are missing.
#[derive(Debug, Clone, Default)]
pub struct ReceiverShapeFact {
    pub receiver_name: String,
    pub fields: Vec<String>,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LocalBindFact {
    pub id: i64,
    pub file_id: FileId,
    pub scope_id: i64,
    pub name: String,
    pub declared_type: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct DynamicAccessSite {
    pub id: i64,
    pub file_id: FileId,
    /// e.g. `getattr`, `reflect.ValueOf`, `Class.forName` — reflective
    /// lookups the parser can recognize syntactically but not resolve.
    pub kind: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ExportSurface {
    pub id: i64,
    pub file_id: FileId,
    pub unit_id: UnitId,
}

#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub id: i64,
    pub surface_id: i64,
    pub name: String,
    pub def_uid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnchorGroup {
    pub id: i64,
    pub file_id: FileId,
    pub label: String,
    pub ref_ids: Vec<i64>,
}

/// A frozen per-file snapshot of DefFacts at epoch publish time, used as
/// the diff engine's comparison basis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefSnapshotRecord {
    pub epoch_id: EpochId,
    pub file_path: String,
    pub kind: String,
    pub name: String,
    pub lexical_path: String,
    pub signature_hash: String,
    pub def_uid: String,
    pub start_line: u32,
    pub end_line: u32,
}
