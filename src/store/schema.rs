//! DDL for the relational store, including the composite indexes the
//! query surface depends on (spec.md §4.C1: def by (file,name); ref by
//! (file,target); ref by (target,tier); scope by file).

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id              INTEGER PRIMARY KEY,
    path            TEXT NOT NULL UNIQUE,
    content_hash    TEXT NOT NULL,
    language        TEXT NOT NULL,
    line_count      INTEGER NOT NULL DEFAULT 0,
    indexed_at      INTEGER,
    last_indexed_epoch INTEGER
);

CREATE TABLE IF NOT EXISTS contexts (
    id              INTEGER PRIMARY KEY,
    name            TEXT NOT NULL,
    family          TEXT NOT NULL,
    root_path       TEXT NOT NULL,
    probe_status    TEXT NOT NULL,
    include_globs   TEXT NOT NULL DEFAULT '[]',
    exclude_globs   TEXT NOT NULL DEFAULT '[]',
    UNIQUE(family, root_path)
);

CREATE TABLE IF NOT EXISTS repo_state (
    id                  INTEGER PRIMARY KEY CHECK (id = 1),
    last_seen_head      TEXT,
    checked_at          INTEGER NOT NULL DEFAULT 0,
    current_epoch_id    INTEGER NOT NULL DEFAULT 0,
    cplignore_hash      TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS epochs (
    epoch_id        INTEGER PRIMARY KEY,
    published_at    INTEGER NOT NULL,
    files_indexed   INTEGER NOT NULL DEFAULT 0,
    commit_hash     TEXT
);

CREATE TABLE IF NOT EXISTS def_facts (
    def_uid         TEXT PRIMARY KEY,
    file_id         INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    unit_id         INTEGER NOT NULL DEFAULT 0,
    kind            TEXT NOT NULL,
    name            TEXT NOT NULL,
    qualified_name  TEXT NOT NULL,
    lexical_path    TEXT NOT NULL,
    signature_hash  TEXT NOT NULL,
    display_name    TEXT NOT NULL,
    start_line      INTEGER NOT NULL,
    start_col       INTEGER NOT NULL,
    end_line        INTEGER NOT NULL,
    end_col         INTEGER NOT NULL,
    docstring       TEXT
);
CREATE INDEX IF NOT EXISTS idx_def_facts_file_name ON def_facts(file_id, name);
CREATE INDEX IF NOT EXISTS idx_def_facts_lexical_path ON def_facts(lexical_path);

CREATE TABLE IF NOT EXISTS ref_facts (
    id              INTEGER PRIMARY KEY,
    file_id         INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    target_def_uid  TEXT,
    token_text      TEXT NOT NULL,
    role            TEXT NOT NULL,
    ref_tier        TEXT NOT NULL,
    start_line      INTEGER NOT NULL,
    start_col       INTEGER NOT NULL,
    end_line        INTEGER NOT NULL,
    end_col         INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ref_facts_file_target ON ref_facts(file_id, target_def_uid);
CREATE INDEX IF NOT EXISTS idx_ref_facts_target_tier ON ref_facts(target_def_uid, ref_tier);

CREATE TABLE IF NOT EXISTS scope_facts (
    id              INTEGER PRIMARY KEY,
    file_id         INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    unit_id         INTEGER NOT NULL DEFAULT 0,
    kind            TEXT NOT NULL,
    parent_scope_id INTEGER,
    start_line      INTEGER NOT NULL,
    start_col       INTEGER NOT NULL,
    end_line        INTEGER NOT NULL,
    end_col         INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scope_facts_file ON scope_facts(file_id);

CREATE TABLE IF NOT EXISTS import_facts (
    id              INTEGER PRIMARY KEY,
    file_id         INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    unit_id         INTEGER NOT NULL DEFAULT 0,
    imported_name   TEXT NOT NULL,
    source_literal  TEXT,
    resolved_path   TEXT,
    import_kind     TEXT NOT NULL,
    alias           TEXT,
    certainty       TEXT NOT NULL DEFAULT 'heuristic'
);
CREATE INDEX IF NOT EXISTS idx_import_facts_file ON import_facts(file_id);
CREATE INDEX IF NOT EXISTS idx_import_facts_source ON import_facts(source_literal);

CREATE TABLE IF NOT EXISTS type_member_facts (
    id                  INTEGER PRIMARY KEY,
    parent_def_uid      TEXT NOT NULL REFERENCES def_facts(def_uid) ON DELETE CASCADE,
    parent_type_name    TEXT NOT NULL,
    parent_kind         TEXT NOT NULL,
    member_name         TEXT NOT NULL,
    member_def_uid      TEXT,
    type_annotation     TEXT,
    visibility          TEXT NOT NULL DEFAULT 'public',
    is_static           INTEGER NOT NULL DEFAULT 0,
    start_line          INTEGER NOT NULL,
    start_col           INTEGER NOT NULL,
    end_line            INTEGER NOT NULL,
    end_col             INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_type_member_parent ON type_member_facts(parent_def_uid);
CREATE INDEX IF NOT EXISTS idx_type_member_name ON type_member_facts(parent_type_name, member_name);

CREATE TABLE IF NOT EXISTS member_access_facts (
    id                  INTEGER PRIMARY KEY,
    file_id             INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    ref_id              INTEGER NOT NULL REFERENCES ref_facts(id) ON DELETE CASCADE,
    receiver_name       TEXT NOT NULL,
    chain_json          TEXT NOT NULL,
    resolution_method   TEXT,
    ambiguous           INTEGER NOT NULL DEFAULT 0,
    candidates_json     TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_member_access_file ON member_access_facts(file_id);

CREATE TABLE IF NOT EXISTS local_bind_facts (
    id              INTEGER PRIMARY KEY,
    file_id         INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    scope_id        INTEGER NOT NULL REFERENCES scope_facts(id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    declared_type   TEXT,
    start_line      INTEGER NOT NULL,
    start_col       INTEGER NOT NULL,
    end_line        INTEGER NOT NULL,
    end_col         INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_local_bind_scope ON local_bind_facts(scope_id, name);

CREATE TABLE IF NOT EXISTS dynamic_access_sites (
    id              INTEGER PRIMARY KEY,
    file_id         INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    kind            TEXT NOT NULL,
    start_line      INTEGER NOT NULL,
    start_col       INTEGER NOT NULL,
    end_line        INTEGER NOT NULL,
    end_col         INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS export_surfaces (
    id              INTEGER PRIMARY KEY,
    file_id         INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    unit_id         INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS export_entries (
    id              INTEGER PRIMARY KEY,
    surface_id      INTEGER NOT NULL REFERENCES export_surfaces(id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    def_uid         TEXT
);

CREATE TABLE IF NOT EXISTS anchor_groups (
    id              INTEGER PRIMARY KEY,
    file_id         INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    label           TEXT NOT NULL,
    ref_ids_json    TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS def_snapshots (
    epoch_id        INTEGER NOT NULL,
    file_path       TEXT NOT NULL,
    kind            TEXT NOT NULL,
    name            TEXT NOT NULL,
    lexical_path    TEXT NOT NULL,
    signature_hash  TEXT NOT NULL,
    def_uid         TEXT NOT NULL,
    start_line      INTEGER NOT NULL,
    end_line        INTEGER NOT NULL,
    PRIMARY KEY (epoch_id, file_path, def_uid)
);
CREATE INDEX IF NOT EXISTS idx_def_snapshots_epoch_file ON def_snapshots(epoch_id, file_path);
"#;

/// Pragmas applied once per connection: WAL for concurrent readers, a busy
/// timeout as the engine-level backstop under the store's own retry loop.
pub fn pragmas(busy_timeout_ms: u64) -> Vec<String> {
    vec![
        "PRAGMA journal_mode = WAL".to_string(),
        "PRAGMA synchronous = NORMAL".to_string(),
        "PRAGMA foreign_keys = ON".to_string(),
        format!("PRAGMA busy_timeout = {busy_timeout_ms}"),
    ]
}
