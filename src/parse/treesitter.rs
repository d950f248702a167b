//! Tree-sitter based extraction: the primary path for any language with a
//! grammar in the workspace (spec.md §4.C3).
//!
//! Grounded on `src/trace/extract/treesitter.rs`'s per-language query
//! tables and capture-walking style (`Query`/`QueryCursor`/
//! `streaming_iterator`), generalized from that module's symbols/calls/
//! references/scopes quadruple to the full fact set the indexer (C6) and
//! resolver (C7) need: defs, refs, scopes, imports, local bindings, access
//! chains, and dynamic-access markers. Query tables are extended to cover
//! java/c/cpp, which the trace module never supported.

use crate::parse::{
    ExtractedUnit, Language, RawAccessSite, RawDef, RawDynamicSite, RawImport, RawLocalBind,
    RawRef, RawScope,
};
use crate::store::facts::{DefKind, RefRole, RefTier, ScopeKind, Span};
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, Query, QueryCursor, Tree};

#[derive(Debug, thiserror::Error)]
pub enum TreeSitterExtractError {
    #[error("failed to set tree-sitter grammar: {0}")]
    GrammarSet(String),
    #[error("parser produced no tree")]
    NoTree,
    #[error("invalid query ({concern}): {message}")]
    InvalidQuery { concern: &'static str, message: String },
}

type TsResult<T> = std::result::Result<T, TreeSitterExtractError>;

pub fn extract(
    content: &str,
    ts_lang: tree_sitter::Language,
    language: Language,
) -> TsResult<ExtractedUnit> {
    let mut parser = Parser::new();
    parser
        .set_language(&ts_lang)
        .map_err(|e| TreeSitterExtractError::GrammarSet(e.to_string()))?;
    let tree = parser
        .parse(content, None)
        .ok_or(TreeSitterExtractError::NoTree)?;

    let source = content.as_bytes();
    let mut unit = ExtractedUnit {
        language: language.as_str().to_string(),
        ..Default::default()
    };

    let mut builder = ScopeBuilder::default();
    walk_scopes(tree.root_node(), language, None, &mut builder, source);
    unit.scopes = builder.scopes;

    extract_defs(&tree, source, &ts_lang, language, &builder, &mut unit)?;
    extract_imports(&tree, source, &ts_lang, language, &mut unit)?;
    extract_refs(&tree, source, &ts_lang, language, &builder, &mut unit)?;
    extract_locals(&tree, source, &ts_lang, language, &builder, &mut unit)?;
    extract_dynamic_sites(content, language, &mut unit);

    Ok(unit)
}

fn span_of(node: Node) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span {
        start_line: start.row as u32 + 1,
        start_col: start.column as u32,
        end_line: end.row as u32 + 1,
        end_col: end.column as u32,
    }
}

/// Records the scope tree as it is walked, plus the byte ranges needed to
/// find the innermost scope enclosing an arbitrary node (refs, locals).
#[derive(Default)]
struct ScopeBuilder {
    scopes: Vec<RawScope>,
    byte_ranges: Vec<(usize, usize)>,
}

impl ScopeBuilder {
    fn push(&mut self, kind: ScopeKind, name: Option<String>, node: Node, parent: Option<usize>) -> usize {
        self.scopes.push(RawScope {
            kind,
            name,
            span: span_of(node),
            parent_index: parent,
        });
        self.byte_ranges.push((node.start_byte(), node.end_byte()));
        self.scopes.len() - 1
    }

    /// The innermost recorded scope containing `byte_pos`, i.e. the
    /// containing scope with the latest start offset.
    fn containing(&self, byte_pos: usize) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, (start, end)) in self.byte_ranges.iter().enumerate() {
            if *start <= byte_pos && byte_pos < *end {
                match best {
                    Some(b) if self.byte_ranges[b].0 >= *start => {}
                    _ => best = Some(i),
                }
            }
        }
        best
    }
}

fn scope_kind_for_node(language: Language, kind: &str) -> Option<ScopeKind> {
    use Language::*;
    match language {
        Rust => match kind {
            "source_file" => Some(ScopeKind::File),
            "function_item" => Some(ScopeKind::Function),
            "closure_expression" => Some(ScopeKind::Lambda),
            "impl_item" | "struct_item" | "trait_item" | "enum_item" => Some(ScopeKind::Class),
            "block" => Some(ScopeKind::Block),
            _ => None,
        },
        TypeScript | TypeScriptReact | JavaScript | JavaScriptReact => match kind {
            "program" => Some(ScopeKind::File),
            "function_declaration" | "function_expression" | "method_definition" => {
                Some(ScopeKind::Function)
            }
            "class_declaration" | "class" => Some(ScopeKind::Class),
            "arrow_function" => Some(ScopeKind::Lambda),
            "statement_block" => Some(ScopeKind::Block),
            _ => None,
        },
        Python => match kind {
            "module" => Some(ScopeKind::File),
            "function_definition" => Some(ScopeKind::Function),
            "class_definition" => Some(ScopeKind::Class),
            "lambda" => Some(ScopeKind::Lambda),
            "block" => Some(ScopeKind::Block),
            _ => None,
        },
        Go => match kind {
            "source_file" => Some(ScopeKind::File),
            "function_declaration" => Some(ScopeKind::Function),
            "method_declaration" => Some(ScopeKind::Method),
            "func_literal" => Some(ScopeKind::Lambda),
            "block" => Some(ScopeKind::Block),
            _ => None,
        },
        Java => match kind {
            "program" => Some(ScopeKind::File),
            "class_declaration" | "interface_declaration" | "enum_declaration" => {
                Some(ScopeKind::Class)
            }
            "method_declaration" | "constructor_declaration" => Some(ScopeKind::Method),
            "lambda_expression" => Some(ScopeKind::Lambda),
            "block" => Some(ScopeKind::Block),
            _ => None,
        },
        C | Cpp => match kind {
            "translation_unit" => Some(ScopeKind::File),
            "function_definition" => Some(ScopeKind::Function),
            "class_specifier" | "struct_specifier" => Some(ScopeKind::Class),
            "compound_statement" => Some(ScopeKind::Block),
            _ => None,
        },
        _ => None,
    }
}

fn scope_name(node: Node, source: &[u8]) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())
        .map(|s| s.to_string())
}

fn walk_scopes(
    node: Node,
    language: Language,
    parent: Option<usize>,
    builder: &mut ScopeBuilder,
    source: &[u8],
) {
    let mut current_parent = parent;
    if let Some(kind) = scope_kind_for_node(language, node.kind()) {
        let name = scope_name(node, source);
        current_parent = Some(builder.push(kind, name, node, parent));
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_scopes(child, language, current_parent, builder, source);
    }
}

fn run_query(
    ts_lang: &tree_sitter::Language,
    tree: &Tree,
    source: &[u8],
    query_str: &str,
    concern: &'static str,
    mut on_match: impl FnMut(&Query, &tree_sitter::QueryMatch, &[u8]),
) -> TsResult<()> {
    if query_str.is_empty() {
        return Ok(());
    }
    let query = Query::new(ts_lang, query_str).map_err(|e| TreeSitterExtractError::InvalidQuery {
        concern,
        message: e.to_string(),
    })?;
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), source);
    while let Some(m) = matches.next() {
        on_match(&query, m, source);
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Defs
// ---------------------------------------------------------------------

fn def_query(language: Language) -> &'static str {
    use Language::*;
    match language {
        Rust => {
            "(function_item name: (identifier) @name) @function
(struct_item name: (type_identifier) @name) @struct
(enum_item name: (type_identifier) @name) @enum
(trait_item name: (type_identifier) @name) @trait
(type_item name: (type_identifier) @name) @type_alias
(const_item name: (identifier) @name) @constant
(static_item name: (identifier) @name) @constant
(mod_item name: (identifier) @name) @module"
        }
        TypeScript | TypeScriptReact => {
            "(function_declaration name: (identifier) @name) @function
(class_declaration name: (type_identifier) @name) @class
(method_definition name: (property_identifier) @name) @method
(interface_declaration name: (type_identifier) @name) @interface
(type_alias_declaration name: (type_identifier) @name) @type_alias
(variable_declarator name: (identifier) @name value: (arrow_function)) @function"
        }
        JavaScript | JavaScriptReact => {
            "(function_declaration name: (identifier) @name) @function
(class_declaration name: (identifier) @name) @class
(method_definition name: (property_identifier) @name) @method
(variable_declarator name: (identifier) @name value: (arrow_function)) @function"
        }
        Python => {
            "(function_definition name: (identifier) @name) @function
(class_definition name: (identifier) @name) @class"
        }
        Go => {
            "(function_declaration name: (identifier) @name) @function
(method_declaration name: (field_identifier) @name) @method
(type_declaration (type_spec name: (type_identifier) @name type: (struct_type))) @struct
(type_declaration (type_spec name: (type_identifier) @name type: (interface_type))) @interface
(const_spec name: (identifier) @name) @constant"
        }
        Java => {
            "(method_declaration name: (identifier) @name) @method
(class_declaration name: (identifier) @name) @class
(interface_declaration name: (identifier) @name) @interface
(enum_declaration name: (identifier) @name) @enum"
        }
        C => {
            "(function_definition declarator: (function_declarator declarator: (identifier) @name)) @function
(struct_specifier name: (type_identifier) @name) @struct"
        }
        Cpp => {
            "(function_definition declarator: (function_declarator declarator: (identifier) @name)) @function
(class_specifier name: (type_identifier) @name) @class
(struct_specifier name: (type_identifier) @name) @struct"
        }
        _ => "",
    }
}

fn def_kind_for_capture(capture: &str) -> Option<DefKind> {
    match capture {
        "function" => Some(DefKind::Function),
        "method" => Some(DefKind::Method),
        "class" => Some(DefKind::Class),
        "struct" => Some(DefKind::Struct),
        "enum" => Some(DefKind::Enum),
        "interface" => Some(DefKind::Interface),
        "trait" => Some(DefKind::Trait),
        "type_alias" => Some(DefKind::TypeAlias),
        "constant" => Some(DefKind::Constant),
        "module" => Some(DefKind::Module),
        _ => None,
    }
}

fn extract_defs(
    tree: &Tree,
    source: &[u8],
    ts_lang: &tree_sitter::Language,
    language: Language,
    scopes: &ScopeBuilder,
    unit: &mut ExtractedUnit,
) -> TsResult<()> {
    run_query(
        ts_lang,
        tree,
        source,
        def_query(language),
        "defs",
        |query, m, source| {
            let mut name: Option<String> = None;
            let mut name_start = 0usize;
            let mut kind = DefKind::Function;
            let mut def_node: Option<Node> = None;

            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                if capture_name == "name" {
                    name = capture.node.utf8_text(source).ok().map(|s| s.to_string());
                    name_start = capture.node.start_byte();
                } else if let Some(k) = def_kind_for_capture(capture_name) {
                    kind = k;
                    def_node = Some(capture.node);
                }
            }
            let (Some(name), Some(def_node)) = (name, def_node) else {
                return;
            };

            // `export`/`pub` visibility is a sibling/ancestor token, cheap to
            // check against the raw source slice rather than another query.
            let line_start = source[..def_node.start_byte()]
                .iter()
                .rposition(|b| *b == b'\n')
                .map(|p| p + 1)
                .unwrap_or(0);
            let prefix = std::str::from_utf8(&source[line_start..def_node.start_byte()]).unwrap_or("");
            let is_exported = prefix.contains("pub ") || prefix.contains("export") || prefix.contains("public ");

            let parent_scope = scopes.containing(name_start);
            let span = span_of(def_node);
            let text = def_node.utf8_text(source).unwrap_or("");
            let signature_hash = crate::parse::sha256_hex(text.as_bytes())[..16].to_string();

            unit.defs.push(RawDef {
                kind,
                name: name.clone(),
                parent_scope,
                signature_hash,
                display_name: name,
                span,
                docstring: None,
                is_exported,
            });
        },
    )
}

// ---------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------

fn import_query(language: Language) -> &'static str {
    use Language::*;
    match language {
        Rust => "(use_declaration argument: (_) @source) @use",
        TypeScript | TypeScriptReact | JavaScript | JavaScriptReact => {
            "(import_statement source: (string) @source) @import
(import_statement (import_clause (named_imports (import_specifier name: (identifier) @name)))) @named_import"
        }
        Python => {
            "(import_statement name: (dotted_name) @name) @import
(import_from_statement module_name: (dotted_name) @source) @import_from"
        }
        Go => "(import_spec path: (interpreted_string_literal) @source) @import",
        Java => "(import_declaration (scoped_identifier) @name) @import",
        C | Cpp => "(preproc_include path: (_) @source) @import",
        _ => "",
    }
}

fn extract_imports(
    tree: &Tree,
    source: &[u8],
    ts_lang: &tree_sitter::Language,
    language: Language,
    unit: &mut ExtractedUnit,
) -> TsResult<()> {
    run_query(
        ts_lang,
        tree,
        source,
        import_query(language),
        "imports",
        |query, m, source| {
            let mut name: Option<String> = None;
            let mut source_literal: Option<String> = None;
            let mut kind = "import";
            let mut span = None;
            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                let text = capture
                    .node
                    .utf8_text(source)
                    .ok()
                    .map(|s| s.trim_matches('"').trim_matches('\'').to_string());
                match capture_name {
                    "name" => name = text,
                    "source" => source_literal = text,
                    "import" | "import_from" | "use" | "named_import" => {
                        kind = capture_name;
                        span = Some(span_of(capture.node));
                    }
                    _ => {}
                }
            }
            let imported_name = name.clone().or_else(|| source_literal.clone()).unwrap_or_default();
            if imported_name.is_empty() {
                return;
            }
            unit.imports.push(RawImport {
                imported_name,
                source_literal,
                import_kind: kind.to_string(),
                alias: None,
                span: span.unwrap_or_default(),
            });
        },
    )
}

// ---------------------------------------------------------------------
// Refs (calls + member access chains)
// ---------------------------------------------------------------------

fn call_query(language: Language) -> &'static str {
    use Language::*;
    match language {
        Rust => {
            "(call_expression function: (identifier) @callee) @call
(call_expression function: (field_expression value: (identifier) @receiver field: (field_identifier) @callee)) @method_call
(macro_invocation macro: (identifier) @callee) @macro_call"
        }
        TypeScript | TypeScriptReact | JavaScript | JavaScriptReact => {
            "(call_expression function: (identifier) @callee) @call
(call_expression function: (member_expression object: (identifier) @receiver property: (property_identifier) @callee)) @method_call"
        }
        Python => {
            "(call function: (identifier) @callee) @call
(call function: (attribute object: (identifier) @receiver attribute: (identifier) @callee)) @method_call"
        }
        Go => {
            "(call_expression function: (identifier) @callee) @call
(call_expression function: (selector_expression operand: (identifier) @receiver field: (field_identifier) @callee)) @method_call"
        }
        Java => {
            "(method_invocation object: (identifier) @receiver name: (identifier) @callee) @method_call
(method_invocation name: (identifier) @callee) @call"
        }
        C | Cpp => "(call_expression function: (identifier) @callee) @call",
        _ => "",
    }
}

fn extract_refs(
    tree: &Tree,
    source: &[u8],
    ts_lang: &tree_sitter::Language,
    language: Language,
    scopes: &ScopeBuilder,
    unit: &mut ExtractedUnit,
) -> TsResult<()> {
    run_query(
        ts_lang,
        tree,
        source,
        call_query(language),
        "calls",
        |query, m, source| {
            let mut callee: Option<String> = None;
            let mut receiver: Option<String> = None;
            let mut call_node: Option<Node> = None;
            let mut is_method_call = false;

            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                match capture_name {
                    "callee" => callee = capture.node.utf8_text(source).ok().map(|s| s.to_string()),
                    "receiver" => receiver = capture.node.utf8_text(source).ok().map(|s| s.to_string()),
                    "call" | "method_call" | "macro_call" => {
                        call_node = Some(capture.node);
                        is_method_call = capture_name == "method_call";
                    }
                    _ => {}
                }
            }
            let (Some(callee), Some(call_node)) = (callee, call_node) else {
                return;
            };
            let span = span_of(call_node);
            let containing_scope = scopes.containing(call_node.start_byte());
            let ref_index = unit.refs.len();

            unit.refs.push(RawRef {
                token_text: callee.clone(),
                role: RefRole::Call,
                ref_tier: RefTier::Unknown,
                span,
                containing_scope,
            });

            if is_method_call {
                if let Some(receiver_name) = receiver {
                    unit.access_sites.push(RawAccessSite {
                        ref_index,
                        receiver_name,
                        chain: vec![callee],
                        receiver_type: None,
                    });
                }
            }
        },
    )
}

// ---------------------------------------------------------------------
// Local bindings
// ---------------------------------------------------------------------

fn local_query(language: Language) -> &'static str {
    use Language::*;
    match language {
        Rust => "(let_declaration pattern: (identifier) @name type: (_)? @type) @let",
        TypeScript | TypeScriptReact => {
            "(variable_declarator name: (identifier) @name type: (type_annotation (_) @type)) @decl
(variable_declarator name: (identifier) @name) @decl"
        }
        JavaScript | JavaScriptReact => "(variable_declarator name: (identifier) @name) @decl",
        Python => "(assignment left: (identifier) @name type: (type) @type) @decl",
        Go => "(short_var_declaration left: (expression_list (identifier) @name)) @decl",
        Java => {
            "(local_variable_declaration type: (_) @type declarator: (variable_declarator name: (identifier) @name)) @decl"
        }
        C | Cpp => "(declaration type: (_) @type declarator: (identifier) @name) @decl",
        _ => "",
    }
}

fn extract_locals(
    tree: &Tree,
    source: &[u8],
    ts_lang: &tree_sitter::Language,
    language: Language,
    scopes: &ScopeBuilder,
    unit: &mut ExtractedUnit,
) -> TsResult<()> {
    run_query(
        ts_lang,
        tree,
        source,
        local_query(language),
        "locals",
        |query, m, source| {
            let mut name: Option<String> = None;
            let mut declared_type: Option<String> = None;
            let mut decl_node: Option<Node> = None;
            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                match capture_name {
                    "name" => name = capture.node.utf8_text(source).ok().map(|s| s.to_string()),
                    "type" => declared_type = capture.node.utf8_text(source).ok().map(|s| s.to_string()),
                    "decl" | "let" => decl_node = Some(capture.node),
                    _ => {}
                }
            }
            let (Some(name), Some(decl_node)) = (name, decl_node) else {
                return;
            };
            let scope_index = scopes.containing(decl_node.start_byte()).unwrap_or(0);
            unit.locals.push(RawLocalBind {
                scope_index,
                name,
                declared_type,
                span: span_of(decl_node),
            });
        },
    )
}

// ---------------------------------------------------------------------
// Dynamic access sites
// ---------------------------------------------------------------------

/// Markers for reflective/dynamic lookups the parser can spot lexically
/// but never resolve statically (spec.md §4.C3's `dynamic_access_sites`).
/// A tree-sitter query per marker is overkill for a handful of fixed
/// identifiers, so these are found by a source scan, same as the teacher's
/// trace extraction falls back to text matching for signals a grammar
/// doesn't cleanly capture (e.g. `is_common_builtin`).
fn dynamic_markers(language: Language) -> &'static [(&'static str, &'static str)] {
    use Language::*;
    match language {
        Python => &[
            ("getattr(", "getattr"),
            ("setattr(", "setattr"),
            ("__import__(", "dynamic_import"),
        ],
        TypeScript | TypeScriptReact | JavaScript | JavaScriptReact => {
            &[("Reflect.get(", "reflect_get"), ("eval(", "eval")]
        }
        Go => &[
            ("reflect.ValueOf(", "reflect_value_of"),
            ("reflect.TypeOf(", "reflect_type_of"),
        ],
        Java => &[
            ("Class.forName(", "class_for_name"),
            ("getDeclaredMethod(", "reflect_method"),
        ],
        Ruby => &[("send(", "send"), ("public_send(", "public_send")],
        _ => &[],
    }
}

fn extract_dynamic_sites(content: &str, language: Language, unit: &mut ExtractedUnit) {
    let markers = dynamic_markers(language);
    if markers.is_empty() {
        return;
    }
    for (line_idx, line) in content.lines().enumerate() {
        for (needle, kind) in markers {
            if let Some(col) = line.find(needle) {
                unit.dynamic_sites.push(RawDynamicSite {
                    kind: kind.to_string(),
                    span: Span {
                        start_line: line_idx as u32 + 1,
                        start_col: col as u32,
                        end_line: line_idx as u32 + 1,
                        end_col: (col + needle.len()) as u32,
                    },
                });
            }
        }
    }
}
