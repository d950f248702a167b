//! Regex-based extraction fallback for languages with no tree-sitter
//! grammar in the workspace, or whose tree-sitter pass errored.
//!
//! Grounded on `src/trace/extract/regex.rs`'s `FunctionPattern`/
//! `ClassPattern`/`ImportPattern` tables and `is_keyword`/`is_builtin`
//! noise filters, generalized to emit `RawDef`/`RawImport`/`RawRef` (no
//! scope tree beyond one file-level scope, no local bindings or access
//! chains — a regex pass can't reliably recover those without a grammar).

use crate::parse::{ExtractedUnit, Language, RawDef, RawImport, RawRef, RawScope};
use crate::store::facts::{DefKind, RefRole, RefTier, ScopeKind, Span};
use once_cell::sync::Lazy;
use regex::Regex;

struct DefPattern {
    regex: Regex,
    kind: DefKind,
}

static FUNCTION_PATTERNS: Lazy<Vec<DefPattern>> = Lazy::new(|| {
    vec![
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*(?:export\s+)?(?:async\s+)?function\s+([a-zA-Z_$][a-zA-Z0-9_$]*)\s*\(").unwrap(),
            kind: DefKind::Function,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*(?:export\s+)?(?:const|let|var)\s+([a-zA-Z_$][a-zA-Z0-9_$]*)\s*=\s*(?:async\s+)?\([^)]*\)\s*=>").unwrap(),
            kind: DefKind::Function,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*(?:async\s+)?def\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\(").unwrap(),
            kind: DefKind::Function,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*[<(]").unwrap(),
            kind: DefKind::Function,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*func\s+(?:\([^)]+\)\s+)?([a-zA-Z_][a-zA-Z0-9_]*)\s*\(").unwrap(),
            kind: DefKind::Function,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*def\s+([a-zA-Z_][a-zA-Z0-9_!?]*)").unwrap(),
            kind: DefKind::Method,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*(?:public|private|protected|static|\s)*function\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\(").unwrap(),
            kind: DefKind::Function,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*(?:public|private|protected|static|\s)*(?:async\s+)?(?:[a-zA-Z_<>\[\]]+\s+)+([a-zA-Z_][a-zA-Z0-9_]*)\s*\([^)]*\)\s*(?:throws\s+[^\{]+)?\{").unwrap(),
            kind: DefKind::Method,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*def[p]?\s+([a-zA-Z_][a-zA-Z0-9_!?]*)").unwrap(),
            kind: DefKind::Function,
        },
    ]
});

static CLASS_PATTERNS: Lazy<Vec<DefPattern>> = Lazy::new(|| {
    vec![
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*(?:export\s+)?(?:abstract\s+)?class\s+([a-zA-Z_$][a-zA-Z0-9_$]*)").unwrap(),
            kind: DefKind::Class,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*(?:export\s+)?interface\s+([a-zA-Z_$][a-zA-Z0-9_$]*)").unwrap(),
            kind: DefKind::Interface,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*class\s+([a-zA-Z_][a-zA-Z0-9_]*)").unwrap(),
            kind: DefKind::Class,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*(?:class|module)\s+([a-zA-Z_][a-zA-Z0-9_:]*)").unwrap(),
            kind: DefKind::Class,
        },
        DefPattern {
            regex: Regex::new(r"(?m)^[\t ]*(?:abstract\s+)?(?:final\s+)?class\s+([a-zA-Z_][a-zA-Z0-9_]*)").unwrap(),
            kind: DefKind::Class,
        },
    ]
});

static CALL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-zA-Z_][a-zA-Z0-9_]*)\s*\(").unwrap());

static IMPORT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?m)^[\t ]*require(?:_relative)?\s+['"]([@a-zA-Z0-9_./-]+)['"]"#).unwrap(),
        Regex::new(r"(?m)^[\t ]*use\s+([a-zA-Z_\\][a-zA-Z0-9_\\]*)").unwrap(),
        Regex::new(r"(?m)^[\t ]*import\s+(?:static\s+)?([a-zA-Z_][a-zA-Z0-9_.]*(?:\.\*)?)\s*;").unwrap(),
    ]
});

/// Extract a best-effort fact set via regex, for languages with no
/// tree-sitter grammar (or whose tree-sitter pass failed). Never errors:
/// worst case it returns an empty unit with just a file-level scope.
pub fn extract(content: &str, language: Language) -> ExtractedUnit {
    let mut unit = ExtractedUnit {
        language: language.as_str().to_string(),
        ..Default::default()
    };

    let total_lines = content.lines().count().max(1) as u32;
    unit.scopes.push(RawScope {
        kind: ScopeKind::File,
        name: None,
        span: Span {
            start_line: 1,
            start_col: 0,
            end_line: total_lines,
            end_col: 0,
        },
        parent_index: None,
    });

    extract_defs(content, &FUNCTION_PATTERNS, DefKind::Function, &mut unit);
    extract_defs(content, &CLASS_PATTERNS, DefKind::Class, &mut unit);
    extract_calls(content, &mut unit);
    extract_imports(content, &mut unit);

    unit
}

fn line_col_of(content: &str, byte_offset: usize) -> (u32, u32) {
    let line = content[..byte_offset].matches('\n').count() as u32 + 1;
    let line_start = content[..byte_offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    (line, (byte_offset - line_start) as u32)
}

fn extract_defs(content: &str, patterns: &[DefPattern], default_kind: DefKind, unit: &mut ExtractedUnit) {
    for pattern in patterns {
        for caps in pattern.regex.captures_iter(content) {
            let Some(name_match) = caps.get(1) else { continue };
            let name = name_match.as_str().to_string();
            if is_keyword(&name) {
                continue;
            }
            let (start_line, start_col) = line_col_of(content, name_match.start());
            let full_match = caps.get(0).map(|m| m.as_str()).unwrap_or("");
            let is_exported = full_match.contains("export") || full_match.trim_start().starts_with("pub ");
            let kind = if pattern.kind == DefKind::Function { default_kind } else { pattern.kind };
            let signature_hash = crate::parse::sha256_hex(full_match.as_bytes())[..16].to_string();

            unit.defs.push(RawDef {
                kind,
                name: name.clone(),
                parent_scope: Some(0),
                signature_hash,
                display_name: name,
                span: Span {
                    start_line,
                    start_col,
                    end_line: start_line,
                    end_col: start_col,
                },
                docstring: None,
                is_exported,
            });
        }
    }
    unit.defs.sort_by(|a, b| a.name.cmp(&b.name).then(a.span.start_line.cmp(&b.span.start_line)));
    unit.defs.dedup_by(|a, b| a.name == b.name && a.span.start_line == b.span.start_line);
}

fn extract_calls(content: &str, unit: &mut ExtractedUnit) {
    for caps in CALL_PATTERN.captures_iter(content) {
        let Some(name_match) = caps.get(1) else { continue };
        let callee = name_match.as_str().to_string();
        if is_keyword(&callee) {
            continue;
        }
        let (line, col) = line_col_of(content, name_match.start());
        unit.refs.push(RawRef {
            token_text: callee,
            role: RefRole::Call,
            ref_tier: RefTier::Unknown,
            span: Span {
                start_line: line,
                start_col: col,
                end_line: line,
                end_col: col,
            },
            containing_scope: Some(0),
        });
    }
}

fn extract_imports(content: &str, unit: &mut ExtractedUnit) {
    for pattern in IMPORT_PATTERNS.iter() {
        for caps in pattern.captures_iter(content) {
            let Some(module_match) = caps.get(1) else { continue };
            let whole = caps.get(0).unwrap();
            let (start_line, start_col) = line_col_of(content, whole.start());
            let (end_line, end_col) = line_col_of(content, whole.end());
            unit.imports.push(RawImport {
                imported_name: module_match.as_str().to_string(),
                source_literal: Some(module_match.as_str().to_string()),
                import_kind: "import".to_string(),
                alias: None,
                span: Span {
                    start_line,
                    start_col,
                    end_line,
                    end_col,
                },
            });
        }
    }
}

/// Language-agnostic keyword filter, trimmed from the teacher's broader
/// `is_keyword` table to the subset relevant once tree-sitter already
/// covers the languages with their own keyword grammar nodes.
fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "else" | "for" | "while" | "do" | "switch" | "case" | "default"
            | "break" | "continue" | "return" | "throw" | "try" | "catch" | "finally"
            | "var" | "let" | "const" | "function" | "class" | "extends" | "implements"
            | "import" | "export" | "from" | "as"
            | "async" | "await" | "yield" | "static" | "get" | "set"
            | "public" | "private" | "protected" | "readonly"
            | "true" | "false" | "null" | "undefined" | "void"
            | "this" | "super" | "constructor"
            | "def" | "lambda" | "with" | "assert" | "pass" | "raise"
            | "global" | "nonlocal" | "and" | "or" | "not" | "is"
            | "None" | "True" | "False" | "self" | "cls"
            | "fn" | "pub" | "mod" | "use" | "crate" | "Self"
            | "struct" | "enum" | "trait" | "impl" | "type" | "where"
            | "mut" | "ref" | "move" | "dyn" | "unsafe"
            | "loop" | "match" | "Some" | "Ok" | "Err"
            | "func" | "package" | "go" | "defer" | "chan" | "select"
            | "map" | "range" | "interface" | "nil"
            | "int" | "float" | "double" | "char" | "string" | "bool" | "boolean"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_javascript_functions() {
        let code = "function greet(name) {\n    return name;\n}\n\nexport function farewell(name) {\n    return name;\n}\n";
        let unit = extract(code, Language::JavaScript);
        let names: Vec<_> = unit.defs.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"greet"));
        assert!(names.contains(&"farewell"));
    }

    #[test]
    fn test_extract_ruby_def_no_grammar() {
        let code = "def greet(name)\n  puts name\nend\n";
        let unit = extract(code, Language::Ruby);
        assert!(unit.defs.iter().any(|d| d.name == "greet"));
        // the fallback flag is set by the caller (`parse::extract`), not here
        assert!(!unit.used_fallback);
    }

    #[test]
    fn test_file_scope_always_present() {
        let unit = extract("x = 1\n", Language::Ruby);
        assert_eq!(unit.scopes.len(), 1);
        assert_eq!(unit.scopes[0].kind, ScopeKind::File);
    }
}
