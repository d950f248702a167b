//! Language-family detection and tree-sitter grammar loading.
//!
//! Extended from `src/parse/languages.rs`'s `Language` enum (Rust/
//! TypeScript/JavaScript/Python/Go/Java/C/Cpp) with the families
//! `examples/original_source/.../db/reconcile.py`'s `_detect_language`
//! extension table names but the teacher has no grammar for — those stay
//! `has_ast_support() == false` and are routed to the regex fallback,
//! matching spec.md §4.C3's "unsupported files are marked
//! `skipped_no_grammar` (not an error)".

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    TypeScript,
    TypeScriptReact,
    JavaScript,
    JavaScriptReact,
    Python,
    Go,
    Java,
    C,
    Cpp,
    // Families tracked by discovery/reconcile but with no tree-sitter
    // grammar in this workspace — parsed via regex heuristics only.
    Ruby,
    Php,
    CSharp,
    Kotlin,
    Scala,
    Swift,
    Elixir,
    Haskell,
    Terraform,
    Sql,
    Unknown,
}

impl Language {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "rs" => Language::Rust,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::TypeScriptReact,
            "js" | "mjs" | "cjs" => Language::JavaScript,
            "jsx" => Language::JavaScriptReact,
            "py" | "pyi" | "pyw" => Language::Python,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "rb" => Language::Ruby,
            "php" => Language::Php,
            "cs" => Language::CSharp,
            "kt" | "kts" => Language::Kotlin,
            "scala" | "sc" => Language::Scala,
            "swift" => Language::Swift,
            "ex" | "exs" => Language::Elixir,
            "hs" | "lhs" => Language::Haskell,
            "tf" | "tfvars" | "hcl" => Language::Terraform,
            "sql" => Language::Sql,
            _ => Language::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::TypeScript => "typescript",
            Language::TypeScriptReact => "typescriptreact",
            Language::JavaScript => "javascript",
            Language::JavaScriptReact => "javascriptreact",
            Language::Python => "python",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::CSharp => "csharp",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
            Language::Swift => "swift",
            Language::Elixir => "elixir",
            Language::Haskell => "haskell",
            Language::Terraform => "terraform",
            Language::Sql => "sql",
            Language::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "rust" => Language::Rust,
            "typescript" => Language::TypeScript,
            "typescriptreact" => Language::TypeScriptReact,
            "javascript" => Language::JavaScript,
            "javascriptreact" => Language::JavaScriptReact,
            "python" => Language::Python,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" => Language::Cpp,
            "ruby" => Language::Ruby,
            "php" => Language::Php,
            "csharp" => Language::CSharp,
            "kotlin" => Language::Kotlin,
            "scala" => Language::Scala,
            "swift" => Language::Swift,
            "elixir" => Language::Elixir,
            "haskell" => Language::Haskell,
            "terraform" => Language::Terraform,
            "sql" => Language::Sql,
            _ => Language::Unknown,
        }
    }

    pub fn has_ast_support(&self) -> bool {
        self.tree_sitter_language().is_some()
    }

    pub fn tree_sitter_language(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::TypeScript | Language::TypeScriptReact => {
                Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            }
            Language::JavaScript | Language::JavaScriptReact => {
                Some(tree_sitter_javascript::LANGUAGE.into())
            }
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::C => Some(tree_sitter_c::LANGUAGE.into()),
            Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            _ => None,
        }
    }

    /// The "family" used for Context/File rows — coarser than the exact
    /// language where several extensions share one toolchain root
    /// (TypeScript/TSX share one `tsconfig.json`-rooted family, etc.)
    pub fn family(&self) -> &'static str {
        match self {
            Language::TypeScript | Language::TypeScriptReact => "typescript",
            Language::JavaScript | Language::JavaScriptReact => "javascript",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_detection() {
        assert_eq!(Language::from_path(Path::new("foo.rs")), Language::Rust);
        assert_eq!(Language::from_path(Path::new("bar.ts")), Language::TypeScript);
        assert_eq!(Language::from_path(Path::new("baz.tsx")), Language::TypeScriptReact);
        assert_eq!(Language::from_path(Path::new("qux.py")), Language::Python);
        assert_eq!(Language::from_path(Path::new("main.go")), Language::Go);
        assert_eq!(Language::from_path(Path::new("App.java")), Language::Java);
        assert_eq!(Language::from_path(Path::new("a.rb")), Language::Ruby);
        assert_eq!(Language::from_path(Path::new("unknown.xyz")), Language::Unknown);
    }

    #[test]
    fn test_ast_support_boundary() {
        assert!(Language::Rust.has_ast_support());
        assert!(Language::Java.has_ast_support());
        assert!(!Language::Ruby.has_ast_support());
        assert!(!Language::Sql.has_ast_support());
    }
}
