//! Language detection (spec.md §4.I) — extension first, content heuristics
//! as fallback.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Rust,
    TypeScript,
    JavaScript,
    Python,
    Markdown,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Markdown => "markdown",
            Language::Unknown => "unknown",
        }
    }
}

/// Detect language for `path`/`content`: extension first, then content
/// heuristics (`fn `/`impl `/`pub fn` → rust; `import … from` →
/// typescript; `def `/`import ` → python).
pub fn detect(path: &str, content: &str) -> Language {
    let ext = Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "rs" => return Language::Rust,
        "ts" | "tsx" => return Language::TypeScript,
        "js" | "jsx" | "mjs" | "cjs" => return Language::JavaScript,
        "py" => return Language::Python,
        "md" | "markdown" => return Language::Markdown,
        _ => {}
    }

    if content.contains("fn ") || content.contains("impl ") || content.contains("pub fn") {
        return Language::Rust;
    }
    if content.contains("import ") && content.contains(" from ") {
        return Language::TypeScript;
    }
    if content.contains("def ") || content.contains("import ") {
        return Language::Python;
    }
    Language::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_takes_priority() {
        assert_eq!(detect("src/a.rs", ""), Language::Rust);
        assert_eq!(detect("src/a.ts", ""), Language::TypeScript);
        assert_eq!(detect("src/a.py", ""), Language::Python);
        assert_eq!(detect("README.md", ""), Language::Markdown);
    }

    #[test]
    fn content_heuristic_detects_rust() {
        assert_eq!(detect("noext", "pub fn main() {}"), Language::Rust);
    }

    #[test]
    fn content_heuristic_detects_typescript() {
        assert_eq!(detect("noext", "import x from 'y'"), Language::TypeScript);
    }

    #[test]
    fn content_heuristic_detects_python() {
        assert_eq!(detect("noext", "def main():\n    pass"), Language::Python);
    }

    #[test]
    fn unrecognized_content_is_unknown() {
        assert_eq!(detect("noext", "just some prose"), Language::Unknown);
    }
}
