//! Content type detection for clipboard text
//!
//! Classifies a raw string payload as a URL, a code snippet or plain text.
//! Everything here is pure: no I/O, no global state.

use crate::interface::{ItemContent, ItemKind};
use once_cell::sync::Lazy;
use regex::Regex;

/// Substrings that mark a line as code-like
const CODE_TOKENS: &[&str] = &[
    "function", "class ", "def ", "import ", "return ", "if (", "else", "for (", "while (",
    "switch", "const ", "let ", "var ", "fn ", "#include", "{", "}", "(", ")", ";", "=>", "->",
    "::", "//", "/*", "*/",
];

/// Schemes accepted as links. Everything else (mailto:, file:, javascript:)
/// stays text.
const LINK_SCHEMES: &[&str] = &["http", "https"];

/// Check if a string is a single well-formed http(s) URL
pub fn is_url(text: &str) -> bool {
    let trimmed = text.trim();

    if trimmed.is_empty() || trimmed.len() > 2000 || trimmed.contains(char::is_whitespace) {
        return false;
    }

    match url::Url::parse(trimmed) {
        Ok(parsed) => LINK_SCHEMES.contains(&parsed.scheme()) && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

fn is_code_like_line(line: &str) -> bool {
    CODE_TOKENS.iter().any(|token| line.contains(token))
}

/// Check if more than half of the payload's lines are code-like
pub fn is_code(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return false;
    }

    // A lone line of punctuation (";", "()", "{}") is not a snippet
    if lines.len() == 1 && !lines[0].chars().any(char::is_alphanumeric) {
        return false;
    }

    let code_like = lines.iter().filter(|line| is_code_like_line(line)).count();
    code_like * 2 > lines.len()
}

/// Classify a non-empty payload. URL is checked first, then code.
pub fn detect_kind(text: &str) -> ItemKind {
    if is_url(text) {
        ItemKind::Url
    } else if is_code(text) {
        ItemKind::Code
    } else {
        ItemKind::Text
    }
}

/// Build the candidate payload for a clipboard string
pub fn detect_content(text: &str) -> ItemContent {
    match detect_kind(text) {
        ItemKind::Url => ItemContent::Url {
            url: text.trim().to_string(),
            title: None,
            favicon_url: None,
        },
        ItemKind::Code => ItemContent::Code {
            code: text.to_string(),
            language: detect_language(text).map(str::to_string),
        },
        _ => ItemContent::Text {
            content: text.to_string(),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LANGUAGE GUESSING
// ─────────────────────────────────────────────────────────────────────────────

static SHEBANG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#!\s*(?:\S*/)?(?:env\s+)?(\w+)").unwrap());

static SQL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(select\s.+\sfrom\s|insert\s+into\s|update\s+\w+\s+set\s|create\s+table\s|delete\s+from\s)").unwrap()
});

static HTML_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<(!doctype|html|div|span|body|head|p|a|ul|table)[\s>]").unwrap());

static CSS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[.#]?[\w-]+(\s*[,>]\s*[.#]?[\w-]+)*\s*\{\s*$|^\s*[\w-]+\s*:\s*[^;]+;\s*$").unwrap());

/// Best-effort language guess for a code snippet. `None` when nothing is
/// distinctive enough.
pub fn detect_language(code: &str) -> Option<&'static str> {
    if let Some(caps) = SHEBANG_REGEX.captures(code) {
        return match &caps[1] {
            "python" | "python3" => Some("python"),
            "node" => Some("javascript"),
            "bash" | "sh" | "zsh" => Some("shell"),
            _ => None,
        };
    }

    if HTML_REGEX.is_match(code) {
        return Some("html");
    }
    if SQL_REGEX.is_match(code) {
        return Some("sql");
    }

    let has = |needle: &str| code.contains(needle);

    if has("fn ") && (has("let ") || has("->") || has("::") || has("pub ")) {
        return Some("rust");
    }
    if has("#include") {
        return Some("c");
    }
    if has("package main") || (has("func ") && has(":=")) {
        return Some("go");
    }
    if has("public class ") || has("public static void ") {
        return Some("java");
    }
    if has("def ") && code.lines().any(|l| l.trim_end().ends_with(':')) {
        return Some("python");
    }
    if has("interface ") && has(": ") && (has("const ") || has("export ")) {
        return Some("typescript");
    }
    if has("function") || has("=>") || has("const ") || has("console.") {
        return Some("javascript");
    }
    if has("import ") && !has(";") && !has("{") {
        return Some("python");
    }
    if CSS_REGEX.is_match(code) && has("{") {
        return Some("css");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_detection() {
        assert!(is_url("https://example.com"));
        assert!(is_url("http://example.com/path?query=1"));
        assert!(is_url("  https://example.com  "));
        assert!(is_url("HTTPS://EXAMPLE.COM"));
        assert!(!is_url("www.example.com"));
        assert!(!is_url("example.com"));
        assert!(!is_url("not a url"));
        assert!(!is_url("https://example.com and more"));
    }

    #[test]
    fn test_url_other_schemes_rejected() {
        assert!(!is_url("ftp://files.example.com/doc.pdf"));
        assert!(!is_url("mailto:user@example.com"));
        assert!(!is_url("javascript:alert(1)"));
        assert!(!is_url("file:///etc/passwd"));
    }

    #[test]
    fn test_url_takes_precedence_over_code_tokens() {
        assert_eq!(detect_kind("https://example.com"), ItemKind::Url);
        assert_eq!(
            detect_kind("https://example.com/search?q=fn(x);{a}=>b"),
            ItemKind::Url
        );
    }

    #[test]
    fn test_code_ratio_majority() {
        let payload = "import foo\nlet x = 1\nplain english sentence";
        assert_eq!(detect_kind(payload), ItemKind::Code);
    }

    #[test]
    fn test_code_ratio_minority() {
        let payload = "plain one\nplain two\nimport foo";
        assert_eq!(detect_kind(payload), ItemKind::Text);
    }

    #[test]
    fn test_code_ratio_exactly_half_is_text() {
        let payload = "let x = 1;\njust words";
        assert_eq!(detect_kind(payload), ItemKind::Text);
    }

    #[test]
    fn test_single_line_snippets() {
        assert_eq!(detect_kind("console.log(x);"), ItemKind::Code);
        assert_eq!(detect_kind("import os"), ItemKind::Code);
        assert_eq!(detect_kind("hello world"), ItemKind::Text);
    }

    #[test]
    fn test_lone_punctuation_is_text() {
        assert_eq!(detect_kind(";"), ItemKind::Text);
        assert_eq!(detect_kind("()"), ItemKind::Text);
        assert_eq!(detect_kind("{}"), ItemKind::Text);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let payloads = [
            "https://example.com",
            "fn main() {\n    println!(\"hi\");\n}",
            "Grocery list: milk, eggs",
            ";",
        ];
        for payload in payloads {
            let first = detect_content(payload);
            for _ in 0..5 {
                assert_eq!(detect_content(payload), first);
            }
        }
    }

    #[test]
    fn test_detect_content_variants() {
        match detect_content("  https://github.com  ") {
            ItemContent::Url { url, title, favicon_url } => {
                assert_eq!(url, "https://github.com");
                assert!(title.is_none());
                assert!(favicon_url.is_none());
            }
            other => panic!("Expected Url content, got {:?}", other),
        }

        match detect_content("fn main() {\n    let x = 1;\n}") {
            ItemContent::Code { code, language } => {
                assert!(code.starts_with("fn main"));
                assert_eq!(language.as_deref(), Some("rust"));
            }
            other => panic!("Expected Code content, got {:?}", other),
        }

        match detect_content("Hello World") {
            ItemContent::Text { content } => assert_eq!(content, "Hello World"),
            other => panic!("Expected Text content, got {:?}", other),
        }
    }

    #[test]
    fn test_language_guesses() {
        assert_eq!(detect_language("#!/usr/bin/env python3\nprint(1)"), Some("python"));
        assert_eq!(detect_language("def add(a, b):\n    return a + b"), Some("python"));
        assert_eq!(detect_language("const add = (a, b) => a + b;"), Some("javascript"));
        assert_eq!(detect_language("#include <stdio.h>\nint main() {}"), Some("c"));
        assert_eq!(detect_language("SELECT id FROM items WHERE x = 1;"), Some("sql"));
        assert_eq!(detect_language("package main\n\nfunc main() {}"), Some("go"));
        assert_eq!(detect_language("x ;"), None);
    }
}
