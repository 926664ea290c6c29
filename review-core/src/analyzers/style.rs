//! Pattern-based style/formatting checks.
//!
//! Grounded on `original_source/src/agents/style.py`'s `StyleAgent`: a flat
//! set of per-line checks, each with its own fixed confidence, plus two
//! chunk-level checks (Java brace style, missing docstring).

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{Category, ChunkInfo, Severity, Suggestion};

pub const SYSTEM_PROMPT: &str = "You are a code style expert analyzing code for formatting and \
style issues: naming conventions, line length, whitespace, code organization, documentation, and \
language idiom violations.";

const MAX_LINE_LENGTH: usize = 120;

pub fn pattern_suggestions(chunk: &ChunkInfo) -> Vec<Suggestion> {
    let mut out = Vec::new();
    let lines: Vec<&str> = chunk.content.split('\n').collect();

    for (i, line) in lines.iter().enumerate() {
        let line_num = chunk.start_line + i as u32;
        // Diff lines keep their +/-/space prefix; strip it before measuring
        // so an added 120-char line doesn't read as 121.
        let code = strip_diff_prefix(line);

        if code.len() > MAX_LINE_LENGTH {
            out.push(Suggestion::new(
                chunk.file_path.clone(),
                line_num,
                format!("Line exceeds {MAX_LINE_LENGTH} characters ({} chars)", code.len()),
                Severity::Suggestion,
                None,
                "style",
                0.9,
                Category::Style,
            ));
        }

        if code.ends_with(' ') || code.ends_with('\t') {
            out.push(Suggestion::new(
                chunk.file_path.clone(),
                line_num,
                "Trailing whitespace",
                Severity::Note,
                Some(code.trim_end().to_string()),
                "style",
                1.0,
                Category::Style,
            ));
        }

        if has_mixed_tabs_and_spaces(code) {
            out.push(Suggestion::new(
                chunk.file_path.clone(),
                line_num,
                "Mixed tabs and spaces in indentation",
                Severity::Warning,
                None,
                "style",
                1.0,
                Category::Style,
            ));
        }

        if BARE_EXCEPT_RE.is_match(code) {
            out.push(Suggestion::new(
                chunk.file_path.clone(),
                line_num,
                "Bare except clause - catch specific exceptions",
                Severity::Warning,
                None,
                "style",
                0.9,
                Category::Style,
            ));
        }

        if MUTABLE_DEFAULT_RE.is_match(code) {
            out.push(Suggestion::new(
                chunk.file_path.clone(),
                line_num,
                "Mutable default argument",
                Severity::Warning,
                None,
                "style",
                0.85,
                Category::Style,
            ));
        }

        if matches!(chunk.language.as_str(), "javascript" | "typescript") {
            if LOOSE_EQUALITY_RE.is_match(code) {
                out.push(Suggestion::new(
                    chunk.file_path.clone(),
                    line_num,
                    "Use === instead of == for strict equality",
                    Severity::Suggestion,
                    None,
                    "style",
                    0.8,
                    Category::Style,
                ));
            }
            if VAR_USAGE_RE.is_match(code) {
                out.push(Suggestion::new(
                    chunk.file_path.clone(),
                    line_num,
                    "Use let/const instead of var",
                    Severity::Suggestion,
                    None,
                    "style",
                    0.8,
                    Category::Style,
                ));
            }
        }

        if chunk.language == "java" && JAVA_BRACE_RE.is_match(code) {
            out.push(Suggestion::new(
                chunk.file_path.clone(),
                line_num,
                "Opening brace should be on the same line (K&R style)",
                Severity::Note,
                None,
                "style",
                0.6,
                Category::Style,
            ));
        }
    }

    if let Some(s) = check_missing_docstring(chunk) {
        out.push(s);
    }

    out
}

fn strip_diff_prefix(line: &str) -> &str {
    if line.starts_with('+') || line.starts_with('-') || line.starts_with(' ') {
        &line[1..]
    } else {
        line
    }
}

fn has_mixed_tabs_and_spaces(line: &str) -> bool {
    let indent: &str = line
        .char_indices()
        .take_while(|(_, c)| *c == ' ' || *c == '\t')
        .last()
        .map(|(i, _)| &line[..=i])
        .unwrap_or("");
    indent.contains('\t') && indent.contains(' ')
}

static BARE_EXCEPT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*except\s*:\s*$").unwrap());
static MUTABLE_DEFAULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"def\s+\w+\s*\([^)]*=\s*(\[\]|\{\})").unwrap());
static LOOSE_EQUALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^=!]==[^=]|[^=!]!=[^=]").unwrap());
static VAR_USAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*var\s+\w+").unwrap());
static JAVA_BRACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\{\s*$").unwrap());
static FUNC_OR_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(def|class)\s+\w+").unwrap());

/// Checks whether the chunk's first function/class definition is followed
/// by a docstring. Only meaningful for full-file chunks starting at a
/// def/class line; partial hunks are skipped to avoid false positives on
/// diffs that don't include the definition line itself.
fn check_missing_docstring(chunk: &ChunkInfo) -> Option<Suggestion> {
    if chunk.language != "python" {
        return None;
    }
    let lines: Vec<&str> = chunk.content.split('\n').collect();
    for (i, line) in lines.iter().enumerate() {
        let code = strip_diff_prefix(line);
        if FUNC_OR_CLASS_RE.is_match(code) {
            let next = lines.get(i + 1).map(|l| strip_diff_prefix(l).trim());
            let has_docstring = next
                .map(|n| n.starts_with("\"\"\"") || n.starts_with("'''"))
                .unwrap_or(false);
            if !has_docstring {
                return Some(Suggestion::new(
                    chunk.file_path.clone(),
                    chunk.start_line + i as u32,
                    "Missing docstring for function/class",
                    Severity::Suggestion,
                    None,
                    "style",
                    0.7,
                    Category::Style,
                ));
            }
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(language: &str, content: &str) -> ChunkInfo {
        ChunkInfo {
            file_path: "x".into(),
            start_line: 1,
            end_line: content.lines().count() as u32,
            content: content.to_string(),
            language: language.to_string(),
            is_full_file: true,
        }
    }

    #[test]
    fn flags_long_lines() {
        let long_line = "a".repeat(130);
        let c = chunk("python", &format!("+{long_line}"));
        let out = pattern_suggestions(&c);
        assert!(out.iter().any(|s| s.message.contains("exceeds 120")));
    }

    #[test]
    fn flags_trailing_whitespace() {
        let c = chunk("python", "+x = 1   ");
        let out = pattern_suggestions(&c);
        assert!(out.iter().any(|s| s.message.contains("Trailing whitespace")));
    }

    #[test]
    fn flags_var_usage_in_js() {
        let c = chunk("javascript", "+var x = 1;");
        let out = pattern_suggestions(&c);
        assert!(out.iter().any(|s| s.message.contains("let/const")));
    }

    #[test]
    fn does_not_flag_var_in_python() {
        let c = chunk("python", "+var = 1");
        let out = pattern_suggestions(&c);
        assert!(out.iter().all(|s| !s.message.contains("let/const")));
    }

    #[test]
    fn flags_missing_docstring() {
        let c = chunk("python", "+def f():\n+    return 1");
        let out = pattern_suggestions(&c);
        assert!(out.iter().any(|s| s.message.contains("Missing docstring")));
    }

    #[test]
    fn does_not_flag_present_docstring() {
        let c = chunk("python", "+def f():\n+    \"\"\"Does a thing.\"\"\"\n+    return 1");
        let out = pattern_suggestions(&c);
        assert!(out.iter().all(|s| !s.message.contains("Missing docstring")));
    }
}
