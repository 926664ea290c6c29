//! Pattern-based bug/logic-error detection.
//!
//! Grounded on `original_source/src/agents/logic.py`'s `LogicAgent`: the
//! general bug-pattern table (capped at 3 matches per pattern, 0.75
//! confidence), plus Python- and JS/TS-specific checks.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use crate::types::{Category, ChunkInfo, Severity, Suggestion};

pub const SYSTEM_PROMPT: &str = "You are a code quality expert analyzing code for logic errors: \
off-by-one errors, null dereferences, resource leaks, infinite loops, unreachable code, race \
conditions, conditional logic errors, type mismatches, unhandled edge cases, and incorrect error \
handling.";

struct BugPattern {
    pattern: &'static str,
    message: &'static str,
    severity: Severity,
    languages: &'static [&'static str],
}

static PATTERNS: LazyLock<Vec<BugPattern>> = LazyLock::new(|| {
    vec![
        BugPattern {
            pattern: r"(if|while)\s*\(\s*\w+\s*==\s*(None|null|NULL)\s*\)\s*&&",
            message: "Potential null pointer - check null first before accessing",
            severity: Severity::Warning,
            languages: &["python", "javascript", "typescript", "java", "c", "cpp"],
        },
        BugPattern {
            pattern: r"while\s*\(\s*true\s*\)|while\s+True:",
            message: "Potential infinite loop - ensure proper exit condition",
            severity: Severity::Warning,
            languages: &["python", "javascript", "typescript", "java", "c", "cpp"],
        },
        BugPattern {
            pattern: r"range\s*\(\s*len\s*\(|for\s*\(\s*int\s+\w+\s*=\s*0;\s*\w+\s*<\s*.+\.(length|size)",
            message: "Potential off-by-one error - verify loop bounds",
            severity: Severity::Warning,
            languages: &["python", "javascript", "typescript", "java", "c", "cpp"],
        },
        BugPattern {
            pattern: r"open\s*\(|fopen\s*\(|File\s*\(",
            message: "File/resource opened - ensure it's properly closed",
            severity: Severity::Warning,
            languages: &["python", "c", "cpp", "java"],
        },
    ]
});

pub fn pattern_suggestions(chunk: &ChunkInfo) -> Vec<Suggestion> {
    let mut out = Vec::new();
    for def in PATTERNS.iter() {
        if !def.languages.contains(&chunk.language.as_str()) {
            continue;
        }
        let re = RegexBuilder::new(def.pattern)
            .multi_line(true)
            .build()
            .expect("pattern table regexes are valid");
        for m in re.find_iter(&chunk.content).take(3) {
            let line_num = chunk.start_line + chunk.content[..m.start()].matches('\n').count() as u32;
            out.push(Suggestion::new(
                chunk.file_path.clone(),
                line_num,
                def.message,
                def.severity,
                None,
                "logic",
                0.75,
                Category::Logic,
            ));
        }
    }

    match chunk.language.as_str() {
        "python" => out.extend(check_python_logic(chunk)),
        "javascript" | "typescript" => out.extend(check_js_logic(chunk)),
        _ => {}
    }

    out
}

fn check_python_logic(chunk: &ChunkInfo) -> Vec<Suggestion> {
    static ITER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"for\s+\w+\s+in\s+\w+").unwrap());
    static MUTATE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\w+\.(append|extend|remove|pop|del)").unwrap());
    static EXCEPT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"except.*:\s*$").unwrap());
    static PASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*pass\s*$").unwrap());
    static MUTABLE_DEFAULT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"def\s+\w+\s*\([^)]*=\s*\[|def\s+\w+\s*\([^)]*=\s*\{").unwrap());

    let mut out = Vec::new();
    let lines: Vec<&str> = chunk.content.split('\n').collect();

    for (i, line) in lines.iter().enumerate() {
        let line_num = chunk.start_line + i as u32;

        if ITER_RE.is_match(line) {
            let window = lines[i..(i + 10).min(lines.len())].join("\n");
            if MUTATE_RE.is_match(&window) {
                out.push(Suggestion::new(
                    chunk.file_path.clone(),
                    line_num,
                    "Potential modification of list during iteration",
                    Severity::Warning,
                    None,
                    "logic",
                    0.7,
                    Category::Logic,
                ));
            }
        }

        if EXCEPT_RE.is_match(line) {
            if let Some(next) = lines.get(i + 1) {
                if PASS_RE.is_match(next) {
                    out.push(Suggestion::new(
                        chunk.file_path.clone(),
                        line_num,
                        "Bare except/pass - consider logging or handling the exception",
                        Severity::Warning,
                        None,
                        "logic",
                        0.85,
                        Category::Logic,
                    ));
                }
            }
        }

        if MUTABLE_DEFAULT_RE.is_match(line) {
            out.push(Suggestion::new(
                chunk.file_path.clone(),
                line_num,
                "Mutable default argument - use None and initialize inside function",
                Severity::Error,
                Some("def func(arg=None):\n    if arg is None:\n        arg = []".to_string()),
                "logic",
                0.9,
                Category::Logic,
            ));
        }
    }

    out
}

fn check_js_logic(chunk: &ChunkInfo) -> Vec<Suggestion> {
    static THEN_CATCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.(then|catch)\s*\(").unwrap());
    static ERROR_HANDLING_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"catch|reject|error").unwrap());
    static ASYNC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"async\s+function|async\s*\(").unwrap());
    static AWAIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bawait\b").unwrap());

    let mut out = Vec::new();
    let lines: Vec<&str> = chunk.content.split('\n').collect();

    for (i, line) in lines.iter().enumerate() {
        let line_num = chunk.start_line + i as u32;

        if THEN_CATCH_RE.is_match(line) && !ERROR_HANDLING_RE.is_match(&chunk.content) {
            out.push(Suggestion::new(
                chunk.file_path.clone(),
                line_num,
                "Promise chain without error handling - add .catch()",
                Severity::Warning,
                None,
                "logic",
                0.75,
                Category::Logic,
            ));
        }

        if ASYNC_RE.is_match(line) {
            let window = lines[i..(i + 20).min(lines.len())].join("\n");
            if !AWAIT_RE.is_match(&window) {
                out.push(Suggestion::new(
                    chunk.file_path.clone(),
                    line_num,
                    "Async function without await - may not need async",
                    Severity::Suggestion,
                    None,
                    "logic",
                    0.7,
                    Category::Logic,
                ));
            }
        }
    }

    out
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
    fn flags_infinite_loop() {
        let c = chunk("python", "while True:\n    do_work()");
        let out = pattern_suggestions(&c);
        assert!(out.iter().any(|s| s.message.contains("infinite loop")));
    }

    #[test]
    fn flags_bare_except_pass() {
        let c = chunk("python", "try:\n    risky()\nexcept Exception:\n    pass");
        let out = check_python_logic(&chunk("python", "try:\n    risky()\nexcept Exception:\n    pass"));
        assert!(out.iter().any(|s| s.message.contains("Bare except")));
        let _ = c;
    }

    #[test]
    fn flags_promise_chain_without_catch() {
        let c = chunk("javascript", "fetchData().then(x => use(x));");
        let out = check_js_logic(&c);
        assert!(out.iter().any(|s| s.message.contains("error handling")));
    }

    #[test]
    fn resource_leak_capped_at_three_matches() {
        let content = (0..10).map(|_| "open('f')").collect::<Vec<_>>().join("\n");
        let c = chunk("python", &content);
        let out = pattern_suggestions(&c);
        let leak_count = out.iter().filter(|s| s.message.contains("properly closed")).count();
        assert!(leak_count <= 3);
    }
}
