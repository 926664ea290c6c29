//! Pattern-based security detection.
//!
//! Grounded on `original_source/src/agents/security.py`'s `SecurityAgent`
//! pattern table, ported verbatim (same regexes, severities, language
//! gating, fixed 0.9 confidence for every pattern hit).

use regex::RegexBuilder;
use std::sync::LazyLock;

use crate::types::{Category, ChunkInfo, Severity, Suggestion};

pub const SYSTEM_PROMPT: &str = "You are a security expert analyzing code for vulnerabilities: \
SQL injection, XSS, hardcoded secrets, insecure deserialization, command injection, path \
traversal, insecure cryptography, and authentication/authorization flaws.";

struct SecurityPattern {
    pattern: &'static str,
    message: &'static str,
    severity: Severity,
    languages: &'static [&'static str],
}

static PATTERNS: LazyLock<Vec<SecurityPattern>> = LazyLock::new(|| {
    vec![
        SecurityPattern {
            pattern: r"(execute|cursor\.execute|raw|query)\s*\(\s*[^)]*\+[^)]*\)",
            message: "Potential SQL injection vulnerability detected",
            severity: Severity::Error,
            languages: &["python", "javascript", "typescript", "java", "php"],
        },
        SecurityPattern {
            pattern: r"(password|passwd|pwd|secret|api_key|apikey)\s*=\s*['\"][^'\"]+['\"]",
            message: "Hardcoded credential detected",
            severity: Severity::Error,
            languages: &["python", "javascript", "typescript", "java", "go", "ruby", "php"],
        },
        SecurityPattern {
            pattern: r"\beval\s*\(|\bexec\s*\(",
            message: "Use of eval/exec can lead to code injection",
            severity: Severity::Warning,
            languages: &["python", "javascript"],
        },
        SecurityPattern {
            pattern: r"\bpickle\.loads?\s*\(",
            message: "Pickle deserialization can execute arbitrary code",
            severity: Severity::Warning,
            languages: &["python"],
        },
        SecurityPattern {
            pattern: r"innerHTML|dangerouslySetInnerHTML",
            message: "Potential XSS vulnerability - consider sanitizing input",
            severity: Severity::Warning,
            languages: &["javascript", "typescript"],
        },
        SecurityPattern {
            pattern: r"(os\.system|subprocess\.call|subprocess\.Popen)\s*\(\s*[^)]*\+[^)]*\)",
            message: "Potential shell injection vulnerability",
            severity: Severity::Error,
            languages: &["python"],
        },
        SecurityPattern {
            pattern: r"\bmd5\s*\(|\bsha1\s*\(",
            message: "Insecure hash algorithm - use SHA-256 or higher",
            severity: Severity::Warning,
            languages: &["python", "javascript", "typescript", "java", "go"],
        },
        SecurityPattern {
            pattern: r"verify\s*=\s*False|verify_ssl\s*=\s*False|NODE_TLS_REJECT_UNAUTHORIZED",
            message: "SSL verification disabled - security risk",
            severity: Severity::Error,
            languages: &["python", "javascript", "typescript"],
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
            .case_insensitive(true)
            .build()
            .expect("pattern table regexes are valid");
        for m in re.find_iter(&chunk.content) {
            let line_num = chunk.start_line + chunk.content[..m.start()].matches('\n').count() as u32;
            out.push(Suggestion::new(
                chunk.file_path.clone(),
                line_num,
                def.message,
                def.severity,
                None,
                "security",
                0.9,
                Category::Security,
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(language: &str, content: &str) -> ChunkInfo {
        ChunkInfo {
            file_path: "app.py".into(),
            start_line: 1,
            end_line: content.lines().count() as u32,
            content: content.to_string(),
            language: language.to_string(),
            is_full_file: true,
        }
    }

    #[test]
    fn flags_hardcoded_password() {
        let c = chunk("python", "password = \"hunter2\"");
        let out = pattern_suggestions(&c);
        assert!(out.iter().any(|s| s.message.contains("Hardcoded credential")));
    }

    #[test]
    fn flags_eval_usage() {
        let c = chunk("python", "result = eval(user_input)");
        let out = pattern_suggestions(&c);
        assert!(out.iter().any(|s| s.severity == Severity::Warning));
    }

    #[test]
    fn does_not_flag_pattern_outside_language_scope() {
        let c = chunk("go", "password := \"hunter2\"");
        let out = pattern_suggestions(&c);
        assert!(out.iter().all(|s| !s.message.contains("Hardcoded credential")));
    }

    #[test]
    fn sql_injection_pattern_not_triggered_by_safe_call() {
        let c = chunk("python", "cursor.execute(\"SELECT * FROM users\")");
        let out = pattern_suggestions(&c);
        assert!(out.is_empty());
    }
}
