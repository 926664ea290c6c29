//! Language-specific anti-pattern detection, plus user-defined rules parsed
//! out of a repository's AGENTS.md.
//!
//! Grounded on `original_source/src/agents/pattern.py`'s `PatternAgent`:
//! `_load_patterns` (the built-in per-language table) and
//! `_check_custom_patterns` (the AGENTS.md rule grammar).

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use crate::types::{Category, ChunkInfo, Severity, Suggestion};

pub const SYSTEM_PROMPT: &str = "You are a software design expert analyzing code for \
anti-patterns: god objects, tight coupling, violation of SOLID principles, inappropriate \
design pattern usage, code smells, and maintainability issues.";

struct AntiPattern {
    pattern: &'static str,
    message: &'static str,
    severity: Severity,
    confidence: f32,
    languages: &'static [&'static str],
}

static PATTERNS: LazyLock<Vec<AntiPattern>> = LazyLock::new(|| {
    vec![
        AntiPattern {
            pattern: r"class\s+\w+.{2000,}",
            message: "Large class detected - consider splitting responsibilities (god object)",
            severity: Severity::Suggestion,
            confidence: 0.6,
            languages: &["python", "java", "javascript", "typescript", "csharp"],
        },
        AntiPattern {
            pattern: r"def\s+\w+\s*\([^)]{200,}\)",
            message: "Function has too many parameters - consider a parameter object",
            severity: Severity::Suggestion,
            confidence: 0.7,
            languages: &["python"],
        },
        AntiPattern {
            pattern: r"global\s+\w+",
            message: "Use of global state - consider dependency injection",
            severity: Severity::Warning,
            confidence: 0.75,
            languages: &["python"],
        },
        AntiPattern {
            pattern: r"except\s+Exception\s*:\s*$|except\s*:\s*$",
            message: "Catching broad exceptions hides real failures",
            severity: Severity::Warning,
            confidence: 0.8,
            languages: &["python"],
        },
        AntiPattern {
            pattern: r"\bnew\s+\w+\([^)]*\)\s*;.*\bnew\s+\w+\([^)]*\)\s*;",
            message: "Multiple direct instantiations - consider a factory",
            severity: Severity::Suggestion,
            confidence: 0.55,
            languages: &["java", "csharp"],
        },
        AntiPattern {
            pattern: r"\bsingleton\b",
            message: "Singleton pattern reference - verify it's actually needed",
            severity: Severity::Note,
            confidence: 0.5,
            languages: &["java", "csharp", "python", "javascript", "typescript"],
        },
    ]
});

pub fn pattern_suggestions(chunk: &ChunkInfo, agents_md: Option<&str>) -> Vec<Suggestion> {
    let mut out = Vec::new();

    for def in PATTERNS.iter() {
        if !def.languages.contains(&chunk.language.as_str()) {
            continue;
        }
        let re = RegexBuilder::new(def.pattern)
            .dot_matches_new_line(true)
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
                "pattern",
                def.confidence,
                Category::Pattern,
            ));
        }
    }

    if let Some(md) = agents_md {
        for rule in parse_custom_rules(md) {
            for m in rule.regex.find_iter(&chunk.content) {
                let line_num =
                    chunk.start_line + chunk.content[..m.start()].matches('\n').count() as u32;
                out.push(Suggestion::new(
                    chunk.file_path.clone(),
                    line_num,
                    rule.message.clone(),
                    rule.severity,
                    None,
                    "pattern",
                    0.8,
                    Category::Pattern,
                ));
            }
        }
    }

    out
}

struct CustomRule {
    #[allow(dead_code)]
    name: String,
    regex: Regex,
    message: String,
    severity: Severity,
}

/// Parses the simple structured grammar:
/// ```text
/// ## Rule: <name>
/// Pattern: `<regex>`
/// Message: <m>
/// Severity: <s>
/// ```
/// A rule block with an invalid regex is skipped silently rather than
/// failing the whole parse; a missing field falls back to a documented
/// default (message: "custom rule violation", severity: suggestion).
fn parse_custom_rules(agents_md: &str) -> Vec<CustomRule> {
    static RULE_HEADER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^##\s*Rule:\s*(.+)$").unwrap());
    static FIELD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^(Pattern|Message|Severity):\s*(.+)$").unwrap());

    let mut rules = Vec::new();
    let headers: Vec<(usize, &str)> = RULE_HEADER_RE
        .captures_iter(agents_md)
        .map(|c| {
            let m = c.get(0).unwrap();
            (m.start(), c.get(1).unwrap().as_str().trim())
        })
        .collect();

    for (i, (start, name)) in headers.iter().enumerate() {
        let end = headers.get(i + 1).map(|(s, _)| *s).unwrap_or(agents_md.len());
        let block = &agents_md[*start..end];

        let mut pattern: Option<String> = None;
        let mut message: Option<String> = None;
        let mut severity = Severity::Suggestion;

        for cap in FIELD_RE.captures_iter(block) {
            let field = &cap[1];
            let value = cap[2].trim();
            match field {
                "Pattern" => pattern = Some(value.trim_matches('`').to_string()),
                "Message" => message = Some(value.to_string()),
                "Severity" => severity = Severity::parse_or_default(value),
                _ => {}
            }
        }

        let Some(pattern_src) = pattern else { continue };
        let Ok(regex) = Regex::new(&pattern_src) else {
            continue;
        };

        rules.push(CustomRule {
            name: name.to_string(),
            regex,
            message: message.unwrap_or_else(|| "custom rule violation".to_string()),
            severity,
        });
    }

    rules
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
    fn flags_global_state_usage() {
        let c = chunk("python", "def f():\n    global counter\n    counter += 1");
        let out = pattern_suggestions(&c, None);
        assert!(out.iter().any(|s| s.message.contains("global state")));
    }

    #[test]
    fn custom_rule_from_agents_md_matches() {
        let agents_md = "## Rule: no-print\n\
                          Pattern: `print\\(`\n\
                          Message: Avoid print statements in production code\n\
                          Severity: warning\n";
        let c = chunk("python", "print('debug')");
        let out = pattern_suggestions(&c, Some(agents_md));
        assert!(out
            .iter()
            .any(|s| s.message.contains("Avoid print statements") && s.severity == Severity::Warning));
    }

    #[test]
    fn invalid_custom_regex_is_skipped_silently() {
        let agents_md = "## Rule: broken\n\
                          Pattern: `(unterminated`\n\
                          Message: should never fire\n";
        let c = chunk("python", "(unterminated group content");
        let out = pattern_suggestions(&c, Some(agents_md));
        assert!(out.iter().all(|s| s.message != "should never fire"));
    }

    #[test]
    fn no_agents_md_runs_built_in_patterns_only() {
        let c = chunk("python", "global counter");
        let with_none = pattern_suggestions(&c, None);
        assert!(!with_none.is_empty());
    }
}
