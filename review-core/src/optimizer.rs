//! Large-PR optimizer: priority scoring, budgeted file selection, chunking.
//!
//! Grounded on `original_source/src/cost/optimizer.py`'s `LargePROptimizer`.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{ChangeType, FileInfo, FilePriority};

struct PriorityRule {
    pattern: Regex,
    priority: FilePriority,
}

fn rules(patterns: &[(&str, FilePriority)]) -> Vec<PriorityRule> {
    patterns
        .iter()
        .map(|(p, prio)| PriorityRule {
            pattern: Regex::new(p).unwrap(),
            priority: *prio,
        })
        .collect()
}

static SKIP_RULES: LazyLock<Vec<PriorityRule>> = LazyLock::new(|| {
    rules(&[
        (r"\.min\.(js|css)$", FilePriority::Skip),
        (r"package-lock\.json$", FilePriority::Skip),
        (r"yarn\.lock$", FilePriority::Skip),
        (r"Cargo\.lock$", FilePriority::Skip),
        (r"\.map$", FilePriority::Skip),
        (r"(^|/)dist/", FilePriority::Skip),
        (r"(^|/)build/", FilePriority::Skip),
        (r"(^|/)node_modules/", FilePriority::Skip),
        (r"(^|/)__pycache__/", FilePriority::Skip),
        (r"(^|/)\.venv/", FilePriority::Skip),
        (r"\.pyc$", FilePriority::Skip),
    ])
});

static LOW_RULES: LazyLock<Vec<PriorityRule>> = LazyLock::new(|| {
    rules(&[
        (r"\.test\.", FilePriority::Low),
        (r"\.spec\.", FilePriority::Low),
        (r"(^|/)test_", FilePriority::Low),
        (r"(^|/)tests/", FilePriority::Low),
        (r"(^|/)__tests__/", FilePriority::Low),
        (r"\.md$", FilePriority::Low),
        (r"(^|/)README", FilePriority::Low),
        (r"(^|/)CHANGELOG", FilePriority::Low),
        (r"\.rst$", FilePriority::Low),
    ])
});

static HIGH_RULES: LazyLock<Vec<PriorityRule>> = LazyLock::new(|| {
    rules(&[
        (r"(^|/)models/", FilePriority::High),
        (r"(^|/)services/", FilePriority::High),
        (r"(^|/)controllers/", FilePriority::High),
        (r"(^|/)handlers/", FilePriority::High),
        (r"(^|/)core/", FilePriority::High),
        (r"(^|/)main\.py$", FilePriority::High),
        (r"(^|/)app\.py$", FilePriority::High),
        (r"(^|/)api/", FilePriority::High),
        (r"(^|/)routes/", FilePriority::High),
    ])
});

static CRITICAL_RULES: LazyLock<Vec<PriorityRule>> = LazyLock::new(|| {
    rules(&[
        (r"\.config\.(js|ts|json|ya?ml)$", FilePriority::Critical),
        (r"(^|/)Dockerfile$", FilePriority::Critical),
        (r"docker-compose.*\.ya?ml$", FilePriority::Critical),
        (r"^\.env", FilePriority::Critical),
        (r"(^|/)\.env", FilePriority::Critical),
        (r"(^|/)secrets?/", FilePriority::Critical),
        (r"(^|/)auth/", FilePriority::Critical),
        (r"(^|/)security/", FilePriority::Critical),
        (r"password", FilePriority::Critical),
        (r"encrypt", FilePriority::Critical),
    ])
});

/// Token-per-language multiplier table, fixed per the specification.
fn language_multiplier(language: &str) -> f64 {
    match language {
        "python" => 1.0,
        "javascript" | "typescript" => 0.8,
        "java" => 1.2,
        "go" => 0.9,
        "rust" => 1.0,
        "c" => 1.0,
        "cpp" => 1.1,
        "csharp" => 1.1,
        "ruby" => 0.9,
        "php" => 1.0,
        "swift" => 1.0,
        "kotlin" => 1.0,
        "scala" => 1.2,
        _ => 1.0,
    }
}

/// `tokens = floor((additions+deletions) * 20 * multiplier(lang)) + 500`.
pub fn estimate_tokens(additions: u32, deletions: u32, language: &str) -> u64 {
    let base = (additions + deletions) as f64 * 20.0 * language_multiplier(language);
    base.floor() as u64 + 500
}

/// Scores a file's priority: regex tables matched in order
/// `SKIP -> LOW -> HIGH -> CRITICAL` so CRITICAL wins ties, then falls back
/// to the deletions/added heuristic.
fn score_priority(path: &str, additions: u32, deletions: u32, change_type: ChangeType) -> (FilePriority, String) {
    for rule in CRITICAL_RULES.iter() {
        if rule.pattern.is_match(path) {
            return (rule.priority, format!("matches critical pattern"));
        }
    }
    for rule in HIGH_RULES.iter() {
        if rule.pattern.is_match(path) {
            return (rule.priority, format!("matches high-priority pattern"));
        }
    }
    for rule in LOW_RULES.iter() {
        if rule.pattern.is_match(path) {
            return (rule.priority, format!("matches low-priority pattern"));
        }
    }
    for rule in SKIP_RULES.iter() {
        if rule.pattern.is_match(path) {
            return (rule.priority, format!("matches skip pattern"));
        }
    }

    if deletions > 100 {
        (FilePriority::High, "large deletion count".to_string())
    } else if change_type == ChangeType::Added {
        (FilePriority::High, "newly added file".to_string())
    } else {
        (FilePriority::Medium, "default priority".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct FileChangeInput {
    pub path: String,
    pub language: String,
    pub additions: u32,
    pub deletions: u32,
    pub change_type: ChangeType,
}

/// Scores and token-estimates every file in a diff.
pub fn prioritize_files(files: &[FileChangeInput]) -> Vec<FileInfo> {
    files
        .iter()
        .map(|f| {
            let (priority, reason) =
                score_priority(&f.path, f.additions, f.deletions, f.change_type);
            let estimated_tokens = estimate_tokens(f.additions, f.deletions, &f.language);
            FileInfo {
                path: f.path.clone(),
                language: f.language.clone(),
                additions: f.additions,
                deletions: f.deletions,
                change_type: f.change_type,
                priority,
                reason,
                estimated_tokens,
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SelectionConfig {
    pub min_priority_for_inclusion: FilePriority,
    pub max_files: usize,
    pub max_tokens_per_review: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_priority_for_inclusion: FilePriority::Medium,
            max_files: 20,
            max_tokens_per_review: 50_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectionSummary {
    pub selected_count: usize,
    pub skipped_count: usize,
    pub total_tokens: u64,
    pub by_priority: std::collections::HashMap<String, usize>,
    pub by_language: std::collections::HashMap<String, usize>,
}

/// Selects a prefix of the prioritized list under the token and file-count
/// budgets. Input files are sorted `(-priority, +tokens)` before selection.
pub fn select_files_for_review(
    mut files: Vec<FileInfo>,
    cfg: &SelectionConfig,
) -> (Vec<FileInfo>, Vec<FileInfo>, SelectionSummary) {
    files.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.estimated_tokens.cmp(&b.estimated_tokens))
    });

    let mut selected = Vec::new();
    let mut skipped = Vec::new();
    let mut running_tokens: u64 = 0;
    let mut summary = SelectionSummary::default();

    for mut f in files {
        if f.priority < cfg.min_priority_for_inclusion {
            f.reason = format!("below minimum priority ({})", f.reason);
            skipped.push(f);
            continue;
        }
        if selected.len() >= cfg.max_files {
            f.reason = "max_files reached".to_string();
            skipped.push(f);
            continue;
        }
        if running_tokens + f.estimated_tokens > cfg.max_tokens_per_review {
            f.reason = "token budget exhausted".to_string();
            skipped.push(f);
            continue;
        }

        running_tokens += f.estimated_tokens;
        *summary
            .by_priority
            .entry(format!("{:?}", f.priority))
            .or_insert(0) += 1;
        *summary.by_language.entry(f.language.clone()).or_insert(0) += 1;
        selected.push(f);
    }

    summary.selected_count = selected.len();
    summary.skipped_count = skipped.len();
    summary.total_tokens = running_tokens;

    (selected, skipped, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, additions: u32, deletions: u32, change_type: ChangeType) -> FileChangeInput {
        FileChangeInput {
            path: path.to_string(),
            language: crate::diff::detect_language(path),
            additions,
            deletions,
            change_type,
        }
    }

    #[test]
    fn estimated_tokens_has_a_floor_of_500() {
        assert_eq!(estimate_tokens(0, 0, "python"), 500);
    }

    #[test]
    fn critical_wins_over_high_for_config_files() {
        let files = vec![file("src/config/security.config.json", 5, 2, ChangeType::Modified)];
        let scored = prioritize_files(&files);
        assert_eq!(scored[0].priority, FilePriority::Critical);
    }

    #[test]
    fn large_pr_optimizer_selects_expected_files() {
        let files = vec![
            file("Dockerfile", 5, 2, ChangeType::Modified),
            file("src/core/engine.py", 50, 20, ChangeType::Modified),
            file("src/utils.py", 10, 5, ChangeType::Modified),
            file("README.md", 3, 1, ChangeType::Modified),
            file("package-lock.json", 500, 200, ChangeType::Modified),
            file("src/new_module.py", 80, 0, ChangeType::Added),
        ];
        let scored = prioritize_files(&files);
        let (selected, skipped, summary) =
            select_files_for_review(scored, &SelectionConfig::default());

        let selected_paths: Vec<&str> = selected.iter().map(|f| f.path.as_str()).collect();
        assert!(selected_paths.contains(&"Dockerfile"));
        assert!(selected_paths.contains(&"src/core/engine.py"));

        let skipped_paths: Vec<&str> = skipped.iter().map(|f| f.path.as_str()).collect();
        assert!(skipped_paths.contains(&"package-lock.json"));
        assert!(skipped_paths.contains(&"README.md"));

        let total: u64 = selected.iter().map(|f| f.estimated_tokens).sum();
        assert_eq!(summary.total_tokens, total);
    }

    #[test]
    fn selection_respects_max_files_and_token_budget() {
        let cfg = SelectionConfig {
            min_priority_for_inclusion: FilePriority::Skip,
            max_files: 2,
            max_tokens_per_review: u64::MAX,
        };
        let files = vec![
            FileInfo {
                path: "a".into(),
                language: "python".into(),
                additions: 1,
                deletions: 0,
                change_type: ChangeType::Modified,
                priority: FilePriority::High,
                reason: String::new(),
                estimated_tokens: 500,
            },
            FileInfo {
                path: "b".into(),
                language: "python".into(),
                additions: 1,
                deletions: 0,
                change_type: ChangeType::Modified,
                priority: FilePriority::High,
                reason: String::new(),
                estimated_tokens: 500,
            },
            FileInfo {
                path: "c".into(),
                language: "python".into(),
                additions: 1,
                deletions: 0,
                change_type: ChangeType::Modified,
                priority: FilePriority::High,
                reason: String::new(),
                estimated_tokens: 500,
            },
        ];
        let (selected, _skipped, _summary) = select_files_for_review(files, &cfg);
        assert_eq!(selected.len(), 2);
        assert!(selected.len() <= cfg.max_files);
    }
}
