//! Service-level configuration loaded from environment variables.
//!
//! Grounded on `contextor::cfg::ContextorConfig::from_env`'s `env`/`parse`
//! helper style. The effective per-review `ReviewConfig` (§3) is a separate,
//! smaller type in `types.rs` — this is the process-wide config the service
//! builds once at startup.

use std::collections::HashMap;

use crate::budget::BudgetConfig;
use crate::dedup::DedupConfig;
use crate::optimizer::SelectionConfig;
use crate::types::{FilePriority, ReviewConfig, Severity};

/// Process-wide configuration assembled once at startup and threaded into
/// every review.
#[derive(Debug, Clone)]
pub struct ReviewServiceConfig {
    pub default_review: ReviewConfig,
    pub dedup: DedupConfig,
    pub selection: SelectionConfig,
    pub budget: BudgetConfig,
    pub worker_count: usize,
    pub max_retries: u32,
    pub chunk_size: usize,
}

impl ReviewServiceConfig {
    /// Builds the config from environment variables, falling back to the
    /// documented defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut enable_agents = HashMap::new();
        for name in ["security", "style", "logic", "pattern"] {
            let key = format!("ENABLE_AGENT_{}", name.to_ascii_uppercase());
            enable_agents.insert(name.to_string(), env_flag(&key, true));
        }

        let default_review = ReviewConfig {
            max_suggestions: parse("MAX_SUGGESTIONS", 50u32),
            severity_threshold: Severity::parse_or_default(&env("SEVERITY_THRESHOLD", "suggestion")),
            enable_agents,
            custom_rules: serde_json::Value::Null,
        };

        let dedup = DedupConfig {
            line_tolerance: parse("DEDUP_LINE_TOLERANCE", 3u32),
            message_similarity_threshold: parse("DEDUP_SIMILARITY_THRESHOLD", 0.8f64),
        };

        let selection = SelectionConfig {
            min_priority_for_inclusion: parse_priority("MIN_PRIORITY_FOR_INCLUSION", FilePriority::Medium),
            max_files: parse("MAX_FILES_TO_REVIEW", 20usize),
            max_tokens_per_review: parse("MAX_TOKENS_PER_REVIEW", 50_000u64),
        };

        let budget = BudgetConfig {
            daily_budget_usd: parse("DAILY_BUDGET_USD", 50.0),
            per_pr_budget_usd: parse("PER_PR_BUDGET_USD", 5.0),
            monthly_budget_usd: parse("MONTHLY_BUDGET_USD", 1000.0),
            warning_threshold: parse("BUDGET_WARNING_THRESHOLD", 0.8),
            repo_daily_budgets: HashMap::new(),
        };

        Self {
            default_review,
            dedup,
            selection,
            budget,
            worker_count: parse("WORKER_COUNT", 10usize),
            max_retries: parse("MAX_RETRIES", 3u32),
            chunk_size: parse("CHUNK_SIZE", 5000usize),
        }
    }
}

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_priority(key: &str, default: FilePriority) -> FilePriority {
    match std::env::var(key).ok().as_deref() {
        Some("skip") => FilePriority::Skip,
        Some("low") => FilePriority::Low,
        Some("medium") => FilePriority::Medium,
        Some("high") => FilePriority::High,
        Some("critical") => FilePriority::Critical,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_when_env_unset() {
        let cfg = ReviewServiceConfig::from_env();
        assert!(cfg.worker_count >= 1);
        assert_eq!(cfg.default_review.max_suggestions, 50);
        assert_eq!(cfg.budget.warning_threshold, 0.8);
    }
}
