//! Canonical data model shared by every stage of the review pipeline.
//!
//! These are exhaustive record/sum types, not ad-hoc maps: a `Severity` or
//! `Category` that doesn't parse from provider/model text falls back to a
//! documented default rather than panicking or losing the field.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider a `PrEvent` originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    Github,
    Gitlab,
    Bitbucket,
}

impl std::fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderTag::Github => write!(f, "github"),
            ProviderTag::Gitlab => write!(f, "gitlab"),
            ProviderTag::Bitbucket => write!(f, "bitbucket"),
        }
    }
}

/// Action performed on a pull/merge request, as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrAction {
    Opened,
    Synchronize,
    Reopened,
    Closed,
    Merged,
    Edited,
}

/// Canonical, provider-neutral PR/MR event.
///
/// Created by webhook ingress, immutable thereafter, referenced throughout
/// the workflow. `raw_payload` keeps the original provider body for
/// collaborators that need fields this type doesn't normalize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrEvent {
    pub provider: ProviderTag,
    pub repo_owner: String,
    pub repo_name: String,
    pub pr_number: u64,
    pub action: PrAction,
    pub source_branch: String,
    pub target_branch: String,
    pub commit_sha: String,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub url: Option<String>,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

impl PrEvent {
    /// `"owner/name"`, used for routing, logging, and per-repo budgets.
    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.repo_owner, self.repo_name)
    }

    /// Stable review id: `provider+owner+repo+pr+timestamp`, hashed into a
    /// UUIDv5 for a fixed-width, collision-resistant identifier.
    pub fn review_id(&self, at: DateTime<Utc>) -> String {
        let seed = format!(
            "{}:{}:{}:{}:{}",
            self.provider,
            self.repo_owner,
            self.repo_name,
            self.pr_number,
            at.to_rfc3339()
        );
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, seed.as_bytes()).to_string()
    }
}

/// A contiguous hunk of one file's diff; the unit of analyzer input.
///
/// Created by the chunk_analyzer stage; read-only downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub language: String,
    pub is_full_file: bool,
}

/// Totally ordered severity: lower variants are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Suggestion,
    Note,
}

impl Severity {
    /// Parses a severity string; invalid input defaults to `Suggestion`, per
    /// the classifier's documented fallback.
    pub fn parse_or_default(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            "suggestion" => Severity::Suggestion,
            "note" => Severity::Note,
            _ => Severity::Suggestion,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Suggestion => "suggestion",
            Severity::Note => "note",
        }
    }
}

/// Finding category. Unknown/custom tags collapse to `Other` rather than
/// being rejected, since analyzers are free to label ad hoc categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Security,
    Logic,
    Style,
    Pattern,
    General,
    #[serde(other)]
    Other,
}

impl Category {
    /// Ordering used to break ties in `deduplicate_by_priority`.
    pub fn priority(&self) -> u8 {
        match self {
            Category::Security => 0,
            Category::Logic => 1,
            Category::Pattern => 2,
            Category::Style => 3,
            Category::General => 4,
            Category::Other => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::Logic => "logic",
            Category::Style => "style",
            Category::Pattern => "pattern",
            Category::General => "general",
            Category::Other => "other",
        }
    }
}

/// A single finding produced by an analyzer.
///
/// Mutated only by the severity classifier (which may reclassify
/// `severity`) and the processing pipeline; destroyed when the workflow
/// ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub file_path: String,
    pub line_number: u32,
    pub message: String,
    pub severity: Severity,
    pub suggestion: Option<String>,
    pub analyzer: String,
    pub confidence: f32,
    pub category: Category,
}

impl Suggestion {
    /// Builds a normalized suggestion, clamping confidence into `[0, 1]` so
    /// every emitted instance satisfies the crate's invariant regardless of
    /// what an analyzer or model computed.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_path: impl Into<String>,
        line_number: u32,
        message: impl Into<String>,
        severity: Severity,
        suggestion: Option<String>,
        analyzer: impl Into<String>,
        confidence: f32,
        category: Category,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line_number: line_number.max(1),
            message: message.into(),
            severity,
            suggestion,
            analyzer: analyzer.into(),
            confidence: confidence.clamp(0.0, 1.0),
            category,
        }
    }
}

/// Externally publishable projection of a `Suggestion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewComment {
    pub file_path: String,
    pub line_number: u32,
    pub message: String,
    pub severity: Severity,
    pub suggestion: Option<String>,
}

impl From<&Suggestion> for ReviewComment {
    fn from(s: &Suggestion) -> Self {
        ReviewComment {
            file_path: s.file_path.clone(),
            line_number: s.line_number,
            message: s.message.clone(),
            severity: s.severity,
            suggestion: s.suggestion.clone(),
        }
    }
}

/// Effective configuration for one review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub max_suggestions: u32,
    pub severity_threshold: Severity,
    pub enable_agents: HashMap<String, bool>,
    pub custom_rules: serde_json::Value,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        let mut enable_agents = HashMap::new();
        for name in ["security", "style", "logic", "pattern"] {
            enable_agents.insert(name.to_string(), true);
        }
        Self {
            max_suggestions: 50,
            severity_threshold: Severity::Suggestion,
            enable_agents,
            custom_rules: serde_json::Value::Null,
        }
    }
}

/// File change kind as reported by the diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// File selection priority under the optimizer's token budget. Variant
/// ordinal doubles as the numeric priority from the specification
/// (`Skip=1 .. Critical=5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FilePriority {
    Skip = 1,
    Low = 2,
    Medium = 3,
    High = 4,
    Critical = 5,
}

/// Selection record produced by the optimizer for one file in the diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub language: String,
    pub additions: u32,
    pub deletions: u32,
    pub change_type: ChangeType,
    pub priority: FilePriority,
    pub reason: String,
    pub estimated_tokens: u64,
}

/// Which budget dimension a `BudgetStatus` describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetKind {
    Daily,
    Monthly,
    PerPr,
}

/// Result of a single budget check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub kind: BudgetKind,
    pub limit_usd: f64,
    pub spent_usd: f64,
    pub remaining_usd: f64,
    pub percentage: f64,
    pub exceeded: bool,
    pub warning: bool,
    pub can_proceed: bool,
}

/// A unit of work on the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub pr_event: PrEvent,
    pub priority: u8,
    pub received_at: DateTime<Utc>,
    pub delivery_attempt: u32,
}
