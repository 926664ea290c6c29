//! The four mandatory analyzers: security, logic, pattern, style.
//!
//! Each analyzer is pattern-based first (regex tables ported from the
//! original agents, scored with fixed confidence values) and optionally
//! augmented by an LLM pass that is strictly best-effort: any transport or
//! parse failure silently drops the LLM findings and keeps the pattern
//! results, matching every original agent's `try/except: pass` around its
//! `_llm_analysis` call.

pub mod logic;
pub mod pattern;
pub mod security;
pub mod style;

use serde::Deserialize;

use crate::errors::Error;
use crate::model_router::{self, Complexity, ModelClient, RoutePriority, RouteTask};
use crate::types::{Category, ChunkInfo, Severity, Suggestion};

/// Selects which of the four mandatory analyzers to run; dispatch is a
/// closed enum match rather than a trait object, mirroring the teacher's
/// enum-dispatch `ProviderClient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyzerKind {
    Security,
    Logic,
    Pattern,
    Style,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 4] = [
        AnalyzerKind::Security,
        AnalyzerKind::Logic,
        AnalyzerKind::Pattern,
        AnalyzerKind::Style,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AnalyzerKind::Security => "security",
            AnalyzerKind::Logic => "logic",
            AnalyzerKind::Pattern => "pattern",
            AnalyzerKind::Style => "style",
        }
    }

    /// Lower runs first. Matches the original agents' construction-time
    /// priority values.
    pub fn priority(&self) -> u8 {
        match self {
            AnalyzerKind::Security => 1,
            AnalyzerKind::Logic => 2,
            AnalyzerKind::Pattern => 3,
            AnalyzerKind::Style => 5,
        }
    }

    pub fn should_analyze(&self, chunk: &ChunkInfo) -> bool {
        chunk.language != "unknown"
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            AnalyzerKind::Security => security::SYSTEM_PROMPT,
            AnalyzerKind::Logic => logic::SYSTEM_PROMPT,
            AnalyzerKind::Pattern => pattern::SYSTEM_PROMPT,
            AnalyzerKind::Style => style::SYSTEM_PROMPT,
        }
    }

    fn category(&self) -> Category {
        match self {
            AnalyzerKind::Security => Category::Security,
            AnalyzerKind::Logic => Category::Logic,
            AnalyzerKind::Pattern => Category::Pattern,
            AnalyzerKind::Style => Category::Style,
        }
    }

    fn pattern_suggestions(&self, chunk: &ChunkInfo, agents_md: Option<&str>) -> Vec<Suggestion> {
        match self {
            AnalyzerKind::Security => security::pattern_suggestions(chunk),
            AnalyzerKind::Logic => logic::pattern_suggestions(chunk),
            AnalyzerKind::Pattern => pattern::pattern_suggestions(chunk, agents_md),
            AnalyzerKind::Style => style::pattern_suggestions(chunk),
        }
    }
}

/// Per-analysis context passed alongside each chunk: the repo's AGENTS.md
/// content (used only by the pattern analyzer's custom-rule check and as
/// LLM prompt context) and the effective review configuration.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub agents_md: Option<String>,
}

/// Runs pattern-based detection only, with no model call. Used when an
/// analyzer's LLM augmentation is disabled or unavailable, and by tests that
/// want deterministic output.
pub fn analyze_patterns_only(
    kind: AnalyzerKind,
    chunk: &ChunkInfo,
    ctx: &AnalysisContext,
) -> Vec<Suggestion> {
    if !kind.should_analyze(chunk) {
        return Vec::new();
    }
    kind.pattern_suggestions(chunk, ctx.agents_md.as_deref())
}

/// Runs pattern-based detection then augments with a best-effort LLM pass.
/// Chunks shorter than 100 characters skip the LLM call entirely, matching
/// every original agent's short-circuit.
pub async fn analyze<C: ModelClient>(
    kind: AnalyzerKind,
    chunk: &ChunkInfo,
    ctx: &AnalysisContext,
    client: &C,
    map_err: impl Fn(&C::Error) -> Error,
) -> Vec<Suggestion> {
    if !kind.should_analyze(chunk) {
        return Vec::new();
    }

    let mut suggestions = kind.pattern_suggestions(chunk, ctx.agents_md.as_deref());

    if chunk.content.len() >= 100 {
        suggestions.extend(llm_augment(kind, chunk, ctx, client, map_err).await);
    }

    suggestions
}

#[derive(Deserialize)]
struct LlmFinding {
    line_number: Option<u32>,
    message: Option<String>,
    severity: Option<String>,
    suggestion: Option<String>,
    confidence: Option<f32>,
}

async fn llm_augment<C: ModelClient>(
    kind: AnalyzerKind,
    chunk: &ChunkInfo,
    ctx: &AnalysisContext,
    client: &C,
    map_err: impl Fn(&C::Error) -> Error,
) -> Vec<Suggestion> {
    let agents_context = ctx
        .agents_md
        .as_deref()
        .map(|s| s.chars().take(500).collect::<String>())
        .unwrap_or_else(|| "None".to_string());

    let prompt = format!(
        "{system_prompt}\n\nAnalyze this {language} code:\n\n```\n{content}\n```\n\n\
         AGENTS.md context: {agents_context}\n\n\
         Return a JSON array of findings with fields: line_number, message, severity, suggestion, confidence.",
        system_prompt = kind.system_prompt(),
        language = chunk.language,
        content = chunk.content,
        agents_context = agents_context,
    );

    let task = match kind {
        AnalyzerKind::Security => RouteTask::Security,
        _ => RouteTask::Analysis,
    };
    let tier = model_router::select_tier(task, Complexity::Medium, RoutePriority::Medium);

    let value = match model_router::route_json(client, tier, &prompt, &map_err).await {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let findings: Vec<LlmFinding> = match serde_json::from_value(value) {
        Ok(f) => f,
        Err(_) => return Vec::new(),
    };

    findings
        .into_iter()
        .map(|f| {
            Suggestion::new(
                chunk.file_path.clone(),
                f.line_number.unwrap_or(chunk.start_line),
                f.message.unwrap_or_else(|| "issue detected".to_string()),
                f.severity
                    .map(|s| Severity::parse_or_default(&s))
                    .unwrap_or(Severity::Warning),
                f.suggestion,
                kind.name(),
                f.confidence.unwrap_or(0.7),
                kind.category(),
            )
        })
        .collect()
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
    fn unknown_language_is_never_analyzed() {
        let c = chunk("unknown", "print('hi')");
        for kind in AnalyzerKind::ALL {
            assert!(analyze_patterns_only(kind, &c, &AnalysisContext::default()).is_empty());
        }
    }

    #[test]
    fn priority_order_matches_original_agents() {
        assert!(AnalyzerKind::Security.priority() < AnalyzerKind::Logic.priority());
        assert!(AnalyzerKind::Logic.priority() < AnalyzerKind::Pattern.priority());
        assert!(AnalyzerKind::Pattern.priority() < AnalyzerKind::Style.priority());
    }
}
