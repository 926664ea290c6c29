//! The staged, checkpointable workflow engine that drives a single review
//! from ingest to publish.
//!
//! Grounded on `original_source/src/graph/nodes.py`'s seven-stage graph;
//! the overall shape (a linear sequence with one bounded loop, `debug!`
//! instrumentation per sub-stage, no `async-trait`/`Box<dyn Trait>`) follows
//! `mr-reviewer::run_review`'s `step1..step4` pattern.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::analyzers::{self, AnalysisContext, AnalyzerKind};
use crate::capabilities::ProviderAdapter;
use crate::checkpoint::CheckpointStore;
use crate::config::ReviewServiceConfig;
use crate::dedup;
use crate::diff;
use crate::errors::Error;
use crate::judge;
use crate::model_router::ModelClient;
use crate::severity;
use crate::types::{PrEvent, ReviewComment, ReviewConfig, Suggestion};

/// Which of the seven stages a `ReviewState` is currently at, or has last
/// completed. Persisted in checkpoints so a restart resumes at the right
/// point instead of re-running from `ingest_pr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IngestPr,
    ChunkAnalyzer,
    ParallelAgents,
    AggregateResults,
    SeverityFilter,
    LlmJudge,
    Publish,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::IngestPr => "ingest_pr",
            Stage::ChunkAnalyzer => "chunk_analyzer",
            Stage::ParallelAgents => "parallel_agents",
            Stage::AggregateResults => "aggregate_results",
            Stage::SeverityFilter => "severity_filter",
            Stage::LlmJudge => "llm_judge",
            Stage::Publish => "publish",
        }
    }
}

/// Per-chunk record of which analyzers ran and how many findings each
/// produced, kept for the workflow's metadata.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ChunkAgentResult {
    pub chunk_index: usize,
    pub file_path: String,
    pub findings_by_analyzer: HashMap<String, usize>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReviewMetadata {
    pub review_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_stage: Stage,
    pub per_chunk_results: Vec<ChunkAgentResult>,
    pub error_count: u32,
    /// Set by the caller (the job runtime, after a budget check) before the
    /// workflow starts. When true, `ingest_pr` short-circuits straight to a
    /// "budget" publish summary without fetching the diff or spending any
    /// model calls.
    pub budget_denied: bool,
}

/// The workflow's complete state at any checkpoint. See SPEC_FULL.md §3.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReviewState {
    pub event: PrEvent,
    pub config: ReviewConfig,
    pub diff: String,
    pub agents_md: Option<String>,
    pub chunks: Vec<crate::types::ChunkInfo>,
    pub current_chunk_index: usize,
    pub suggestions: Vec<Suggestion>,
    pub raw_analyzer_outputs: HashMap<String, Vec<Suggestion>>,
    pub validated_suggestions: Vec<Suggestion>,
    pub rejected_suggestions: Vec<Suggestion>,
    pub comments: Vec<ReviewComment>,
    pub summary: String,
    pub passed: bool,
    pub metadata: ReviewMetadata,
    pub error: Option<String>,
    pub should_stop: bool,
}

impl ReviewState {
    pub fn new(event: PrEvent, config: ReviewConfig, review_id: String, budget_denied: bool) -> Self {
        Self {
            event,
            config,
            diff: String::new(),
            agents_md: None,
            chunks: Vec::new(),
            current_chunk_index: 0,
            suggestions: Vec::new(),
            raw_analyzer_outputs: HashMap::new(),
            validated_suggestions: Vec::new(),
            rejected_suggestions: Vec::new(),
            comments: Vec::new(),
            summary: String::new(),
            passed: false,
            metadata: ReviewMetadata {
                review_id,
                started_at: Utc::now(),
                completed_at: None,
                current_stage: Stage::IngestPr,
                per_chunk_results: Vec::new(),
                error_count: 0,
                budget_denied,
            },
            error: None,
            should_stop: false,
        }
    }

    fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.should_stop = true;
        self.metadata.error_count += 1;
    }
}

/// Runs a review end-to-end, driving the stage sequence described in
/// SPEC_FULL.md §4.7. Every successful stage transition is checkpointed
/// under the review id so a subsequent process can resume.
#[allow(clippy::too_many_arguments)]
pub async fn run<P, M, K>(
    mut state: ReviewState,
    provider: &P,
    provider_map_err: impl Fn(&P::Error) -> Error,
    model: &M,
    model_map_err: impl Fn(&M::Error) -> Error,
    checkpoint: &K,
    svc: &ReviewServiceConfig,
) -> ReviewState
where
    P: ProviderAdapter,
    M: ModelClient,
    K: CheckpointStore,
{
    loop {
        debug!(
            review_id = %state.metadata.review_id,
            stage = state.metadata.current_stage.name(),
            "workflow: entering stage"
        );

        match state.metadata.current_stage {
            Stage::IngestPr => ingest_pr(&mut state, provider, &provider_map_err).await,
            Stage::ChunkAnalyzer => chunk_analyzer(&mut state),
            Stage::ParallelAgents => {
                parallel_agents(&mut state, model, &model_map_err, svc).await
            }
            Stage::AggregateResults => aggregate_results(&mut state, svc),
            Stage::SeverityFilter => severity_filter(&mut state),
            Stage::LlmJudge => llm_judge(&mut state, model, &model_map_err).await,
            Stage::Publish => {
                publish(&mut state, provider, &provider_map_err).await;
                save_checkpoint(&state, checkpoint).await;
                break;
            }
        }

        save_checkpoint(&state, checkpoint).await;

        state.metadata.current_stage = next_stage(&state);
    }

    info!(
        review_id = %state.metadata.review_id,
        passed = state.passed,
        suggestions = state.comments.len(),
        "workflow: review complete"
    );
    state
}

/// Edges between stages, per SPEC_FULL.md §4.7:
/// - after `parallel_agents`: loop while chunks remain, else `aggregate_results`.
/// - after `aggregate_results`: `publish` if empty/should_stop, else `severity_filter`.
/// - after `severity_filter`: `publish` if empty, else `llm_judge`.
/// - after `llm_judge`: always `publish`.
/// - `publish` is terminal.
fn next_stage(state: &ReviewState) -> Stage {
    match state.metadata.current_stage {
        Stage::IngestPr => {
            if state.should_stop {
                Stage::Publish
            } else {
                Stage::ChunkAnalyzer
            }
        }
        Stage::ChunkAnalyzer => {
            if state.should_stop || state.chunks.is_empty() {
                Stage::Publish
            } else {
                Stage::ParallelAgents
            }
        }
        Stage::ParallelAgents => {
            if state.should_stop || state.current_chunk_index >= state.chunks.len() {
                Stage::AggregateResults
            } else {
                Stage::ParallelAgents
            }
        }
        Stage::AggregateResults => {
            if state.suggestions.is_empty() || state.should_stop {
                Stage::Publish
            } else {
                Stage::SeverityFilter
            }
        }
        Stage::SeverityFilter => {
            if state.suggestions.is_empty() {
                Stage::Publish
            } else {
                Stage::LlmJudge
            }
        }
        Stage::LlmJudge => Stage::Publish,
        Stage::Publish => Stage::Publish,
    }
}

async fn save_checkpoint<K: CheckpointStore>(state: &ReviewState, checkpoint: &K) {
    match crate::checkpoint::tag_pydantic(state) {
        Ok(payload) => {
            if let Err(e) = checkpoint
                .save(&state.metadata.review_id, state.metadata.current_stage.name(), payload)
                .await
            {
                warn!(review_id = %state.metadata.review_id, error = %e, "workflow: checkpoint save failed");
            }
        }
        Err(e) => warn!(review_id = %state.metadata.review_id, error = %e, "workflow: checkpoint serialize failed"),
    }
}

/// Resumes a review from its last checkpoint, if one exists; otherwise
/// returns a fresh state starting at `ingest_pr`.
pub async fn resume_or_start<K: CheckpointStore>(
    checkpoint: &K,
    review_id: &str,
    stages: &[Stage],
    fresh: impl FnOnce() -> ReviewState,
) -> ReviewState {
    for stage in stages.iter().rev() {
        if let Ok(Some(payload)) = checkpoint.load(review_id, stage.name()).await {
            if let Ok(state) = crate::checkpoint::untag_pydantic::<ReviewState>(payload) {
                info!(review_id, stage = stage.name(), "workflow: resuming from checkpoint");
                return state;
            }
        }
    }
    fresh()
}

async fn ingest_pr<P: ProviderAdapter>(
    state: &mut ReviewState,
    provider: &P,
    map_err: &impl Fn(&P::Error) -> Error,
) {
    if state.metadata.budget_denied {
        state.should_stop = false;
        state.summary = "Review skipped: repository/PR/daily cost budget exceeded.".to_string();
        state.passed = true;
        return;
    }

    match provider.fetch_diff(&state.event).await {
        Ok(diff) => state.diff = diff,
        Err(e) => {
            state.fail(format!("failed to fetch diff: {}", map_err(&e)));
            return;
        }
    }

    state.agents_md = provider.fetch_agents_md(&state.event).await.unwrap_or(None);
}

fn chunk_analyzer(state: &mut ReviewState) {
    if state.should_stop {
        return;
    }
    let chunks = diff::parse_unified_diff(&state.diff);
    if chunks.is_empty() {
        state.fail("No PR diff to analyze");
        return;
    }
    state.chunks = chunks;
    state.current_chunk_index = 0;
}

async fn parallel_agents<M: ModelClient>(
    state: &mut ReviewState,
    model: &M,
    map_err: &impl Fn(&M::Error) -> Error,
    svc: &ReviewServiceConfig,
) {
    if state.should_stop || state.current_chunk_index >= state.chunks.len() {
        return;
    }

    let idx = state.current_chunk_index;
    let chunk = state.chunks[idx].clone();
    let ctx = AnalysisContext {
        agents_md: state.agents_md.clone(),
    };

    let enabled: Vec<AnalyzerKind> = AnalyzerKind::ALL
        .into_iter()
        .filter(|k| {
            state
                .config
                .enable_agents
                .get(k.name())
                .copied()
                .unwrap_or(true)
        })
        .collect();

    let mut results: Vec<(AnalyzerKind, Vec<Suggestion>)> = Vec::with_capacity(enabled.len());
    let futures = enabled
        .iter()
        .map(|kind| analyzers::analyze(*kind, &chunk, &ctx, model, map_err));
    let outcomes = futures::future::join_all(futures).await;
    for (kind, findings) in enabled.into_iter().zip(outcomes) {
        results.push((kind, findings));
    }

    let mut chunk_summary = ChunkAgentResult {
        chunk_index: idx,
        file_path: chunk.file_path.clone(),
        findings_by_analyzer: HashMap::new(),
    };

    for (kind, findings) in results {
        chunk_summary
            .findings_by_analyzer
            .insert(kind.name().to_string(), findings.len());
        state
            .raw_analyzer_outputs
            .entry(kind.name().to_string())
            .or_default()
            .extend(findings.clone());
        state.suggestions.extend(findings);
    }

    state.metadata.per_chunk_results.push(chunk_summary);
    state.current_chunk_index += 1;
    let _ = svc;
}

fn aggregate_results(state: &mut ReviewState, svc: &ReviewServiceConfig) {
    let suggestions = std::mem::take(&mut state.suggestions);
    state.suggestions = dedup::deduplicate(suggestions, svc.dedup);
}

fn severity_filter(state: &mut ReviewState) {
    let suggestions = std::mem::take(&mut state.suggestions);
    let filtered = severity::filter_by_threshold(suggestions, state.config.severity_threshold);
    let mut filtered = filtered;
    filtered.truncate(state.config.max_suggestions as usize);
    state.suggestions = filtered;
}

async fn llm_judge<M: ModelClient>(
    state: &mut ReviewState,
    model: &M,
    map_err: &impl Fn(&M::Error) -> Error,
) {
    let suggestions = std::mem::take(&mut state.suggestions);
    let futures = suggestions
        .iter()
        .map(|s| judge::validate(model, map_err, s));
    let verdicts = futures::future::join_all(futures).await;

    let mut validated = Vec::with_capacity(suggestions.len());
    let mut rejected = Vec::new();
    for (s, ok) in suggestions.into_iter().zip(verdicts) {
        if ok {
            validated.push(s);
        } else {
            rejected.push(s);
        }
    }

    state.validated_suggestions = validated.clone();
    state.rejected_suggestions = rejected;
    state.suggestions = validated;
}

async fn publish<P: ProviderAdapter>(
    state: &mut ReviewState,
    provider: &P,
    map_err: &impl Fn(&P::Error) -> Error,
) {
    if state.metadata.budget_denied {
        state.metadata.completed_at = Some(Utc::now());
        return;
    }

    state.comments = state.suggestions.iter().map(ReviewComment::from).collect();

    if state.error.is_none() && !state.comments.is_empty() {
        if let Err(e) = provider
            .post_review_comments(
                &state.event.repo_owner,
                &state.event.repo_name,
                state.event.pr_number,
                &state.comments,
            )
            .await
        {
            state.fail(format!("failed to publish review comments: {}", map_err(&e)));
        }
    }

    state.summary = render_summary(state);
    state.passed = state.metadata.error_count == 0;
    state.metadata.completed_at = Some(Utc::now());
}

/// Renders the markdown summary: counts per severity plus a status line.
fn render_summary(state: &ReviewState) -> String {
    if let Some(err) = &state.error {
        return format!("Review failed: {err}");
    }

    let stats = severity::get_severity_stats(&state.suggestions);
    let mut lines = vec!["## Review Summary".to_string()];

    match stats {
        Some(stats) => {
            for sev in ["error", "warning", "suggestion", "note"] {
                if let Some(stat) = stats.get(sev) {
                    if stat.count > 0 {
                        lines.push(format!("- {sev}: {} ({:.1}%)", stat.count, stat.percentage));
                    }
                }
            }
        }
        None => lines.push("No issues found.".to_string()),
    }

    let status = if severity::should_block_merge(&state.suggestions) {
        "changes requested"
    } else {
        "approved"
    };
    lines.push(format!("Status: {status}"));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::fakes::FakeProvider;
    use crate::checkpoint::fakes::InMemoryCheckpointStore;
    use crate::config::ReviewServiceConfig;
    use crate::types::{PrAction, ProviderTag, ReviewConfig};

    #[derive(Debug, thiserror::Error)]
    #[error("never fails")]
    struct NeverFails;

    struct EchoModel;

    impl ModelClient for EchoModel {
        type Error = NeverFails;

        async fn complete(
            &self,
            _tier: crate::model_router::ModelTier,
            _prompt: &str,
        ) -> Result<String, Self::Error> {
            Ok(r#"{"valid": true, "reason": "ok"}"#.to_string())
        }
    }

    fn event() -> PrEvent {
        PrEvent {
            provider: ProviderTag::Github,
            repo_owner: "acme".into(),
            repo_name: "widgets".into(),
            pr_number: 42,
            action: PrAction::Opened,
            source_branch: "feature".into(),
            target_branch: "main".into(),
            commit_sha: "abc123".into(),
            title: "add eval usage".into(),
            body: None,
            author: "dev".into(),
            url: None,
            raw_payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn happy_path_small_pr_flags_security_error() {
        let diff = "diff --git a/app.py b/app.py\n\
                     index 1..2 100644\n\
                     --- a/app.py\n\
                     +++ b/app.py\n\
                     @@ -1,1 +1,2 @@\n\
                      def f():\n\
                     +    eval(user_input)\n";
        let provider = FakeProvider {
            diff: diff.to_string(),
            agents_md: None,
            posted: Default::default(),
        };
        let checkpoint = InMemoryCheckpointStore::default();
        let svc = ReviewServiceConfig::from_env();
        let state = ReviewState::new(event(), ReviewConfig::default(), "rev-1".into(), false);

        let final_state = run(
            state,
            &provider,
            |e: &crate::capabilities::fakes::FakeProviderError| Error::ProviderFail(e.0.clone()),
            &EchoModel,
            |_: &NeverFails| Error::Other("unreachable".into()),
            &checkpoint,
            &svc,
        )
        .await;

        assert_eq!(final_state.metadata.current_stage, Stage::Publish);
        assert!(final_state.comments.iter().any(|c| c.severity == crate::types::Severity::Error));
        assert!(!final_state.passed);

        let posted = provider.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
    }

    #[tokio::test]
    async fn empty_diff_short_circuits_to_publish_with_error() {
        let provider = FakeProvider {
            diff: String::new(),
            agents_md: None,
            posted: Default::default(),
        };
        let checkpoint = InMemoryCheckpointStore::default();
        let svc = ReviewServiceConfig::from_env();
        let state = ReviewState::new(event(), ReviewConfig::default(), "rev-2".into(), false);

        let final_state = run(
            state,
            &provider,
            |e: &crate::capabilities::fakes::FakeProviderError| Error::ProviderFail(e.0.clone()),
            &EchoModel,
            |_: &NeverFails| Error::Other("unreachable".into()),
            &checkpoint,
            &svc,
        )
        .await;

        assert!(final_state.error.is_some());
        assert!(!final_state.passed);
    }

    #[tokio::test]
    async fn budget_denied_skips_straight_to_publish() {
        let provider = FakeProvider::default();
        let checkpoint = InMemoryCheckpointStore::default();
        let svc = ReviewServiceConfig::from_env();
        let state = ReviewState::new(event(), ReviewConfig::default(), "rev-3".into(), true);

        let final_state = run(
            state,
            &provider,
            |e: &crate::capabilities::fakes::FakeProviderError| Error::ProviderFail(e.0.clone()),
            &EchoModel,
            |_: &NeverFails| Error::Other("unreachable".into()),
            &checkpoint,
            &svc,
        )
        .await;

        assert!(final_state.summary.contains("budget"));
        assert!(provider.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn current_chunk_index_is_monotone_and_bounded() {
        let diff = "diff --git a/a.py b/a.py\n@@ -1,1 +1,1 @@\n+x=1\n\
                     diff --git a/b.py b/b.py\n@@ -1,1 +1,1 @@\n+y=2\n";
        let provider = FakeProvider {
            diff: diff.to_string(),
            agents_md: None,
            posted: Default::default(),
        };
        let checkpoint = InMemoryCheckpointStore::default();
        let svc = ReviewServiceConfig::from_env();
        let state = ReviewState::new(event(), ReviewConfig::default(), "rev-4".into(), false);

        let final_state = run(
            state,
            &provider,
            |e: &crate::capabilities::fakes::FakeProviderError| Error::ProviderFail(e.0.clone()),
            &EchoModel,
            |_: &NeverFails| Error::Other("unreachable".into()),
            &checkpoint,
            &svc,
        )
        .await;

        assert_eq!(final_state.current_chunk_index, final_state.chunks.len());
    }
}
