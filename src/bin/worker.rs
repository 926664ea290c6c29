//! Review worker process (SPEC_FULL.md C9/C1-C8): drains the review-requests
//! queue and drives `review_core::workflow::run` to completion for each job,
//! publishing results back through the originating VCS provider.
//!
//! This binary owns every stateful collaborator the workflow is generic
//! over — the message broker, the checkpoint store, the cost ledger, and the
//! LLM service profiles — and constructs a fresh `ProviderClient` per job
//! since each job may target a different provider/repo/token.

use std::error::Error;

use ai_llm_service::config::default_config::{
    config_ollama_embedding, config_ollama_fast, config_ollama_slow,
};
use ai_llm_service::service_profiles::LlmServiceProfiles;
use job_runtime::{redis_broker, RedisCheckpointStore, RedisCostLedger, RedisStreamBroker};
use mr_reviewer::git_providers::{ProviderClient, ProviderConfig, ProviderKind};
use review_core::budget::BudgetEnforcer;
use review_core::config::ReviewServiceConfig;
use review_core::llm_client::{map_ai_llm_error, LlmServiceModelClient};
use review_core::types::{Job, ProviderTag};
use review_core::workflow::{self, ReviewState, Stage};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ALL_STAGES: [Stage; 7] = [
    Stage::IngestPr,
    Stage::ChunkAnalyzer,
    Stage::ParallelAgents,
    Stage::AggregateResults,
    Stage::SeverityFilter,
    Stage::LlmJudge,
    Stage::Publish,
];

/// Rough per-review cost estimate: chars/4 as a token-count proxy, priced at
/// `COST_PER_1K_TOKENS_USD` (default matches a typical small local model).
/// `review-core`'s `ReviewState` doesn't track real token usage per call, so
/// this is the same estimate used both for the pre-flight budget check and
/// the post-hoc ledger entry.
fn estimate_cost_usd(diff_len_chars: usize) -> f64 {
    let per_1k: f64 = std::env::var("COST_PER_1K_TOKENS_USD")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.002);
    let tokens = (diff_len_chars as f64) / 4.0;
    (tokens / 1000.0) * per_1k
}

/// Resolves a provider client for one job from per-provider environment
/// variables, e.g. `GITHUB_API_BASE`/`GITHUB_TOKEN`.
fn provider_client_for(provider: ProviderTag) -> Result<ProviderClient, Box<dyn Error>> {
    let (kind, prefix, default_base) = match provider {
        ProviderTag::Github => (ProviderKind::GitHub, "GITHUB", "https://api.github.com"),
        ProviderTag::Gitlab => (ProviderKind::GitLab, "GITLAB", "https://gitlab.com/api/v4"),
        ProviderTag::Bitbucket => (
            ProviderKind::Bitbucket,
            "BITBUCKET",
            "https://api.bitbucket.org/2.0",
        ),
    };

    let base_api = std::env::var(format!("{prefix}_API_BASE")).unwrap_or_else(|_| default_base.to_string());
    let token = std::env::var(format!("{prefix}_TOKEN"))
        .map_err(|_| format!("missing {prefix}_TOKEN"))?;

    Ok(ProviderClient::from_config(ProviderConfig {
        kind,
        base_api,
        token,
    })?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let svc = ReviewServiceConfig::from_env();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let review_topic = std::env::var("REVIEW_REQUEST_TOPIC").unwrap_or_else(|_| "review-requests".to_string());
    let consumer_group = std::env::var("REVIEW_CONSUMER_GROUP").unwrap_or_else(|_| "review-workers".to_string());
    let consumer_name = redis_broker::default_consumer_name();

    let broker = RedisStreamBroker::connect(&redis_url, &review_topic, &consumer_group, &consumer_name).await?;
    let checkpoint_store = RedisCheckpointStore::connect(&redis_url, "checkpoint").await?;
    let cost_ledger = RedisCostLedger::connect(&redis_url, "cost_ledger").await?;
    let enforcer = BudgetEnforcer::new(svc.budget.clone(), cost_ledger.clone());

    let profiles = LlmServiceProfiles::new(
        config_ollama_fast()?,
        Some(config_ollama_slow()?),
        config_ollama_embedding()?,
        std::env::var("LLM_HEALTH_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()),
    )?;
    let model_client = LlmServiceModelClient::new(&profiles);

    let worker_cfg = job_runtime::WorkerConfig {
        concurrency: svc.worker_count,
        max_retries: svc.max_retries,
        dlq_topic: format!("{review_topic}-dlq"),
    };
    let worker = job_runtime::ReviewWorker::new(worker_cfg);

    info!(redis_url = %redis_url, topic = %review_topic, group = %consumer_group, "worker: starting");

    job_runtime::run_until_shutdown(&worker, &broker, |job: Job| {
        let svc = &svc;
        let checkpoint_store = &checkpoint_store;
        let cost_ledger = &cost_ledger;
        let enforcer = &enforcer;
        let model_client = &model_client;
        async move {
            let repo = job.pr_event.repo_slug();
            let estimated_cost = estimate_cost_usd(job.pr_event.title.len() + job.pr_event.body.as_deref().unwrap_or("").len());
            let can_proceed = enforcer.can_review_pr(job.pr_event.pr_number, &repo, estimated_cost).await;

            let provider = provider_client_for(job.pr_event.provider)
                .map_err(|e| format!("provider client setup failed: {e}"))?;

            let review_id = job.pr_event.review_id(job.received_at);
            let event = job.pr_event.clone();
            let budget_denied = !can_proceed;
            let state = workflow::resume_or_start(checkpoint_store, &review_id, &ALL_STAGES, || {
                ReviewState::new(event, svc.default_review.clone(), review_id.clone(), budget_denied)
            })
            .await;

            let final_state = workflow::run(
                state,
                &provider,
                mr_reviewer::review_core_adapter::map_provider_error,
                model_client,
                map_ai_llm_error,
                checkpoint_store,
                svc,
            )
            .await;

            if !budget_denied {
                let diff_cost = estimate_cost_usd(final_state.diff.len());
                if let Err(e) = cost_ledger.record(chrono::Utc::now(), diff_cost, Some(&repo)).await {
                    warn!(review_id = %review_id, error = %e, "worker: cost ledger record failed");
                }
            }

            if let Some(err) = &final_state.error {
                return Err(err.clone());
            }
            Ok::<(), String>(())
        }
    })
    .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_estimate_scales_with_length_and_is_nonnegative() {
        let small = estimate_cost_usd(400);
        let large = estimate_cost_usd(40_000);
        assert!(large > small);
        assert!(small >= 0.0);
    }

    #[test]
    fn provider_client_for_fails_without_token() {
        std::env::remove_var("GITHUB_TOKEN");
        let result = provider_client_for(ProviderTag::Github);
        assert!(result.is_err());
    }
}
