//! Process-wide state shared across handlers: the job queue handle used to
//! enqueue accepted webhook events, and the per-provider webhook secrets
//! used to verify them.
//!
//! Grounded on `ai-llm-service::error_handler`'s `ConfigError`/`must_env`
//! style for environment loading.

use std::sync::Arc;

use job_runtime::RedisStreamBroker;
use review_core::capabilities::LoggingFeedbackSink;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("failed to connect to the review-request queue: {0}")]
    Queue(#[from] job_runtime::RedisBrokerError),
}

fn must_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn opt_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Per-provider secret used to verify webhook signatures. A provider with no
/// configured secret is treated as an explicit bypass (see
/// `verify::verify_signature`), not a rejection — useful for local dev
/// against providers that don't sign payloads.
#[derive(Clone, Default)]
pub struct WebhookSecrets {
    pub github: Option<String>,
    pub gitlab: Option<String>,
    pub bitbucket: Option<String>,
}

impl WebhookSecrets {
    pub fn from_env() -> Self {
        Self {
            github: opt_env("GITHUB_WEBHOOK_SECRET"),
            gitlab: opt_env("GITLAB_WEBHOOK_SECRET"),
            bitbucket: opt_env("BITBUCKET_WEBHOOK_SECRET"),
        }
    }
}

/// Shared state for handlers. Cloned per-request (everything inside is
/// reference-counted or cheap to copy).
#[derive(Clone)]
pub struct AppState {
    /// Publishes accepted webhook events onto the review-request queue.
    pub broker: Arc<RedisStreamBroker>,
    /// Topic/stream name review requests are published to.
    pub review_topic: String,
    /// Topic/stream name feedback events are published to.
    pub feedback_topic: String,
    pub secrets: WebhookSecrets,
    /// No-op sink; the feedback processing pipeline is out of scope, only
    /// the ingress-side contract (verify, normalize, hand off) is live.
    pub feedback_sink: LoggingFeedbackSink,
}

impl AppState {
    /// Builds the shared state from environment variables.
    ///
    /// Required: `REDIS_URL`. Optional: `REVIEW_REQUEST_TOPIC` (default
    /// `review-requests`), `FEEDBACK_TOPIC` (default `review-feedback`),
    /// `QUEUE_CONSUMER_GROUP` (default `api-ingress`), and the three
    /// `*_WEBHOOK_SECRET` variables (missing = bypass for that provider).
    pub async fn from_env() -> Result<Self, ConfigError> {
        let redis_url = must_env("REDIS_URL")?;
        let review_topic = opt_env("REVIEW_REQUEST_TOPIC").unwrap_or_else(|| "review-requests".to_string());
        let feedback_topic = opt_env("FEEDBACK_TOPIC").unwrap_or_else(|| "review-feedback".to_string());
        let group = opt_env("QUEUE_CONSUMER_GROUP").unwrap_or_else(|| "api-ingress".to_string());

        // The ingress side only ever publishes; it still needs a broker
        // bound to a stream/group/consumer to satisfy `RedisStreamBroker`'s
        // constructor, even though it never calls `subscribe`.
        let broker = RedisStreamBroker::connect(
            &redis_url,
            &review_topic,
            &group,
            job_runtime::redis_broker::default_consumer_name(),
        )
        .await?;

        Ok(Self {
            broker: Arc::new(broker),
            review_topic,
            feedback_topic,
            secrets: WebhookSecrets::from_env(),
            feedback_sink: LoggingFeedbackSink,
        })
    }
}
