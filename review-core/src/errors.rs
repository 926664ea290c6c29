//! Crate-wide error hierarchy for review-core.
//!
//! Goals:
//! - Single root `Error` enum matching the taxonomy every stage reasons about.
//! - Provider/model-aware mapping (401→Unauthorized, 429→RateLimit, 5xx→Transport).
//! - No dynamic dispatch, no async-trait, ergonomic `?` via `From` impls.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type ReviewResult<T> = Result<T, Error>;

/// Root error type for the review-core crate.
///
/// Variant names follow the error taxonomy: CONFIG, TRANSPORT, RATE_LIMIT,
/// PARSE, JUDGE_FAIL, BUDGET_EXCEEDED, PROVIDER_FAIL.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration; fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Network/broker/RPC failure; retriable per the model client and job
    /// runtime retry policies.
    #[error("transport error: {0}")]
    Transport(String),

    /// Model-provider throttling; retried with exponential backoff.
    #[error("rate limited (retry_after_secs={retry_after_secs:?})")]
    RateLimit { retry_after_secs: Option<u64> },

    /// Malformed webhook/diff/JSON payload.
    #[error("parse error: {0}")]
    Parse(String),

    /// LLM judge unavailable or returned nonsense; callers must treat this as
    /// fail-open (accept), never propagate as a hard failure.
    #[error("judge unavailable: {0}")]
    JudgeFail(String),

    /// A budget enforcer denied the review.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The VCS provider call failed at publish time.
    #[error("provider call failed: {0}")]
    ProviderFail(String),

    /// Generic catch-all for cases that don't fit the taxonomy above.
    #[error("other error: {0}")]
    Other(String),
}

impl Error {
    /// True for the RATE_LIMIT variant.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimit { .. })
    }

    /// True for TRANSPORT and unclassified provider 5xx failures.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Error::Transport(format!("timeout: {e}"));
        }
        if let Some(status) = e.status() {
            let code = status.as_u16();
            return match code {
                429 => Error::RateLimit {
                    retry_after_secs: None,
                },
                500..=599 => Error::Transport(format!("server error {code}")),
                _ => Error::Transport(format!("http status {code}")),
            };
        }
        Error::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}
