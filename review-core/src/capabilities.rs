//! External collaborator capabilities.
//!
//! Every dynamic/duck-typed collaborator in the original system becomes an
//! explicit trait here. None of these are used as trait objects — callers
//! are generic over the capability (`fn run<P: ProviderAdapter>(...)`),
//! matching the teacher's avoidance of `async-trait` and `Box<dyn Trait>`
//! while still giving each collaborator a typed, swappable interface.

use serde::{Deserialize, Serialize};

use crate::types::{PrEvent, ReviewComment};

/// VCS provider operations the workflow engine needs: fetching diff content
/// and posting the final comments. Concrete implementations (GitHub/GitLab/
/// Bitbucket REST calls) live outside this crate.
pub trait ProviderAdapter {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the unified diff text for the event's head commit.
    fn fetch_diff(
        &self,
        event: &PrEvent,
    ) -> impl std::future::Future<Output = Result<String, Self::Error>> + Send;

    /// Fetches the repository's AGENTS.md content, if any.
    fn fetch_agents_md(
        &self,
        event: &PrEvent,
    ) -> impl std::future::Future<Output = Result<Option<String>, Self::Error>> + Send;

    /// Publishes the final review comments back to the provider.
    fn post_review_comments(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
        comments: &[ReviewComment],
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;
}

/// Feedback event shape (emoji reactions, review states, comments) — see
/// SPEC_FULL.md's "feedback record". The processing pipeline behind this is
/// out of scope; only the ingress-side contract (verify, normalize, hand
/// off) is implemented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub id: String,
    pub provider: String,
    pub event_type: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub pr_number: u64,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub user: String,
    pub emojis: Vec<String>,
    pub primary_emoji: Option<String>,
    pub feedback_type: FeedbackType,
    pub score: f32,
    pub confidence: f32,
    pub is_actionable: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Positive,
    Negative,
    Neutral,
    Confused,
}

/// Sink for feedback events. A no-op/logging implementation is provided
/// since analytics/learning over feedback is explicitly out of scope.
pub trait FeedbackSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn record(
        &self,
        event: FeedbackEvent,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;
}

/// Logs and drops every feedback event. Used where no real feedback
/// warehouse is wired up, keeping the ingress contract exercisable without a
/// real collaborator.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFeedbackSink;

impl FeedbackSink for LoggingFeedbackSink {
    type Error = std::convert::Infallible;

    async fn record(&self, event: FeedbackEvent) -> Result<(), Self::Error> {
        tracing::info!(
            feedback.id = %event.id,
            feedback.type = ?event.feedback_type,
            feedback.score = event.score,
            "feedback event recorded (sink is a no-op)"
        );
        Ok(())
    }
}

#[cfg(any(test, feature = "test-fakes"))]
pub mod fakes {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory `ProviderAdapter` for tests: returns a fixed diff/AGENTS.md
    /// pair and records posted comments for assertions.
    #[derive(Default)]
    pub struct FakeProvider {
        pub diff: String,
        pub agents_md: Option<String>,
        pub posted: Mutex<Vec<(String, String, u64, Vec<ReviewComment>)>>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("fake provider error: {0}")]
    pub struct FakeProviderError(pub String);

    impl ProviderAdapter for FakeProvider {
        type Error = FakeProviderError;

        async fn fetch_diff(&self, _event: &PrEvent) -> Result<String, Self::Error> {
            Ok(self.diff.clone())
        }

        async fn fetch_agents_md(&self, _event: &PrEvent) -> Result<Option<String>, Self::Error> {
            Ok(self.agents_md.clone())
        }

        async fn post_review_comments(
            &self,
            owner: &str,
            repo: &str,
            pr_number: u64,
            comments: &[ReviewComment],
        ) -> Result<(), Self::Error> {
            self.posted.lock().unwrap().push((
                owner.to_string(),
                repo.to_string(),
                pr_number,
                comments.to_vec(),
            ));
            Ok(())
        }
    }

    /// In-memory cost ledger backing for budget tests.
    #[derive(Default)]
    pub struct FakeCostLedger {
        pub entries: Mutex<Vec<(chrono::DateTime<chrono::Utc>, f64, Option<String>)>>,
    }

    impl FakeCostLedger {
        pub fn record(&self, at: chrono::DateTime<chrono::Utc>, cost: f64, repo: Option<&str>) {
            self.entries
                .lock()
                .unwrap()
                .push((at, cost, repo.map(String::from)));
        }
    }

    #[allow(dead_code)]
    pub fn empty_agent_map() -> HashMap<String, bool> {
        HashMap::new()
    }
}
