//! Bridges `ProviderClient`'s enum-dispatch REST clients to
//! `review_core::capabilities::ProviderAdapter`, the trait the workflow
//! engine is generic over.
//!
//! `fetch_diff` concatenates each file's `raw_unidiff` (falling back to
//! `try_enrich_changes` when the provider truncated any diffs); `PrEvent`
//! carries enough of the original webhook body (`raw_payload`) that no
//! second round-trip to the provider is needed for metadata.

use review_core::capabilities::ProviderAdapter;
use review_core::types::{PrEvent, ReviewComment, Severity};

use crate::errors::Error as MrError;
use crate::git_providers::{ChangeRequestId, ProviderClient};

fn change_request_id(event: &PrEvent) -> ChangeRequestId {
    ChangeRequestId {
        project: event.repo_slug(),
        iid: event.pr_number,
    }
}

/// Bridges this crate's [`MrError`] into review-core's error taxonomy for
/// `model_router`-style retry classification, mirroring
/// `review_core::llm_client::map_ai_llm_error`'s status-code mapping.
pub fn map_provider_error(err: &MrError) -> review_core::errors::Error {
    use crate::errors::{Error as ProviderCrateError, ProviderError};
    use review_core::errors::Error as CoreError;

    match err {
        ProviderCrateError::Provider(ProviderError::RateLimited { retry_after_secs }) => {
            CoreError::RateLimit {
                retry_after_secs: *retry_after_secs,
            }
        }
        ProviderCrateError::Provider(ProviderError::Timeout) => {
            CoreError::Transport("timeout".to_string())
        }
        ProviderCrateError::Provider(ProviderError::Server(code)) => {
            CoreError::Transport(format!("server error {code}"))
        }
        ProviderCrateError::Provider(ProviderError::Network(msg)) => {
            CoreError::Transport(msg.clone())
        }
        other => CoreError::ProviderFail(other.to_string()),
    }
}

impl ProviderAdapter for ProviderClient {
    type Error = MrError;

    async fn fetch_diff(&self, event: &PrEvent) -> Result<String, Self::Error> {
        let id = change_request_id(event);
        let mut changes = self.fetch_changes(&id).await?;
        if changes.is_truncated {
            if let Some(enriched) = self.try_enrich_changes(&id).await? {
                changes = enriched;
            }
        }

        let mut diff = String::new();
        for file in &changes.files {
            if let Some(raw) = &file.raw_unidiff {
                diff.push_str(raw);
                if !raw.ends_with('\n') {
                    diff.push('\n');
                }
            }
        }
        Ok(diff)
    }

    async fn fetch_agents_md(&self, event: &PrEvent) -> Result<Option<String>, Self::Error> {
        let id = change_request_id(event);
        let bytes = self
            .fetch_file_raw_at_ref(&id, "AGENTS.md", &event.commit_sha)
            .await?;
        Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    async fn post_review_comments(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
        comments: &[ReviewComment],
    ) -> Result<(), Self::Error> {
        if comments.is_empty() {
            return Ok(());
        }
        let id = ChangeRequestId {
            project: format!("{owner}/{repo}"),
            iid: pr_number,
        };
        self.post_comment(&id, &render_summary(comments)).await
    }
}

/// Renders the review's comments as one markdown note, grouped by severity.
/// Inline, per-line positioning is out of scope (see SPEC_FULL.md's
/// non-goals on the RAG/position-resolver surface); a single summary comment
/// is the agreed-on replacement publish shape.
fn render_summary(comments: &[ReviewComment]) -> String {
    let mut by_severity: Vec<(Severity, Vec<&ReviewComment>)> = vec![
        (Severity::Error, Vec::new()),
        (Severity::Warning, Vec::new()),
        (Severity::Suggestion, Vec::new()),
        (Severity::Note, Vec::new()),
    ];
    for c in comments {
        if let Some((_, bucket)) = by_severity.iter_mut().find(|(s, _)| *s == c.severity) {
            bucket.push(c);
        }
    }

    let mut out = String::from("## Automated review\n\n");
    for (severity, bucket) in &by_severity {
        if bucket.is_empty() {
            continue;
        }
        out.push_str(&format!("### {}\n\n", severity.as_str()));
        for c in bucket {
            out.push_str(&format!("- **{}:{}** — {}", c.file_path, c.line_number, c.message));
            if let Some(s) = &c.suggestion {
                out.push_str(&format!("\n  - suggestion: `{s}`"));
            }
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_summary_groups_by_severity_and_skips_empty_buckets() {
        let comments = vec![
            ReviewComment {
                file_path: "src/lib.rs".into(),
                line_number: 10,
                message: "possible panic".into(),
                severity: Severity::Error,
                suggestion: Some("use `?` instead".into()),
            },
            ReviewComment {
                file_path: "src/main.rs".into(),
                line_number: 3,
                message: "consider renaming".into(),
                severity: Severity::Suggestion,
                suggestion: None,
            },
        ];

        let rendered = render_summary(&comments);
        assert!(rendered.contains("### error"));
        assert!(rendered.contains("### suggestion"));
        assert!(!rendered.contains("### warning"));
        assert!(rendered.contains("src/lib.rs:10"));
    }
}
