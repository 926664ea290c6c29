//! Publishes review-request jobs onto the inbound topic the worker
//! subscribes to.
//!
//! Grounded on `broker::MessageBroker::publish`'s keyword-attributes shape;
//! the envelope this writes is exactly what `worker::QueueEnvelope` expects
//! to read back.

use std::collections::HashMap;

use chrono::Utc;
use review_core::types::PrEvent;

use crate::broker::MessageBroker;

/// Builds and publishes the queue envelope for one PR/MR event, tagging the
/// message with the attributes a subscription filter or dashboard would key
/// on: priority, provider, repo, and PR number.
pub async fn publish_review_request<B: MessageBroker>(
    broker: &B,
    topic: &str,
    event: PrEvent,
    priority: u8,
) -> Result<String, B::Error> {
    let repo_slug = event.repo_slug();
    let pr_number = event.pr_number;
    let provider = event.provider.to_string();

    let envelope = serde_json::json!({
        "pr_event": event,
        "priority": priority,
        "published_at": Utc::now().to_rfc3339(),
    });

    let payload = serde_json::to_vec(&envelope).expect("queue envelope always serializes");

    let mut attributes = HashMap::new();
    attributes.insert("priority".to_string(), priority.to_string());
    attributes.insert("provider".to_string(), provider);
    attributes.insert("repo".to_string(), repo_slug);
    attributes.insert("pr_number".to_string(), pr_number.to_string());

    broker.publish(topic, payload, attributes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::fakes::FakeBroker;
    use review_core::types::{PrAction, ProviderTag};

    fn sample_event() -> PrEvent {
        PrEvent {
            provider: ProviderTag::Github,
            repo_owner: "acme".to_string(),
            repo_name: "widgets".to_string(),
            pr_number: 42,
            action: PrAction::Opened,
            source_branch: "feature".to_string(),
            target_branch: "main".to_string(),
            commit_sha: "deadbeef".to_string(),
            title: "Add widget".to_string(),
            body: None,
            author: "dev".to_string(),
            url: None,
            raw_payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn publish_tags_the_expected_attributes() {
        let broker = FakeBroker::new(Vec::new());

        publish_review_request(&broker, "review-requests", sample_event(), 5)
            .await
            .unwrap();

        let published = broker.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        let (topic, payload, attrs) = &published[0];
        assert_eq!(topic, "review-requests");
        assert_eq!(attrs.get("priority").unwrap(), "5");
        assert_eq!(attrs.get("provider").unwrap(), "github");
        assert_eq!(attrs.get("repo").unwrap(), "acme/widgets");
        assert_eq!(attrs.get("pr_number").unwrap(), "42");

        let value: serde_json::Value = serde_json::from_slice(payload).unwrap();
        assert_eq!(value["priority"], 5);
        assert_eq!(value["pr_event"]["repo_owner"], "acme");
    }

    #[tokio::test]
    async fn publish_propagates_broker_errors() {
        let broker = FakeBroker::new(Vec::new());
        broker.fail_publishes_to("review-requests");

        let result = publish_review_request(&broker, "review-requests", sample_event(), 1).await;
        assert!(result.is_err());
    }
}
