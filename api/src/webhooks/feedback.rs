//! Normalizes provider feedback payloads (emoji reactions, review states,
//! comments) into `review_core::capabilities::FeedbackEvent`.
//!
//! The feedback *pipeline* (scoring, learning, analytics ETL) is explicitly
//! out of scope (SPEC_FULL.md §1's Non-goals); only this ingress-side
//! contract — verify, normalize, hand off to the `FeedbackSink` — is live
//! here, parallel to the review webhook ingress.

use review_core::capabilities::{FeedbackEvent, FeedbackType};
use serde_json::Value;

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

const POSITIVE_EMOJIS: &[&str] = &["+1", "👍", "heart", "❤️", "hooray", "🎉", "rocket", "🚀"];
const NEGATIVE_EMOJIS: &[&str] = &["-1", "👎"];
const CONFUSED_EMOJIS: &[&str] = &["confused", "😕", "eyes", "🤔"];

fn classify_emojis(emojis: &[String]) -> (FeedbackType, f32) {
    let mut positive = 0i32;
    let mut negative = 0i32;
    let mut confused = 0i32;

    for e in emojis {
        if POSITIVE_EMOJIS.contains(&e.as_str()) {
            positive += 1;
        } else if NEGATIVE_EMOJIS.contains(&e.as_str()) {
            negative += 1;
        } else if CONFUSED_EMOJIS.contains(&e.as_str()) {
            confused += 1;
        }
    }

    if confused > positive && confused > negative {
        (FeedbackType::Confused, 0.0)
    } else if negative > positive {
        (FeedbackType::Negative, -1.0)
    } else if positive > 0 {
        (FeedbackType::Positive, 1.0)
    } else {
        (FeedbackType::Neutral, 0.0)
    }
}

/// Normalizes a generic feedback payload: `{ event_type, repo_owner,
/// repo_name, pr_number, file_path?, line_number?, user, emojis[] }`. Every
/// provider's feedback webhook is mapped to this same shape by the caller
/// before reaching here (the provider-specific reaction/comment schema is a
/// thin-wrapper concern, same as the review webhook's `normalize_*`
/// functions).
pub fn normalize_feedback(provider: &str, body: &Value) -> Option<FeedbackEvent> {
    let event_type = str_field(body, "event_type")?;
    let repo_owner = str_field(body, "repo_owner")?;
    let repo_name = str_field(body, "repo_name")?;
    let pr_number = body.get("pr_number")?.as_u64()?;
    let user = str_field(body, "user").unwrap_or_default();

    let emojis: Vec<String> = body
        .get("emojis")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let (feedback_type, score) = classify_emojis(&emojis);
    let primary_emoji = emojis.first().cloned();
    let is_actionable = matches!(feedback_type, FeedbackType::Negative | FeedbackType::Confused);

    Some(FeedbackEvent {
        id: uuid::Uuid::new_v4().to_string(),
        provider: provider.to_string(),
        event_type,
        repo_owner,
        repo_name,
        pr_number,
        file_path: str_field(body, "file_path"),
        line_number: body.get("line_number").and_then(Value::as_u64).map(|n| n as u32),
        user,
        emojis,
        primary_emoji,
        feedback_type,
        score,
        confidence: if matches!(feedback_type, FeedbackType::Neutral) { 0.3 } else { 0.8 },
        is_actionable,
        timestamp: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thumbs_up_is_positive_and_not_actionable() {
        let body = json!({
            "event_type": "reaction", "repo_owner": "a", "repo_name": "b",
            "pr_number": 1, "user": "dev", "emojis": ["+1"]
        });
        let event = normalize_feedback("github", &body).unwrap();
        assert_eq!(event.feedback_type, FeedbackType::Positive);
        assert!(!event.is_actionable);
    }

    #[test]
    fn confused_emoji_is_actionable() {
        let body = json!({
            "event_type": "reaction", "repo_owner": "a", "repo_name": "b",
            "pr_number": 1, "user": "dev", "emojis": ["confused"]
        });
        let event = normalize_feedback("gitlab", &body).unwrap();
        assert_eq!(event.feedback_type, FeedbackType::Confused);
        assert!(event.is_actionable);
    }

    #[test]
    fn no_emojis_is_neutral() {
        let body = json!({
            "event_type": "comment", "repo_owner": "a", "repo_name": "b",
            "pr_number": 1, "user": "dev"
        });
        let event = normalize_feedback("bitbucket", &body).unwrap();
        assert_eq!(event.feedback_type, FeedbackType::Neutral);
    }
}
