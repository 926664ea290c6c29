//! `/feedback/{provider}` — emoji-reaction and review-outcome ingress.
//!
//! Mirrors `routes::webhooks` (same verify → normalize → hand-off shape),
//! handing normalized events to the no-op `LoggingFeedbackSink` rather than
//! the job queue, since the feedback-learning pipeline is out of scope.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use review_core::capabilities::FeedbackSink;
use tracing::{info, instrument};

use crate::core::{
    app_state::AppState,
    http::response_envelope::{ApiErrorDetail, ApiResponse},
};
use crate::webhooks::feedback::normalize_feedback;
use crate::webhooks::verify::{verify_signature, WebhookProvider};

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn webhook_provider(provider: &str) -> Option<WebhookProvider> {
    match provider {
        "github" => Some(WebhookProvider::Github),
        "gitlab" => Some(WebhookProvider::Gitlab),
        "bitbucket" => Some(WebhookProvider::Bitbucket),
        _ => None,
    }
}

fn signature_header<'a>(provider: WebhookProvider, headers: &'a HeaderMap) -> Option<&'a str> {
    match provider {
        WebhookProvider::Github => header_str(headers, "X-Hub-Signature-256"),
        WebhookProvider::Gitlab => header_str(headers, "X-Gitlab-Signature"),
        WebhookProvider::Bitbucket => header_str(headers, "X-Bitbucket-Secret"),
    }
}

fn secret_for<'a>(state: &'a AppState, provider: WebhookProvider) -> Option<&'a str> {
    match provider {
        WebhookProvider::Github => state.secrets.github.as_deref(),
        WebhookProvider::Gitlab => state.secrets.gitlab.as_deref(),
        WebhookProvider::Bitbucket => state.secrets.bitbucket.as_deref(),
    }
}

#[instrument(name = "feedback_ingest", skip(state, headers, body))]
pub async fn feedback_webhook(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(wp) = webhook_provider(&provider) else {
        return ApiResponse::<()>::error("UNKNOWN_PROVIDER", format!("unknown provider: {provider}"), Vec::new())
            .into_response_with_status(StatusCode::BAD_REQUEST);
    };

    let sig = signature_header(wp, &headers);
    if !verify_signature(wp, secret_for(&state, wp), sig, &body) {
        return ApiResponse::<()>::error("INVALID_SIGNATURE", "webhook signature verification failed", Vec::new())
            .into_response_with_status(StatusCode::UNAUTHORIZED);
    }

    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            let details = vec![ApiErrorDetail {
                path: Some("body".into()),
                hint: Some(e.to_string()),
            }];
            return ApiResponse::<()>::error("MALFORMED_PAYLOAD", "could not parse feedback payload", details)
                .into_response_with_status(StatusCode::BAD_REQUEST);
        }
    };

    let Some(event) = normalize_feedback(&provider, &value) else {
        return ApiResponse::success(serde_json::json!({ "status": "ignored" }))
            .into_response_with_status(StatusCode::OK);
    };

    let event_id = event.id.clone();
    // `LoggingFeedbackSink::Error = Infallible`; any real sink's errors
    // would need mapping to a 500 here, same as `routes::webhooks::accept`.
    let _ = state.feedback_sink.record(event).await;
    info!(feedback.id = %event_id, "feedback event accepted");

    ApiResponse::success(serde_json::json!({ "feedback_id": event_id }))
        .into_response_with_status(StatusCode::ACCEPTED)
}
