//! `/webhooks/{github,gitlab,bitbucket}` — review-request ingress.
//!
//! Handler shape (`Arc<AppState>`, `#[instrument]`, `HeaderMap`, raw body
//! bytes, `ApiResponse` envelope) is grounded on the teacher's
//! `check_mr/trigger_mr_route.rs`. Response codes follow SPEC_FULL.md §6:
//! 202 accepted, 200 ignored, 401 unauthorized on bad signature, 400 on a
//! malformed body (PARSE, §7), 500 on a queue-publish failure.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use job_runtime::publish_review_request;
use review_core::types::PrEvent;
use tracing::{info, instrument, warn};

use crate::core::{
    app_state::AppState,
    http::response_envelope::{ApiErrorDetail, ApiResponse},
};
use crate::webhooks::normalize::{normalize_bitbucket, normalize_github, normalize_gitlab};
use crate::webhooks::verify::{verify_signature, WebhookProvider};

/// Default review-request priority assigned at ingress. SPEC_FULL.md
/// leaves priority assignment at webhook-ingest time unspecified beyond the
/// field's existence (§3's `Job.priority`, 1 = highest .. 10 = lowest); `5`
/// (mid-scale) is this service's chosen default until a prioritization
/// policy is layered on top.
const DEFAULT_PRIORITY: u8 = 5;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn accept(state: &AppState, event: PrEvent) -> Response {
    match publish_review_request(state.broker.as_ref(), &state.review_topic, event, DEFAULT_PRIORITY).await {
        Ok(message_id) => {
            info!(%message_id, "webhook: review request enqueued");
            ApiResponse::success(serde_json::json!({ "message_id": message_id }))
                .into_response_with_status(StatusCode::ACCEPTED)
        }
        Err(e) => {
            warn!(error = %e, "webhook: failed to publish review request");
            ApiResponse::<()>::error("QUEUE_PUBLISH_FAILED", e.to_string(), Vec::new())
                .into_response_with_status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn ignored() -> Response {
    ApiResponse::success(serde_json::json!({ "status": "ignored" }))
        .into_response_with_status(StatusCode::OK)
}

fn unauthorized() -> Response {
    ApiResponse::<()>::error("INVALID_SIGNATURE", "webhook signature verification failed", Vec::new())
        .into_response_with_status(StatusCode::UNAUTHORIZED)
}

fn bad_request(detail: impl Into<String>) -> Response {
    let details = vec![ApiErrorDetail {
        path: Some("body".into()),
        hint: Some(detail.into()),
    }];
    ApiResponse::<()>::error("MALFORMED_PAYLOAD", "could not parse webhook payload", details)
        .into_response_with_status(StatusCode::BAD_REQUEST)
}

#[instrument(name = "webhook_github", skip(state, headers, body))]
pub async fn github_webhook(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let sig = header_str(&headers, "X-Hub-Signature-256");
    if !verify_signature(WebhookProvider::Github, state.secrets.github.as_deref(), sig, &body) {
        return unauthorized();
    }

    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return bad_request(e.to_string()),
    };

    match normalize_github(&value) {
        Some(event) => accept(&state, event).await,
        None => ignored(),
    }
}

#[instrument(name = "webhook_gitlab", skip(state, headers, body))]
pub async fn gitlab_webhook(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let sig = header_str(&headers, "X-Gitlab-Signature");
    if !verify_signature(WebhookProvider::Gitlab, state.secrets.gitlab.as_deref(), sig, &body) {
        return unauthorized();
    }

    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return bad_request(e.to_string()),
    };

    match normalize_gitlab(&value) {
        Some(event) => accept(&state, event).await,
        None => ignored(),
    }
}

#[instrument(name = "webhook_bitbucket", skip(state, headers, body))]
pub async fn bitbucket_webhook(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let secret_header = header_str(&headers, "X-Bitbucket-Secret");
    if !verify_signature(WebhookProvider::Bitbucket, state.secrets.bitbucket.as_deref(), secret_header, &body) {
        return unauthorized();
    }

    let event_key = header_str(&headers, "X-Event-Key").unwrap_or_default().to_string();

    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return bad_request(e.to_string()),
    };

    match normalize_bitbucket(&event_key, &value) {
        Some(event) => accept(&state, event).await,
        None => ignored(),
    }
}
