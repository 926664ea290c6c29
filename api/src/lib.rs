//! HTTP ingress (SPEC_FULL.md C10): verifies and normalizes provider
//! webhooks, then hands accepted review requests to the job queue (C9) and
//! feedback events to the feedback sink. The review workflow itself (C1-C8)
//! runs out-of-process in the worker binary; this crate never touches it.

pub mod core;
pub mod error_handler;
pub mod routes;
pub mod webhooks;

use std::env;
use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use tracing::info;

use crate::core::app_state::AppState;
use crate::error_handler::AppError;

fn bind_addr() -> String {
    let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("API_PORT").unwrap_or_else(|_| "8080".to_string());
    format!("{host}:{port}")
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhooks/github", post(routes::webhooks::github_webhook))
        .route("/webhooks/gitlab", post(routes::webhooks::gitlab_webhook))
        .route("/webhooks/bitbucket", post(routes::webhooks::bitbucket_webhook))
        .route("/feedback/{provider}", post(routes::feedback::feedback_webhook))
        .with_state(state)
}

/// Builds the shared state, binds the listener and serves until shutdown.
pub async fn start() -> Result<(), AppError> {
    let state = Arc::new(AppState::from_env().await?);
    let app = router(state);

    let addr = bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(AppError::Bind)?;

    info!(%addr, "api: listening");
    axum::serve(listener, app).await.map_err(AppError::Server)?;

    Ok(())
}
