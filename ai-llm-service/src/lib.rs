//! Shared LLM service: Ollama/OpenAI provider clients, a unified error
//! taxonomy, health checks, and the fast/slow/embedding profile cache that
//! `review-core`'s [`model_router`](../review_core/model_router/index.html)
//! adapts into a `ModelClient`.

pub mod config;
pub mod error_handler;
pub mod health_service;
pub mod llm;
pub mod service_profiles;
pub mod services;
pub mod telemetry;
