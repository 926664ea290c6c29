//! Convenience re-exports of the most commonly used config types, so
//! callers can `use ai_llm_service::llm::{LlmModelConfig, LlmProvider};`
//! instead of reaching into `config::llm_model_config`/`config::llm_provider`.

pub use crate::config::llm_model_config::LlmModelConfig;
pub use crate::config::llm_provider::LlmProvider;
