//! Concrete [`model_router::ModelClient`] backed by `ai-llm-service`'s
//! cached fast/slow/embedding profiles.
//!
//! `ai-llm-service` exposes two text-generation profiles (`fast`, `slow`);
//! this crate's routing table has three (`Fast`, `Balanced`, `HighQuality`).
//! `Balanced` and `HighQuality` both map onto the `slow` profile — the
//! distinction between them lives entirely in `tier_profile`'s max_tokens
//! and temperature, which this adapter does not currently forward (see
//! below), not in which underlying service answers the call.

use ai_llm_service::error_handler::AiLlmError;
use ai_llm_service::service_profiles::LlmServiceProfiles;

use crate::model_router::{ModelClient, ModelTier};

/// Wraps a shared [`LlmServiceProfiles`] as a [`ModelClient`].
pub struct LlmServiceModelClient<'a> {
    profiles: &'a LlmServiceProfiles,
}

impl<'a> LlmServiceModelClient<'a> {
    pub fn new(profiles: &'a LlmServiceProfiles) -> Self {
        Self { profiles }
    }
}

impl ModelClient for LlmServiceModelClient<'_> {
    type Error = AiLlmError;

    async fn complete(&self, tier: ModelTier, prompt: &str) -> Result<String, Self::Error> {
        match tier {
            ModelTier::Fast => self.profiles.generate_fast(prompt, None).await,
            ModelTier::Balanced | ModelTier::HighQuality => {
                self.profiles.generate_slow(prompt, None).await
            }
        }
    }
}

/// Bridges [`AiLlmError`] into this crate's error taxonomy for
/// `model_router::route`'s retry classification. Mirrors
/// `Error::from(reqwest::Error)`'s timeout/429/5xx classification since
/// `AiLlmError::HttpTransport` wraps exactly that; everything else becomes
/// `Error::ProviderFail`.
pub fn map_ai_llm_error(err: &AiLlmError) -> crate::errors::Error {
    match err {
        AiLlmError::HttpTransport(e) => {
            if e.is_timeout() {
                return crate::errors::Error::Transport(format!("timeout: {e}"));
            }
            match e.status().map(|s| s.as_u16()) {
                Some(429) => crate::errors::Error::RateLimit {
                    retry_after_secs: None,
                },
                Some(code @ 500..=599) => crate::errors::Error::Transport(format!("server error {code}")),
                Some(code) => crate::errors::Error::Transport(format!("http status {code}")),
                None => crate::errors::Error::Transport(e.to_string()),
            }
        }
        other => crate::errors::Error::ProviderFail(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_llm_service::error_handler::{Provider, ProviderError, ProviderErrorKind};

    #[test]
    fn non_transport_errors_become_provider_fail() {
        let err = AiLlmError::Provider(ProviderError::new(
            Provider::OpenAI,
            ProviderErrorKind::MissingApiKey,
        ));
        assert!(matches!(
            map_ai_llm_error(&err),
            crate::errors::Error::ProviderFail(_)
        ));
    }
}
