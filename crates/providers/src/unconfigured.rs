//! Placeholder for a provider whose configuration is incomplete.
//!
//! Missing credentials are a configuration error for the provider only: the
//! rest of the relay keeps routing chat, and every AI call fails fast with
//! `ProviderError::NotConfigured`.

use async_trait::async_trait;
use relaydesk_core::error::ProviderError;
use relaydesk_core::provider::*;

pub struct UnconfiguredProvider {
    name: String,
    reason: String,
}

impl UnconfiguredProvider {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn error(&self) -> ProviderError {
        ProviderError::NotConfigured(format!("{}: {}", self.name, self.reason))
    }
}

#[async_trait]
impl relaydesk_core::Provider for UnconfiguredProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        Err(self.error())
    }

    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        Err(self.error())
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Err(self.error())
    }
}
