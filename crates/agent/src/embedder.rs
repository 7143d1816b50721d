//! Embedding client shared by ingestion and retrieval.

use relaydesk_core::error::ProviderError;
use relaydesk_core::provider::{EmbeddingRequest, Provider};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::within;

/// Wraps a [`Provider`] with the configured embedding model and dimension.
///
/// Every vector coming back is checked against `dimensions` so a model swap
/// cannot silently write vectors of the wrong shape into a namespace.
pub struct Embedder {
    provider: Arc<dyn Provider>,
    model: String,
    dimensions: usize,
    timeout: Option<Duration>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            dimensions,
            timeout: None,
        }
    }

    /// Bound every embedding call by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::InvalidResponse("empty embedding response".into()))
    }

    /// Embed `texts` in one request, preserving input order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: self.model.clone(),
            inputs: texts.to_vec(),
        };
        let response = within(self.timeout, self.provider.embed(request))
            .await
            .ok_or_else(|| ProviderError::Timeout(format!("embedding {} texts", texts.len())))??;

        if response.embeddings.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        if let Some(bad) = response.embeddings.iter().find(|v| v.len() != self.dimensions) {
            return Err(ProviderError::InvalidResponse(format!(
                "embedding dimension {} does not match configured {}",
                bad.len(),
                self.dimensions
            )));
        }

        debug!(count = texts.len(), model = %self.model, "Embedded batch");
        Ok(response.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    #[tokio::test]
    async fn embeds_in_input_order() {
        let provider = Arc::new(ScriptedProvider::new(16));
        let embedder = Embedder::new(provider.clone(), "embed-test", 16);
        let vectors = embedder
            .embed_batch(&["opening hours".into(), "refund policy".into()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_ne!(vectors[0], vectors[1]);
        assert_eq!(provider.embed_calls(), 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_invalid_response() {
        let embedder = Embedder::new(Arc::new(ScriptedProvider::new(8)), "embed-test", 16);
        let err = embedder.embed_one("hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn empty_batch_skips_provider() {
        let provider = Arc::new(ScriptedProvider::new(16));
        let embedder = Embedder::new(provider.clone(), "embed-test", 16);
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
        assert_eq!(provider.embed_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let provider = Arc::new(ScriptedProvider::new(16).with_delay(Duration::from_secs(60)));
        let embedder =
            Embedder::new(provider, "embed-test", 16).with_timeout(Some(Duration::from_secs(5)));
        let err = embedder.embed_one("hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }
}
