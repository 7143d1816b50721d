//! Provider router: selects the correct provider based on config.
//!
//! Handles provider creation and lookup by name.

use std::collections::HashMap;
use std::sync::Arc;
use relaydesk_core::provider::Provider;
use tracing::warn;
use crate::openai_compat::OpenAiCompatProvider;
use crate::unconfigured::UnconfiguredProvider;

/// Registry of named providers with one default.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// The default provider, or a placeholder that reports why it is missing.
    pub fn primary(&self) -> Arc<dyn Provider> {
        self.default().unwrap_or_else(|| {
            Arc::new(UnconfiguredProvider::new(
                self.default_provider.clone(),
                "provider is not registered",
            ))
        })
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// Build providers from configuration.
///
/// A provider without an API key (other than keyless local servers) is
/// registered as [`UnconfiguredProvider`] and a warning is logged.
pub fn build_from_config(config: &relaydesk_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone());
        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        router.register(name.clone(), make_provider(name, &base_url, api_key));
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let base_url = default_base_url(&config.default_provider);
        let provider = make_provider(&config.default_provider, &base_url, config.api_key.clone());
        router.register(config.default_provider.clone(), provider);
    }

    router
}

fn make_provider(name: &str, base_url: &str, api_key: Option<String>) -> Arc<dyn Provider> {
    match api_key {
        Some(key) if !key.is_empty() => Arc::new(OpenAiCompatProvider::new(name, base_url, key)),
        _ if is_keyless(name) => Arc::new(OpenAiCompatProvider::new(name, base_url, name)),
        _ => {
            warn!(provider = %name, "No API key configured; AI replies will use the fallback message");
            Arc::new(UnconfiguredProvider::new(name, "missing API key"))
        }
    }
}

fn is_keyless(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaydesk_config::{AppConfig, ProviderConfig};

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openai");
        let provider = Arc::new(OpenAiCompatProvider::openai("sk-test"));
        router.register("openai", provider);

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
    }

    #[test]
    fn default_provider_is_always_registered() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        let router = build_from_config(&config);
        assert_eq!(router.primary().name(), "openai");
        assert_eq!(router.list(), vec!["openai"]);
    }

    #[tokio::test]
    async fn missing_key_yields_unconfigured_provider() {
        let router = build_from_config(&AppConfig::default());
        let err = router.primary().health_check().await.unwrap_err();
        assert!(matches!(err, relaydesk_core::ProviderError::NotConfigured(_)));
    }

    #[test]
    fn per_provider_key_overrides_global() {
        let mut config = AppConfig::default();
        config.default_provider = "openrouter".into();
        config.providers.insert(
            "openrouter".into(),
            ProviderConfig {
                api_key: Some("or-key".into()),
                api_url: None,
                default_model: None,
            },
        );
        let router = build_from_config(&config);
        assert_eq!(router.primary().name(), "openrouter");
    }

    #[test]
    fn unknown_default_falls_back_to_placeholder() {
        let router = ProviderRouter::new("missing");
        assert_eq!(router.primary().name(), "missing");
    }

    #[test]
    fn well_known_base_urls() {
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("11434"));
    }
}
