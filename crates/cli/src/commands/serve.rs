//! `relaydesk serve`: run the gateway.

use relaydesk_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() && config.default_provider != "ollama" {
        tracing::warn!("No API key configured; the AI responder will fall back to the apology message");
    }

    println!("RelayDesk gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Storage:   {}", config.storage.backend);
    println!("   Admin API auth: {}", if config.gateway.admin_tokens.is_empty() { "off" } else { "bearer" });

    relaydesk_gateway::start(config).await?;

    Ok(())
}
