//! `relaydesk doctor`: diagnose configuration and storage.

use relaydesk_config::AppConfig;
use relaydesk_gateway::Stores;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("RelayDesk doctor");
    println!("================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file; defaults in use (run `relaydesk onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  1 blocking issue found.");
            return Ok(());
        }
    };

    if config.has_api_key() || config.default_provider == "ollama" {
        println!("  ✅ Provider '{}' has credentials", config.default_provider);
    } else {
        println!("  ⚠️  No API key for '{}'", config.default_provider);
        issues += 1;
    }

    match Stores::from_config(&config.storage).await {
        Ok(_) if config.storage.backend == "memory" => println!("  ⚠️  In-memory storage; nothing survives a restart"),
        Ok(_) => println!("  ✅ Database opens: {}", config.storage.database_path().display()),
        Err(e) => {
            println!("  ❌ Storage unavailable: {e}");
            issues += 1;
        }
    }

    if config.gateway.admin_tokens.is_empty() {
        println!("  ⚠️  Admin API has no bearer tokens");
        issues += 1;
    }
    if config.gateway.owner_tokens.is_empty() {
        println!("  ⚠️  No owner tokens; owners must connect with a plain ownerId");
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
