//! `relaydesk ingest`: load a document into an owner's knowledge base.

use relaydesk_agent::content_type_for_path;
use relaydesk_config::AppConfig;
use relaydesk_core::identity::OwnerId;
use relaydesk_gateway::{AppState, Stores};
use std::path::PathBuf;

pub async fn run(owner: String, file: PathBuf, content_type: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let content_type = match content_type {
        Some(ct) => ct,
        None => content_type_for_path(&file)
            .ok_or_else(|| format!("Cannot tell the type of {}; pass --content-type", file.display()))?
            .to_string(),
    };
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    let bytes = tokio::fs::read(&file).await?;

    let provider = relaydesk_providers::router::build_from_config(&config).primary();
    let stores = Stores::from_config(&config.storage).await?;
    let state = AppState::new(config, provider, stores);

    let owner = OwnerId::from(owner);
    let report = state
        .pipeline
        .ingest_document(&owner, &file_name, &content_type, &bytes)
        .await?;
    let stats = state.pipeline.stats(&owner).await?;

    println!(
        "Stored {} chunk(s) from {file_name} in {} ({} total)",
        report.chunks_stored, report.collection, stats.count
    );
    tracing::debug!(report = %serde_json::to_string(&report)?, "Ingest finished");

    Ok(())
}
