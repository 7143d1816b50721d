//! Shared application state and storage wiring.

use relaydesk_agent::{
    AiTakeover, Embedder, IngestPipeline, KnowledgeEntries, Responder, ResponderSettings,
};
use relaydesk_config::{AppConfig, StorageConfig};
use relaydesk_core::error::MemoryError;
use relaydesk_core::knowledge::KnowledgeStore;
use relaydesk_core::provider::Provider;
use relaydesk_core::store::{AiStateStore, ConversationStore, KnowledgeEntryStore, OwnerSettingsStore};
use relaydesk_memory::{InMemoryKnowledgeStore, InMemoryStore, SqliteKnowledgeStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::hub::ChatHub;
use crate::session::SessionRouter;

/// Every durable store the gateway needs.
#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub ai_state: Arc<dyn AiStateStore>,
    pub owner_settings: Arc<dyn OwnerSettingsStore>,
    pub entries: Arc<dyn KnowledgeEntryStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
}

impl Stores {
    /// Volatile stores; everything is lost on exit.
    pub fn in_memory() -> Self {
        Self::from_in_memory(InMemoryStore::new())
    }

    /// Volatile stores sharing an existing [`InMemoryStore`].
    pub fn from_in_memory(store: InMemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            conversations: store.clone(),
            ai_state: store.clone(),
            owner_settings: store.clone(),
            entries: store,
            knowledge: Arc::new(InMemoryKnowledgeStore::new()),
        }
    }

    /// One SQLite database for all stores, including the vector index.
    pub async fn sqlite(url: &str) -> Result<Self, MemoryError> {
        let store = SqliteStore::new(url).await?;
        let knowledge = SqliteKnowledgeStore::from_pool(store.pool());
        let store = Arc::new(store);
        Ok(Self {
            conversations: store.clone(),
            ai_state: store.clone(),
            owner_settings: store.clone(),
            entries: store,
            knowledge: Arc::new(knowledge),
        })
    }

    /// Open the backend named in `[storage]`.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, MemoryError> {
        match config.backend.as_str() {
            "memory" => {
                info!("Using in-memory storage");
                Ok(Self::in_memory())
            }
            _ => {
                let path = config.database_path();
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| MemoryError::Storage(format!("Cannot create {}: {e}", parent.display())))?;
                }
                Self::sqlite(&format!("sqlite://{}", path.display())).await
            }
        }
    }
}

/// Everything handlers and sockets share.
pub struct AppState {
    pub config: AppConfig,
    pub hub: Arc<ChatHub>,
    pub sessions: Arc<SessionRouter>,
    pub conversations: Arc<dyn ConversationStore>,
    pub owner_settings: Arc<dyn OwnerSettingsStore>,
    pub pipeline: Arc<IngestPipeline>,
    pub entries: Arc<KnowledgeEntries>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig, provider: Arc<dyn Provider>, stores: Stores) -> SharedState {
        let timeout = config.retrieval.timeout_secs.map(Duration::from_secs);
        let embedder = Arc::new(
            Embedder::new(provider.clone(), config.embedding.model.clone(), config.embedding.dimensions)
                .with_timeout(timeout),
        );
        let pipeline = Arc::new(IngestPipeline::new(embedder.clone(), stores.knowledge.clone(), &config.ingest));
        let entries = Arc::new(KnowledgeEntries::new(stores.entries.clone(), pipeline.clone()));
        let responder = Arc::new(Responder::new(
            provider,
            embedder,
            stores.knowledge.clone(),
            stores.owner_settings.clone(),
            ResponderSettings::from_config(&config),
        ));

        let sessions = Arc::new(SessionRouter::new(stores.conversations.clone(), config.gateway.outbound_buffer));
        let hub = Arc::new(ChatHub::new(
            sessions.clone(),
            stores.conversations.clone(),
            AiTakeover::new(stores.ai_state.clone()),
            responder,
            config.retrieval.history_turns,
            config.persona.fallback_message.clone(),
        ));

        Arc::new(Self {
            config,
            hub,
            sessions,
            conversations: stores.conversations,
            owner_settings: stores.owner_settings,
            pipeline,
            entries,
        })
    }
}
