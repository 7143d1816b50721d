//! # RelayDesk Core
//!
//! Domain types, traits, and error definitions for the RelayDesk chat relay.
//! This crate has **zero framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (completion/embedding provider, knowledge
//! index, durable stores) is a trait here. Implementations live in their
//! respective crates, so the routing and takeover logic can be exercised
//! against in-memory stand-ins.

pub mod error;
pub mod identity;
pub mod message;
pub mod conversation;
pub mod provider;
pub mod knowledge;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result, RoutingError};
pub use identity::{OwnerId, UserId};
pub use message::{Message, Role};
pub use conversation::{ChatMessage, ContactInfo, Conversation, ConversationSummary, Origin, SourceRef};
pub use provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse};
pub use knowledge::{KnowledgeRecord, KnowledgeStore, NamespaceStats, ScoredRecord, SourceType, namespace_for};
pub use store::{
    AiState, AiStateStore, ConversationStore, EntryKind, KnowledgeEntry, KnowledgeEntryStore,
    OwnerSettings, OwnerSettingsStore,
};
