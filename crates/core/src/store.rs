//! Durable store traits: conversations, AI takeover state, owner settings and
//! owner-authored knowledge entries.
//!
//! Implementations: in-memory (for testing), SQLite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::{ChatMessage, ContactInfo, Conversation, ConversationSummary};
use crate::error::MemoryError;
use crate::identity::{OwnerId, UserId};
use crate::knowledge::SourceType;

/// Per-user record of who is answering: the AI or a human owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiState {
    pub user_id: UserId,
    pub ai_active: bool,
    pub last_updated: DateTime<Utc>,
}

impl AiState {
    pub fn new(user_id: UserId, ai_active: bool) -> Self {
        Self { user_id, ai_active, last_updated: Utc::now() }
    }
}

/// Per-owner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSettings {
    pub owner_id: OwnerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
}

/// Kind of a discrete knowledge entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Qa,
    Product,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qa => "qa",
            Self::Product => "product",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "qa" => Some(Self::Qa),
            "product" => Some(Self::Product),
            _ => None,
        }
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            Self::Qa => SourceType::Qa,
            Self::Product => SourceType::Product,
        }
    }
}

/// An owner-authored Q&A pair or product/service description.
///
/// For `Qa` the title is the question and the body the answer; for
/// `Product` the title is the name and the body the description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    pub id: String,
    pub owner_id: OwnerId,
    pub kind: EntryKind,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    /// Id of the vector record mirroring this entry.
    pub fn record_id(&self) -> String {
        format!("entry:{}", self.id)
    }

    /// Text that gets embedded for retrieval.
    pub fn index_text(&self) -> String {
        match self.kind {
            EntryKind::Qa => format!("Q: {}\nA: {}", self.title, self.body),
            EntryKind::Product => format!("{}: {}", self.title, self.body),
        }
    }
}

/// Append-only conversation log keyed by user.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    fn name(&self) -> &str;

    /// Append a message, creating the conversation on first contact.
    /// `owner_hint` is recorded only when the conversation has no owner yet.
    async fn append(
        &self,
        user: &UserId,
        owner_hint: Option<&OwnerId>,
        message: ChatMessage,
    ) -> Result<(), MemoryError>;

    async fn get(&self, user: &UserId) -> Result<Option<Conversation>, MemoryError>;

    /// All conversations, most recently seen first.
    async fn list(&self) -> Result<Vec<ConversationSummary>, MemoryError>;

    /// The last `limit` messages in append order.
    async fn recent_messages(&self, user: &UserId, limit: usize) -> Result<Vec<ChatMessage>, MemoryError>;

    async fn owner_of(&self, user: &UserId) -> Result<Option<OwnerId>, MemoryError>;

    /// Set (or replace) the user's owner, creating the conversation if needed.
    async fn assign_owner(&self, user: &UserId, owner: &OwnerId) -> Result<(), MemoryError>;

    /// Merge contact fields, creating the conversation if needed.
    async fn update_contact(&self, user: &UserId, contact: &ContactInfo) -> Result<ContactInfo, MemoryError>;

    /// Bump `last_seen`, creating the conversation if needed.
    async fn touch(&self, user: &UserId) -> Result<(), MemoryError>;
}

/// Last-write-wins store of [`AiState`] records.
#[async_trait]
pub trait AiStateStore: Send + Sync {
    async fn get_ai_state(&self, user: &UserId) -> Result<Option<AiState>, MemoryError>;

    async fn set_ai_state(&self, state: AiState) -> Result<(), MemoryError>;
}

#[async_trait]
pub trait OwnerSettingsStore: Send + Sync {
    async fn get_settings(&self, owner: &OwnerId) -> Result<Option<OwnerSettings>, MemoryError>;

    async fn set_website(&self, owner: &OwnerId, url: Option<String>) -> Result<OwnerSettings, MemoryError>;
}

#[async_trait]
pub trait KnowledgeEntryStore: Send + Sync {
    /// Entries of one kind, oldest first.
    async fn list_entries(&self, owner: &OwnerId, kind: EntryKind) -> Result<Vec<KnowledgeEntry>, MemoryError>;

    async fn get_entry(&self, owner: &OwnerId, id: &str) -> Result<Option<KnowledgeEntry>, MemoryError>;

    /// Insert or replace by id.
    async fn put_entry(&self, entry: KnowledgeEntry) -> Result<(), MemoryError>;

    /// Returns whether an entry was removed.
    async fn delete_entry(&self, owner: &OwnerId, id: &str) -> Result<bool, MemoryError>;
}
