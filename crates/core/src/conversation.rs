//! Conversation domain types.
//!
//! A conversation is the durable, append-only log of everything said between
//! one end user and the business side (the human owner or the AI answering on
//! the owner's behalf). It is keyed by [`UserId`] and never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{OwnerId, UserId};
use crate::knowledge::SourceType;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Owner,
    Ai,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Owner => "owner",
            Self::Ai => "ai",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "owner" => Some(Self::Owner),
            "ai" => Some(Self::Ai),
            _ => None,
        }
    }
}

/// A knowledge source cited by an AI reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub file_name: String,
    pub source_type: SourceType,
    pub relevance_score: f32,
}

/// One immutable entry in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub origin: Origin,
    pub text: String,
    pub timestamp: DateTime<Utc>,

    /// Set on owner-authored messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OwnerId>,

    /// Set on AI messages: whether retrieved knowledge grounded the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_used: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,

    /// Set on AI messages produced by the context-free fallback path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<bool>,
}

impl ChatMessage {
    fn base(origin: Origin, text: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            origin,
            text,
            timestamp: Utc::now(),
            owner_id: None,
            context_used: None,
            sources: Vec::new(),
            degraded: None,
        }
    }

    /// A message typed by the end user.
    pub fn user(text: impl Into<String>) -> Self {
        Self::base(Origin::User, text.into())
    }

    /// A message typed by a human owner.
    pub fn owner(owner_id: OwnerId, text: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Self::base(Origin::Owner, text.into())
        }
    }

    /// A message generated by the AI responder.
    pub fn ai(text: impl Into<String>, context_used: bool, sources: Vec<SourceRef>, degraded: bool) -> Self {
        Self {
            context_used: Some(context_used),
            sources,
            degraded: degraded.then_some(true),
            ..Self::base(Origin::Ai, text.into())
        }
    }
}

/// Contact details a user may volunteer during a chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ContactInfo {
    /// Overwrite fields that are present in `update`, keep the rest.
    pub fn merge(&mut self, update: &ContactInfo) {
        if update.username.is_some() {
            self.username.clone_from(&update.username);
        }
        if update.email.is_some() {
            self.email.clone_from(&update.email);
        }
        if update.phone.is_some() {
            self.phone.clone_from(&update.phone);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

/// The full conversation record for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub user_id: UserId,

    /// The owner this user is assigned to (sticky once set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OwnerId>,

    #[serde(default)]
    pub contact: ContactInfo,

    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,

    /// Messages in append order.
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            owner_id: None,
            contact: ContactInfo::default(),
            created_at: now,
            last_seen: now,
            messages: Vec::new(),
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            user_id: self.user_id.clone(),
            owner_id: self.owner_id.clone(),
            contact: self.contact.clone(),
            last_seen: self.last_seen,
            message_count: self.messages.len(),
            last_message: self.messages.last().map(|m| m.text.clone()),
        }
    }
}

/// Lightweight listing row for the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OwnerId>,
    pub contact: ContactInfo,
    pub last_seen: DateTime<Utc>,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}
