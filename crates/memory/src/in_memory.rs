//! In-memory store: useful for testing and ephemeral deployments.
//!
//! Implements every durable store trait over plain maps guarded by
//! `tokio::sync::RwLock`. Each write takes the lock once, so an append is
//! atomic with respect to other appends for the same user.

use async_trait::async_trait;
use chrono::Utc;
use relaydesk_core::conversation::{ChatMessage, ContactInfo, Conversation, ConversationSummary};
use relaydesk_core::error::MemoryError;
use relaydesk_core::identity::{OwnerId, UserId};
use relaydesk_core::store::{
    AiState, AiStateStore, ConversationStore, EntryKind, KnowledgeEntry, KnowledgeEntryStore,
    OwnerSettings, OwnerSettingsStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Durable-store stand-in that keeps everything in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    conversations: Arc<RwLock<HashMap<UserId, Conversation>>>,
    ai_states: Arc<RwLock<HashMap<UserId, AiState>>>,
    settings: Arc<RwLock<HashMap<OwnerId, OwnerSettings>>>,
    entries: Arc<RwLock<Vec<KnowledgeEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(
        &self,
        user: &UserId,
        owner_hint: Option<&OwnerId>,
        message: ChatMessage,
    ) -> Result<(), MemoryError> {
        let mut conversations = self.conversations.write().await;
        let conv = conversations
            .entry(user.clone())
            .or_insert_with(|| Conversation::new(user.clone()));
        if conv.owner_id.is_none() {
            conv.owner_id = owner_hint.cloned();
        }
        conv.last_seen = Utc::now();
        conv.messages.push(message);
        Ok(())
    }

    async fn get(&self, user: &UserId) -> Result<Option<Conversation>, MemoryError> {
        Ok(self.conversations.read().await.get(user).cloned())
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, MemoryError> {
        let conversations = self.conversations.read().await;
        let mut summaries: Vec<_> = conversations.values().map(Conversation::summary).collect();
        summaries.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(summaries)
    }

    async fn recent_messages(&self, user: &UserId, limit: usize) -> Result<Vec<ChatMessage>, MemoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(user)
            .map(|c| {
                let start = c.messages.len().saturating_sub(limit);
                c.messages[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn owner_of(&self, user: &UserId) -> Result<Option<OwnerId>, MemoryError> {
        Ok(self
            .conversations
            .read()
            .await
            .get(user)
            .and_then(|c| c.owner_id.clone()))
    }

    async fn assign_owner(&self, user: &UserId, owner: &OwnerId) -> Result<(), MemoryError> {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(user.clone())
            .or_insert_with(|| Conversation::new(user.clone()))
            .owner_id = Some(owner.clone());
        Ok(())
    }

    async fn update_contact(&self, user: &UserId, contact: &ContactInfo) -> Result<ContactInfo, MemoryError> {
        let mut conversations = self.conversations.write().await;
        let conv = conversations
            .entry(user.clone())
            .or_insert_with(|| Conversation::new(user.clone()));
        conv.contact.merge(contact);
        Ok(conv.contact.clone())
    }

    async fn touch(&self, user: &UserId) -> Result<(), MemoryError> {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(user.clone())
            .or_insert_with(|| Conversation::new(user.clone()))
            .last_seen = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl AiStateStore for InMemoryStore {
    async fn get_ai_state(&self, user: &UserId) -> Result<Option<AiState>, MemoryError> {
        Ok(self.ai_states.read().await.get(user).cloned())
    }

    async fn set_ai_state(&self, state: AiState) -> Result<(), MemoryError> {
        self.ai_states.write().await.insert(state.user_id.clone(), state);
        Ok(())
    }
}

#[async_trait]
impl OwnerSettingsStore for InMemoryStore {
    async fn get_settings(&self, owner: &OwnerId) -> Result<Option<OwnerSettings>, MemoryError> {
        Ok(self.settings.read().await.get(owner).cloned())
    }

    async fn set_website(&self, owner: &OwnerId, url: Option<String>) -> Result<OwnerSettings, MemoryError> {
        let settings = OwnerSettings {
            owner_id: owner.clone(),
            website_url: url,
        };
        self.settings.write().await.insert(owner.clone(), settings.clone());
        Ok(settings)
    }
}

#[async_trait]
impl KnowledgeEntryStore for InMemoryStore {
    async fn list_entries(&self, owner: &OwnerId, kind: EntryKind) -> Result<Vec<KnowledgeEntry>, MemoryError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| &e.owner_id == owner && e.kind == kind)
            .cloned()
            .collect())
    }

    async fn get_entry(&self, owner: &OwnerId, id: &str) -> Result<Option<KnowledgeEntry>, MemoryError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .find(|e| &e.owner_id == owner && e.id == id)
            .cloned())
    }

    async fn put_entry(&self, entry: KnowledgeEntry) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    async fn delete_entry(&self, owner: &OwnerId, id: &str) -> Result<bool, MemoryError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| !(&e.owner_id == owner && e.id == id));
        Ok(entries.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_append_creates_conversation_with_owner() {
        let store = InMemoryStore::new();
        let user = UserId::from("u-1");
        store
            .append(&user, Some(&OwnerId::from("acme")), ChatMessage::user("hi"))
            .await
            .unwrap();

        let conv = store.get(&user).await.unwrap().unwrap();
        assert_eq!(conv.owner_id, Some(OwnerId::from("acme")));
        assert_eq!(conv.messages.len(), 1);
    }

    #[tokio::test]
    async fn owner_hint_does_not_overwrite_existing_owner() {
        let store = InMemoryStore::new();
        let user = UserId::from("u-1");
        store.assign_owner(&user, &OwnerId::from("acme")).await.unwrap();
        store
            .append(&user, Some(&OwnerId::from("globex")), ChatMessage::user("hi"))
            .await
            .unwrap();
        assert_eq!(store.owner_of(&user).await.unwrap(), Some(OwnerId::from("acme")));
    }

    #[tokio::test]
    async fn appends_preserve_arrival_order() {
        let store = InMemoryStore::new();
        let user = UserId::from("u-1");
        for i in 0..25 {
            store.append(&user, None, ChatMessage::user(format!("m{i}"))).await.unwrap();
        }
        let conv = store.get(&user).await.unwrap().unwrap();
        let texts: Vec<_> = conv.messages.iter().map(|m| m.text.clone()).collect();
        let expected: Vec<_> = (0..25).map(|i| format!("m{i}")).collect();
        assert_eq!(texts, expected);

        let recent = store.recent_messages(&user, 3).await.unwrap();
        let recent: Vec<_> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(recent, vec!["m22", "m23", "m24"]);
    }

    #[tokio::test]
    async fn ai_state_is_last_write_wins() {
        let store = InMemoryStore::new();
        let user = UserId::from("u-1");
        assert!(store.get_ai_state(&user).await.unwrap().is_none());
        store.set_ai_state(AiState::new(user.clone(), false)).await.unwrap();
        store.set_ai_state(AiState::new(user.clone(), true)).await.unwrap();
        assert!(store.get_ai_state(&user).await.unwrap().unwrap().ai_active);
    }

    #[tokio::test]
    async fn entries_are_scoped_by_owner() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .put_entry(KnowledgeEntry {
                id: "e1".into(),
                owner_id: OwnerId::from("acme"),
                kind: EntryKind::Qa,
                title: "Q".into(),
                body: "A".into(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let other = OwnerId::from("globex");
        assert!(store.get_entry(&other, "e1").await.unwrap().is_none());
        assert!(!store.delete_entry(&other, "e1").await.unwrap());
        assert_eq!(store.list_entries(&OwnerId::from("acme"), EntryKind::Qa).await.unwrap().len(), 1);
        assert!(store.list_entries(&OwnerId::from("acme"), EntryKind::Product).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn contact_updates_merge() {
        let store = InMemoryStore::new();
        let user = UserId::from("u-1");
        store
            .update_contact(&user, &ContactInfo { username: Some("ana".into()), ..Default::default() })
            .await
            .unwrap();
        let merged = store
            .update_contact(&user, &ContactInfo { email: Some("a@x.io".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(merged.username.as_deref(), Some("ana"));
        assert_eq!(merged.email.as_deref(), Some("a@x.io"));
    }
}
