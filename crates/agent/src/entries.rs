//! Owner-authored Q&A and product entries.
//!
//! The entry store is the source of truth. Each write re-embeds the entry
//! and upserts it into the vector index as record `entry:<id>`; each delete
//! removes that record. Index failures are reported on the result, never
//! rolled back into the entry store.

use chrono::Utc;
use relaydesk_core::error::MemoryError;
use relaydesk_core::identity::OwnerId;
use relaydesk_core::store::{EntryKind, KnowledgeEntry, KnowledgeEntryStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::ingest::{IngestMetadata, IngestPipeline};

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("Invalid entry: {0}")]
    Invalid(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Client-supplied fields of an entry.
///
/// Accepts `question`/`answer` for Q&A and `name`/`description` for
/// products as aliases of `title`/`body`.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryDraft {
    #[serde(alias = "question", alias = "name")]
    pub title: String,
    #[serde(alias = "answer", alias = "description")]
    pub body: String,
}

impl EntryDraft {
    fn validate(&self) -> Result<(), EntryError> {
        if self.title.trim().is_empty() {
            return Err(EntryError::Invalid("title must not be empty".into()));
        }
        if self.body.trim().is_empty() {
            return Err(EntryError::Invalid("body must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryWrite {
    pub entry: KnowledgeEntry,
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDeletion {
    pub id: String,
    pub unindexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_error: Option<String>,
}

pub struct KnowledgeEntries {
    store: Arc<dyn KnowledgeEntryStore>,
    pipeline: Arc<IngestPipeline>,
}

impl KnowledgeEntries {
    pub fn new(store: Arc<dyn KnowledgeEntryStore>, pipeline: Arc<IngestPipeline>) -> Self {
        Self { store, pipeline }
    }

    pub async fn list(&self, owner: &OwnerId, kind: EntryKind) -> Result<Vec<KnowledgeEntry>, EntryError> {
        Ok(self.store.list_entries(owner, kind).await?)
    }

    pub async fn create(&self, owner: &OwnerId, kind: EntryKind, draft: EntryDraft) -> Result<EntryWrite, EntryError> {
        draft.validate()?;
        let now = Utc::now();
        let entry = KnowledgeEntry {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.clone(),
            kind,
            title: draft.title.trim().to_string(),
            body: draft.body.trim().to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store.put_entry(entry.clone()).await?;
        Ok(self.index(entry).await)
    }

    pub async fn update(
        &self,
        owner: &OwnerId,
        kind: EntryKind,
        id: &str,
        draft: EntryDraft,
    ) -> Result<EntryWrite, EntryError> {
        draft.validate()?;
        let existing = self.find(owner, kind, id).await?;
        let entry = KnowledgeEntry {
            title: draft.title.trim().to_string(),
            body: draft.body.trim().to_string(),
            updated_at: Utc::now(),
            ..existing
        };
        self.store.put_entry(entry.clone()).await?;
        Ok(self.index(entry).await)
    }

    pub async fn delete(&self, owner: &OwnerId, kind: EntryKind, id: &str) -> Result<EntryDeletion, EntryError> {
        let entry = self.find(owner, kind, id).await?;
        self.store.delete_entry(owner, id).await?;

        let (unindexed, index_error) = match self.pipeline.remove_entry(owner, &entry.record_id()).await {
            Ok(_) => (true, None),
            Err(e) => {
                warn!(owner_id = %owner, entry_id = id, error = %e, "Could not remove entry from index");
                (false, Some(e.to_string()))
            }
        };
        Ok(EntryDeletion {
            id: entry.id,
            unindexed,
            index_error,
        })
    }

    /// Entry `id` of `kind`, or `NotFound` (also for the wrong kind).
    async fn find(&self, owner: &OwnerId, kind: EntryKind, id: &str) -> Result<KnowledgeEntry, EntryError> {
        self.store
            .get_entry(owner, id)
            .await?
            .filter(|e| e.kind == kind)
            .ok_or_else(|| EntryError::NotFound(id.to_string()))
    }

    async fn index(&self, entry: KnowledgeEntry) -> EntryWrite {
        let metadata = IngestMetadata {
            file_name: entry.title.clone(),
            source_type: entry.kind.source_type(),
        };
        match self
            .pipeline
            .index_entry(&entry.owner_id, &entry.record_id(), &entry.index_text(), metadata)
            .await
        {
            Ok(()) => EntryWrite {
                entry,
                indexed: true,
                index_error: None,
            },
            Err(e) => {
                warn!(owner_id = %entry.owner_id, entry_id = %entry.id, error = %e, "Entry saved but not indexed");
                EntryWrite {
                    entry,
                    indexed: false,
                    index_error: Some(e.to_string()),
                }
            }
        }
    }
}
