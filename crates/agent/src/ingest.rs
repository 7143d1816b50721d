//! Resource ingestion: text → overlapping chunks → embeddings → owner namespace.

use chrono::Utc;
use relaydesk_config::IngestConfig;
use relaydesk_core::error::{MemoryError, ProviderError};
use relaydesk_core::identity::OwnerId;
use relaydesk_core::knowledge::{KnowledgeRecord, KnowledgeStore, NamespaceStats, SourceType, namespace_for};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunk::split_windows;
use crate::embedder::Embedder;
use crate::extract::{ExtractError, extract_text};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Nothing to ingest: input is empty")]
    EmptyInput,

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Caller-supplied metadata attached to every record of one source.
#[derive(Debug, Clone)]
pub struct IngestMetadata {
    pub file_name: String,
    pub source_type: SourceType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub chunks_stored: usize,
    /// Namespace the chunks were written to.
    pub collection: String,
}

pub struct IngestPipeline {
    embedder: Arc<Embedder>,
    knowledge: Arc<dyn KnowledgeStore>,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
}

impl IngestPipeline {
    pub fn new(embedder: Arc<Embedder>, knowledge: Arc<dyn KnowledgeStore>, config: &IngestConfig) -> Self {
        Self {
            embedder,
            knowledge,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            batch_size: config.batch_size.max(1),
        }
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeStore> {
        &self.knowledge
    }

    /// Chunk, embed and store `raw_text` for `owner`.
    ///
    /// All chunks are embedded before anything is written, so a provider
    /// failure leaves the namespace untouched.
    pub async fn ingest(
        &self,
        owner: &OwnerId,
        raw_text: &str,
        metadata: IngestMetadata,
    ) -> Result<IngestReport, IngestError> {
        if raw_text.trim().is_empty() {
            return Err(IngestError::EmptyInput);
        }

        let chunks = split_windows(raw_text, self.chunk_size, self.chunk_overlap);
        let total = chunks.len();

        let mut vectors = Vec::with_capacity(total);
        for batch in chunks.chunks(self.batch_size) {
            vectors.extend(self.embedder.embed_batch(batch).await?);
        }

        let now = Utc::now();
        let records: Vec<KnowledgeRecord> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(chunk_index, (text, vector))| KnowledgeRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                text,
                owner_id: owner.clone(),
                source_type: metadata.source_type,
                file_name: metadata.file_name.clone(),
                chunk_index,
                total_chunks: total,
                timestamp: now,
            })
            .collect();

        self.knowledge.ensure_namespace(owner, self.embedder.dimensions()).await?;
        let stored = self.knowledge.upsert(owner, records).await?;

        info!(
            owner_id = %owner,
            file = %metadata.file_name,
            chunks = stored,
            "Ingested resource"
        );
        Ok(IngestReport {
            chunks_stored: stored,
            collection: namespace_for(owner),
        })
    }

    /// Extract text from an uploaded file, then [`ingest`](Self::ingest) it.
    ///
    /// The declared content type decides the record's source type.
    pub async fn ingest_document(
        &self,
        owner: &OwnerId,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<IngestReport, IngestError> {
        let extracted = extract_text(bytes, content_type)?;
        debug!(file = %file_name, chars = extracted.text.chars().count(), "Extracted text");
        self.ingest(
            owner,
            &extracted.text,
            IngestMetadata {
                file_name: file_name.to_string(),
                source_type: extracted.source_type,
            },
        )
        .await
    }

    /// Upsert a single unchunked record under a caller-chosen id.
    pub async fn index_entry(
        &self,
        owner: &OwnerId,
        record_id: &str,
        text: &str,
        metadata: IngestMetadata,
    ) -> Result<(), IngestError> {
        if text.trim().is_empty() {
            return Err(IngestError::EmptyInput);
        }
        let vector = self.embedder.embed_one(text).await?;
        let record = KnowledgeRecord {
            id: record_id.to_string(),
            vector,
            text: text.to_string(),
            owner_id: owner.clone(),
            source_type: metadata.source_type,
            file_name: metadata.file_name,
            chunk_index: 0,
            total_chunks: 1,
            timestamp: Utc::now(),
        };
        self.knowledge.ensure_namespace(owner, self.embedder.dimensions()).await?;
        self.knowledge.upsert(owner, vec![record]).await?;
        debug!(owner_id = %owner, record_id, "Indexed knowledge entry");
        Ok(())
    }

    pub async fn remove_entry(&self, owner: &OwnerId, record_id: &str) -> Result<usize, IngestError> {
        Ok(self.knowledge.delete_records(owner, &[record_id.to_string()]).await?)
    }

    pub async fn stats(&self, owner: &OwnerId) -> Result<NamespaceStats, IngestError> {
        Ok(self.knowledge.stats(owner).await?)
    }

    /// Drop the owner's whole namespace.
    pub async fn clear(&self, owner: &OwnerId) -> Result<(), IngestError> {
        self.knowledge.delete_namespace(owner).await?;
        info!(owner_id = %owner, "Cleared knowledge base");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use relaydesk_memory::InMemoryKnowledgeStore;

    const DIMS: usize = 16;

    fn pipeline(provider: ScriptedProvider, batch_size: usize) -> (IngestPipeline, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let embedder = Arc::new(Embedder::new(provider.clone(), "embed-test", DIMS));
        let config = IngestConfig {
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size,
        };
        let store = Arc::new(InMemoryKnowledgeStore::new());
        (IngestPipeline::new(embedder, store, &config), provider)
    }

    fn meta(file: &str) -> IngestMetadata {
        IngestMetadata {
            file_name: file.into(),
            source_type: SourceType::Text,
        }
    }

    #[tokio::test]
    async fn long_text_is_chunked_and_stored() {
        let (pipeline, provider) = pipeline(ScriptedProvider::new(DIMS), 2);
        let owner = OwnerId::from("acme");
        let text = "word ".repeat(500);

        let report = pipeline.ingest(&owner, &text, meta("faq.txt")).await.unwrap();
        assert_eq!(report.chunks_stored, 3);
        assert_eq!(report.collection, namespace_for(&owner));
        // 3 chunks in batches of 2
        assert_eq!(provider.embed_calls(), 2);

        let stats = pipeline.stats(&owner).await.unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.dimension, Some(DIMS));
    }

    #[tokio::test]
    async fn whitespace_only_is_rejected_without_side_effects() {
        let (pipeline, provider) = pipeline(ScriptedProvider::new(DIMS), 32);
        let owner = OwnerId::from("acme");
        let err = pipeline.ingest(&owner, " \n\t ", meta("blank.txt")).await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyInput));
        assert_eq!(provider.embed_calls(), 0);
        assert!(!pipeline.stats(&owner).await.unwrap().exists);
    }

    #[tokio::test]
    async fn embedding_failure_writes_nothing() {
        let (pipeline, _) = pipeline(
            ScriptedProvider::new(DIMS).fail_embeddings(ProviderError::Network("down".into())),
            32,
        );
        let owner = OwnerId::from("acme");
        let err = pipeline.ingest(&owner, "Open 9-5", meta("hours.txt")).await.unwrap_err();
        assert!(matches!(err, IngestError::Provider(ProviderError::Network(_))));
        assert!(!pipeline.stats(&owner).await.unwrap().exists);
    }

    #[tokio::test]
    async fn json_document_is_pretty_printed_and_tagged() {
        let (pipeline, _) = pipeline(ScriptedProvider::new(DIMS), 32);
        let owner = OwnerId::from("acme");
        pipeline
            .ingest_document(&owner, "hours.json", "application/json", br#"{"hours":"9-5 Mon-Fri"}"#)
            .await
            .unwrap();

        let query = crate::testing::hash_embedding("hours", DIMS);
        let hits = pipeline.knowledge().search(&owner, &query, 1).await.unwrap();
        assert_eq!(hits[0].record.source_type, SourceType::Json);
        assert!(hits[0].record.text.contains("9-5"));
        assert_eq!(hits[0].record.file_name, "hours.json");
    }

    #[tokio::test]
    async fn no_deduplication_across_ingests() {
        let (pipeline, _) = pipeline(ScriptedProvider::new(DIMS), 32);
        let owner = OwnerId::from("acme");
        pipeline.ingest(&owner, "Open 9-5", meta("hours.txt")).await.unwrap();
        pipeline.ingest(&owner, "Open 9-5", meta("hours.txt")).await.unwrap();
        assert_eq!(pipeline.stats(&owner).await.unwrap().count, 2);

        pipeline.clear(&owner).await.unwrap();
        assert!(!pipeline.stats(&owner).await.unwrap().exists);
    }

    #[tokio::test]
    async fn entries_are_replaced_by_id_and_removable() {
        let (pipeline, _) = pipeline(ScriptedProvider::new(DIMS), 32);
        let owner = OwnerId::from("acme");
        let m = || IngestMetadata {
            file_name: "Opening hours?".into(),
            source_type: SourceType::Qa,
        };
        pipeline.index_entry(&owner, "entry:1", "Q: hours\nA: 9-5", m()).await.unwrap();
        pipeline.index_entry(&owner, "entry:1", "Q: hours\nA: 10-6", m()).await.unwrap();
        assert_eq!(pipeline.stats(&owner).await.unwrap().count, 1);

        assert_eq!(pipeline.remove_entry(&owner, "entry:1").await.unwrap(), 1);
        assert_eq!(pipeline.stats(&owner).await.unwrap().count, 0);
    }
}
