//! Knowledge store trait: owner-scoped vector index.
//!
//! Each owner gets exactly one namespace. Records in one namespace are never
//! returned by a search against another, and every record in a namespace
//! has the namespace's fixed vector dimension.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::identity::OwnerId;

/// Where a knowledge record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Text,
    Json,
    Qa,
    Product,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Json => "json",
            Self::Qa => "qa",
            Self::Product => "product",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(Self::Pdf),
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            "qa" => Some(Self::Qa),
            "product" => Some(Self::Product),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One embedded chunk of owner knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeRecord {
    pub id: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub text: String,
    pub owner_id: OwnerId,
    pub source_type: SourceType,
    pub file_name: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub timestamp: DateTime<Utc>,
}

/// A search hit with its cosine similarity to the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: KnowledgeRecord,
    pub score: f32,
}

/// Size information for one owner's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStats {
    pub namespace: String,
    pub exists: bool,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

/// Deterministic namespace name for an owner.
///
/// The hex encoding of the id's bytes is injective, so distinct owners never
/// share a namespace regardless of the characters their ids contain.
pub fn namespace_for(owner: &OwnerId) -> String {
    format!("owner-{}", hex::encode(owner.as_str().as_bytes()))
}

/// The owner-partitioned k-NN index.
///
/// Implementations: in-memory (for testing), SQLite.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Create the owner's namespace if absent. An existing namespace keeps
    /// its original dimension.
    async fn ensure_namespace(&self, owner: &OwnerId, dimension: usize) -> Result<(), MemoryError>;

    /// Insert or replace records. A replaced record keeps its insertion rank.
    async fn upsert(&self, owner: &OwnerId, records: Vec<KnowledgeRecord>) -> Result<usize, MemoryError>;

    /// Top-`k` records by descending cosine similarity, ties in insertion
    /// order. A missing namespace yields an empty result.
    async fn search(&self, owner: &OwnerId, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>, MemoryError>;

    /// Remove individual records; unknown ids are ignored.
    async fn delete_records(&self, owner: &OwnerId, ids: &[String]) -> Result<usize, MemoryError>;

    /// Drop the whole namespace. Missing namespaces are a no-op.
    async fn delete_namespace(&self, owner: &OwnerId) -> Result<(), MemoryError>;

    async fn stats(&self, owner: &OwnerId) -> Result<NamespaceStats, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_deterministic() {
        let owner = OwnerId::from("acme");
        assert_eq!(namespace_for(&owner), namespace_for(&OwnerId::from("acme")));
        assert_eq!(namespace_for(&owner), "owner-61636d65");
    }

    #[test]
    fn namespace_distinguishes_lookalike_ids() {
        let a = namespace_for(&OwnerId::from("a_b"));
        let b = namespace_for(&OwnerId::from("a-b"));
        let c = namespace_for(&OwnerId::from("A_B"));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn source_type_round_trips_through_str() {
        for st in [SourceType::Pdf, SourceType::Text, SourceType::Json, SourceType::Qa, SourceType::Product] {
            assert_eq!(SourceType::parse(st.as_str()), Some(st));
        }
        assert_eq!(SourceType::parse("docx"), None);
    }
}
