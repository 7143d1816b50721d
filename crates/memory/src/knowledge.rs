//! In-memory knowledge store: one `Vec` of records per owner namespace.

use async_trait::async_trait;
use relaydesk_core::error::MemoryError;
use relaydesk_core::identity::OwnerId;
use relaydesk_core::knowledge::{
    KnowledgeRecord, KnowledgeStore, NamespaceStats, ScoredRecord, namespace_for,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::vector::rank_by_similarity;

struct Namespace {
    dimension: usize,
    /// Insertion order; replaced records keep their slot.
    records: Vec<KnowledgeRecord>,
}

#[derive(Clone, Default)]
pub struct InMemoryKnowledgeStore {
    namespaces: Arc<RwLock<HashMap<String, Namespace>>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Checks shared by every backend before records are written.
pub(crate) fn validate_records(
    owner: &OwnerId,
    dimension: usize,
    records: &[KnowledgeRecord],
) -> Result<(), MemoryError> {
    for record in records {
        if &record.owner_id != owner {
            return Err(MemoryError::Storage(format!(
                "record {} belongs to owner {}, not {}",
                record.id, record.owner_id, owner
            )));
        }
        if record.vector.len() != dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: dimension,
                actual: record.vector.len(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn ensure_namespace(&self, owner: &OwnerId, dimension: usize) -> Result<(), MemoryError> {
        self.namespaces
            .write()
            .await
            .entry(namespace_for(owner))
            .or_insert_with(|| {
                debug!(owner_id = %owner, dimension, "Created knowledge namespace");
                Namespace { dimension, records: Vec::new() }
            });
        Ok(())
    }

    async fn upsert(&self, owner: &OwnerId, records: Vec<KnowledgeRecord>) -> Result<usize, MemoryError> {
        let Some(first) = records.first() else {
            return Ok(0);
        };

        let mut namespaces = self.namespaces.write().await;
        let ns = namespaces
            .entry(namespace_for(owner))
            .or_insert_with(|| Namespace { dimension: first.vector.len(), records: Vec::new() });
        validate_records(owner, ns.dimension, &records)?;

        let count = records.len();
        for record in records {
            match ns.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => ns.records.push(record),
            }
        }
        Ok(count)
    }

    async fn search(&self, owner: &OwnerId, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>, MemoryError> {
        let namespaces = self.namespaces.read().await;
        let Some(ns) = namespaces.get(&namespace_for(owner)) else {
            return Ok(Vec::new());
        };
        if vector.len() != ns.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: ns.dimension,
                actual: vector.len(),
            });
        }
        Ok(rank_by_similarity(&ns.records, vector, k))
    }

    async fn delete_records(&self, owner: &OwnerId, ids: &[String]) -> Result<usize, MemoryError> {
        let mut namespaces = self.namespaces.write().await;
        let Some(ns) = namespaces.get_mut(&namespace_for(owner)) else {
            return Ok(0);
        };
        let before = ns.records.len();
        ns.records.retain(|r| !ids.contains(&r.id));
        Ok(before - ns.records.len())
    }

    async fn delete_namespace(&self, owner: &OwnerId) -> Result<(), MemoryError> {
        self.namespaces.write().await.remove(&namespace_for(owner));
        Ok(())
    }

    async fn stats(&self, owner: &OwnerId) -> Result<NamespaceStats, MemoryError> {
        let namespace = namespace_for(owner);
        let namespaces = self.namespaces.read().await;
        Ok(match namespaces.get(&namespace) {
            Some(ns) => NamespaceStats {
                namespace,
                exists: true,
                count: ns.records.len(),
                dimension: Some(ns.dimension),
            },
            None => NamespaceStats {
                namespace,
                exists: false,
                count: 0,
                dimension: None,
            },
        })
    }
}
