//! SQLite-backed knowledge store.
//!
//! Vectors are stored as little-endian `f32` blobs and ranked in Rust with
//! [`crate::vector::rank_by_similarity`]. The autoincrement `seq` column gives
//! insertion order, and `ON CONFLICT DO UPDATE` keeps a replaced record's
//! `seq`, so ranking ties stay stable across re-ingestion.

use async_trait::async_trait;
use chrono::Utc;
use relaydesk_core::error::MemoryError;
use relaydesk_core::identity::OwnerId;
use relaydesk_core::knowledge::{
    KnowledgeRecord, KnowledgeStore, NamespaceStats, ScoredRecord, SourceType, namespace_for,
};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteRow;
use tracing::debug;

use crate::knowledge::validate_records;
use crate::sqlite::{column, parse_ts, ts};
use crate::vector::rank_by_similarity;

pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<(), MemoryError> {
    let statements = [
        (
            "knowledge_namespaces table",
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_namespaces (
                namespace   TEXT PRIMARY KEY NOT NULL,
                owner_id    TEXT NOT NULL,
                dimension   INTEGER NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        ),
        (
            "knowledge_records table",
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_records (
                seq           INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace     TEXT NOT NULL,
                id            TEXT NOT NULL,
                owner_id      TEXT NOT NULL,
                text          TEXT NOT NULL,
                source_type   TEXT NOT NULL,
                file_name     TEXT NOT NULL,
                chunk_index   INTEGER NOT NULL,
                total_chunks  INTEGER NOT NULL,
                timestamp     TEXT NOT NULL,
                vector        BLOB NOT NULL,
                UNIQUE(namespace, id)
            )
            "#,
        ),
        (
            "knowledge_records index",
            "CREATE INDEX IF NOT EXISTS idx_records_namespace_seq ON knowledge_records(namespace, seq)",
        ),
    ];

    for (what, sql) in statements {
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|e| MemoryError::MigrationFailed(format!("{what}: {e}")))?;
    }
    Ok(())
}

/// Owner-partitioned vector index in SQLite.
#[derive(Clone)]
pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
}

impl SqliteKnowledgeStore {
    /// Share a pool opened by [`crate::SqliteStore`]; migrations have already run.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Serialize an embedding vector to bytes.
    fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
        vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_record(row: &SqliteRow) -> Result<KnowledgeRecord, MemoryError> {
        let source_type: String = column(row, "source_type")?;
        let source_type = SourceType::parse(&source_type)
            .ok_or_else(|| MemoryError::QueryFailed(format!("unknown source type '{source_type}'")))?;
        let owner_id: String = column(row, "owner_id")?;
        let chunk_index: i64 = column(row, "chunk_index")?;
        let total_chunks: i64 = column(row, "total_chunks")?;
        let timestamp: String = column(row, "timestamp")?;
        let blob: Vec<u8> = column(row, "vector")?;

        Ok(KnowledgeRecord {
            id: column(row, "id")?,
            vector: Self::blob_to_vector(&blob),
            text: column(row, "text")?,
            owner_id: OwnerId::from(owner_id),
            source_type,
            file_name: column(row, "file_name")?,
            chunk_index: chunk_index.max(0) as usize,
            total_chunks: total_chunks.max(0) as usize,
            timestamp: parse_ts(&timestamp),
        })
    }

    async fn dimension(&self, namespace: &str) -> Result<Option<usize>, MemoryError> {
        let dimension: Option<i64> =
            sqlx::query_scalar("SELECT dimension FROM knowledge_namespaces WHERE namespace = ?1")
                .bind(namespace)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| MemoryError::QueryFailed(format!("SELECT namespace: {e}")))?;
        Ok(dimension.map(|d| d.max(0) as usize))
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn ensure_namespace(&self, owner: &OwnerId, dimension: usize) -> Result<(), MemoryError> {
        let namespace = namespace_for(owner);
        let inserted = sqlx::query(
            r#"
            INSERT INTO knowledge_namespaces (namespace, owner_id, dimension, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(namespace) DO NOTHING
            "#,
        )
        .bind(&namespace)
        .bind(owner.as_str())
        .bind(dimension as i64)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT namespace failed: {e}")))?;

        if inserted.rows_affected() > 0 {
            debug!(owner_id = %owner, %namespace, dimension, "Created knowledge namespace");
        }
        Ok(())
    }

    async fn upsert(&self, owner: &OwnerId, records: Vec<KnowledgeRecord>) -> Result<usize, MemoryError> {
        let Some(first) = records.first() else {
            return Ok(0);
        };
        let namespace = namespace_for(owner);
        let dimension = match self.dimension(&namespace).await? {
            Some(d) => d,
            None => {
                let d = first.vector.len();
                self.ensure_namespace(owner, d).await?;
                d
            }
        };
        validate_records(owner, dimension, &records)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO knowledge_records
                    (namespace, id, owner_id, text, source_type, file_name, chunk_index, total_chunks, timestamp, vector)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(namespace, id) DO UPDATE SET
                    text = excluded.text,
                    source_type = excluded.source_type,
                    file_name = excluded.file_name,
                    chunk_index = excluded.chunk_index,
                    total_chunks = excluded.total_chunks,
                    timestamp = excluded.timestamp,
                    vector = excluded.vector
                "#,
            )
            .bind(&namespace)
            .bind(&record.id)
            .bind(record.owner_id.as_str())
            .bind(&record.text)
            .bind(record.source_type.as_str())
            .bind(&record.file_name)
            .bind(record.chunk_index as i64)
            .bind(record.total_chunks as i64)
            .bind(ts(record.timestamp))
            .bind(Self::vector_to_blob(&record.vector))
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("UPSERT record failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        Ok(records.len())
    }

    async fn search(&self, owner: &OwnerId, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>, MemoryError> {
        let namespace = namespace_for(owner);
        let Some(dimension) = self.dimension(&namespace).await? else {
            return Ok(Vec::new());
        };
        if vector.len() != dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        let rows = sqlx::query("SELECT * FROM knowledge_records WHERE namespace = ?1 ORDER BY seq ASC")
            .bind(&namespace)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("SELECT records: {e}")))?;
        let records = rows.iter().map(Self::row_to_record).collect::<Result<Vec<_>, _>>()?;

        Ok(rank_by_similarity(&records, vector, k))
    }

    async fn delete_records(&self, owner: &OwnerId, ids: &[String]) -> Result<usize, MemoryError> {
        let namespace = namespace_for(owner);
        let mut removed = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM knowledge_records WHERE namespace = ?1 AND id = ?2")
                .bind(&namespace)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::Storage(format!("DELETE record failed: {e}")))?;
            removed += result.rows_affected() as usize;
        }
        Ok(removed)
    }

    async fn delete_namespace(&self, owner: &OwnerId) -> Result<(), MemoryError> {
        let namespace = namespace_for(owner);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;
        sqlx::query("DELETE FROM knowledge_records WHERE namespace = ?1")
            .bind(&namespace)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE records failed: {e}")))?;
        sqlx::query("DELETE FROM knowledge_namespaces WHERE namespace = ?1")
            .bind(&namespace)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE namespace failed: {e}")))?;
        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;
        Ok(())
    }

    async fn stats(&self, owner: &OwnerId) -> Result<NamespaceStats, MemoryError> {
        let namespace = namespace_for(owner);
        let dimension = self.dimension(&namespace).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_records WHERE namespace = ?1")
            .bind(&namespace)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT records: {e}")))?;
        Ok(NamespaceStats {
            namespace,
            exists: dimension.is_some(),
            count: count.max(0) as usize,
            dimension,
        })
    }
}
