//! SQLite backend for the durable stores.
//!
//! Tables:
//! - `conversations`: one row per user with owner assignment and contact info
//! - `messages`: append-only log; the autoincrement `seq` column is the order
//! - `ai_state`: per-user takeover flag
//! - `owner_settings`: per-owner website URL
//! - `knowledge_entries`: owner-authored Q&A and product entries
//!
//! The knowledge vector index shares the pool; see [`crate::sqlite_knowledge`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use relaydesk_core::conversation::{ChatMessage, ContactInfo, Conversation, ConversationSummary, Origin, SourceRef};
use relaydesk_core::error::MemoryError;
use relaydesk_core::identity::{OwnerId, UserId};
use relaydesk_core::store::{
    AiState, AiStateStore, ConversationStore, EntryKind, KnowledgeEntry, KnowledgeEntryStore,
    OwnerSettings, OwnerSettingsStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed conversation, takeover-state, settings and entry store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file and run migrations.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// An ephemeral database. A single, never-recycled connection keeps the
    /// in-memory database alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .max_lifetime(None::<std::time::Duration>)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// The underlying pool, for sharing with [`crate::SqliteKnowledgeStore`].
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        let statements = [
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    user_id     TEXT PRIMARY KEY NOT NULL,
                    owner_id    TEXT,
                    username    TEXT,
                    email       TEXT,
                    phone       TEXT,
                    created_at  TEXT NOT NULL,
                    last_seen   TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                    id           TEXT UNIQUE NOT NULL,
                    user_id      TEXT NOT NULL REFERENCES conversations(user_id),
                    origin       TEXT NOT NULL,
                    text         TEXT NOT NULL,
                    timestamp    TEXT NOT NULL,
                    owner_id     TEXT,
                    context_used INTEGER,
                    sources      TEXT NOT NULL DEFAULT '[]',
                    degraded     INTEGER
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_user_seq ON messages(user_id, seq)",
            ),
            (
                "ai_state table",
                r#"
                CREATE TABLE IF NOT EXISTS ai_state (
                    user_id      TEXT PRIMARY KEY NOT NULL,
                    ai_active    INTEGER NOT NULL,
                    last_updated TEXT NOT NULL
                )
                "#,
            ),
            (
                "owner_settings table",
                r#"
                CREATE TABLE IF NOT EXISTS owner_settings (
                    owner_id     TEXT PRIMARY KEY NOT NULL,
                    website_url  TEXT
                )
                "#,
            ),
            (
                "knowledge_entries table",
                r#"
                CREATE TABLE IF NOT EXISTS knowledge_entries (
                    iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                    id           TEXT UNIQUE NOT NULL,
                    owner_id     TEXT NOT NULL,
                    kind         TEXT NOT NULL,
                    title        TEXT NOT NULL,
                    body         TEXT NOT NULL,
                    created_at   TEXT NOT NULL,
                    updated_at   TEXT NOT NULL
                )
                "#,
            ),
            (
                "knowledge_entries index",
                "CREATE INDEX IF NOT EXISTS idx_entries_owner_kind ON knowledge_entries(owner_id, kind)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{what}: {e}")))?;
        }

        crate::sqlite_knowledge::run_migrations(&self.pool).await?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_message(row: &SqliteRow) -> Result<ChatMessage, MemoryError> {
        let origin: String = column(row, "origin")?;
        let origin = Origin::parse(&origin)
            .ok_or_else(|| MemoryError::QueryFailed(format!("unknown message origin '{origin}'")))?;
        let timestamp: String = column(row, "timestamp")?;
        let owner_id: Option<String> = column(row, "owner_id")?;
        let context_used: Option<bool> = column(row, "context_used")?;
        let degraded: Option<bool> = column(row, "degraded")?;
        let sources_json: String = column(row, "sources")?;
        let sources: Vec<SourceRef> = serde_json::from_str(&sources_json).unwrap_or_default();

        Ok(ChatMessage {
            id: column(row, "id")?,
            origin,
            text: column(row, "text")?,
            timestamp: parse_ts(&timestamp),
            owner_id: owner_id.map(OwnerId::from),
            context_used,
            sources,
            degraded,
        })
    }

    fn row_to_conversation_head(row: &SqliteRow) -> Result<Conversation, MemoryError> {
        let user_id: String = column(row, "user_id")?;
        let owner_id: Option<String> = column(row, "owner_id")?;
        let created_at: String = column(row, "created_at")?;
        let last_seen: String = column(row, "last_seen")?;
        Ok(Conversation {
            user_id: UserId::from(user_id),
            owner_id: owner_id.map(OwnerId::from),
            contact: ContactInfo {
                username: column(row, "username")?,
                email: column(row, "email")?,
                phone: column(row, "phone")?,
            },
            created_at: parse_ts(&created_at),
            last_seen: parse_ts(&last_seen),
            messages: Vec::new(),
        })
    }

    fn row_to_entry(row: &SqliteRow) -> Result<KnowledgeEntry, MemoryError> {
        let kind: String = column(row, "kind")?;
        let kind = EntryKind::parse(&kind)
            .ok_or_else(|| MemoryError::QueryFailed(format!("unknown entry kind '{kind}'")))?;
        let owner_id: String = column(row, "owner_id")?;
        let created_at: String = column(row, "created_at")?;
        let updated_at: String = column(row, "updated_at")?;
        Ok(KnowledgeEntry {
            id: column(row, "id")?,
            owner_id: OwnerId::from(owner_id),
            kind,
            title: column(row, "title")?,
            body: column(row, "body")?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }

    /// Insert the conversation row if it does not exist yet.
    async fn ensure_conversation(&self, user: &UserId) -> Result<(), MemoryError> {
        let now = ts(Utc::now());
        sqlx::query(
            "INSERT INTO conversations (user_id, created_at, last_seen) VALUES (?1, ?2, ?2)
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT conversation failed: {e}")))?;
        Ok(())
    }
}

/// Read a typed column, mapping the error the way every row parser here does.
pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, MemoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| MemoryError::QueryFailed(format!("{name} column: {e}")))
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub(crate) fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(
        &self,
        user: &UserId,
        owner_hint: Option<&OwnerId>,
        message: ChatMessage,
    ) -> Result<(), MemoryError> {
        let now = ts(Utc::now());
        let sources = serde_json::to_string(&message.sources)
            .map_err(|e| MemoryError::Storage(format!("Sources serialization: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO conversations (user_id, owner_id, created_at, last_seen)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                owner_id = COALESCE(conversations.owner_id, excluded.owner_id),
                last_seen = excluded.last_seen
            "#,
        )
        .bind(user.as_str())
        .bind(owner_hint.map(OwnerId::as_str))
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("UPSERT conversation failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, user_id, origin, text, timestamp, owner_id, context_used, sources, degraded)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&message.id)
        .bind(user.as_str())
        .bind(message.origin.as_str())
        .bind(&message.text)
        .bind(ts(message.timestamp))
        .bind(message.owner_id.as_ref().map(OwnerId::as_str))
        .bind(message.context_used)
        .bind(&sources)
        .bind(message.degraded)
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT message failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(user_id = %user, origin = message.origin.as_str(), "Appended message");
        Ok(())
    }

    async fn get(&self, user: &UserId) -> Result<Option<Conversation>, MemoryError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE user_id = ?1")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("SELECT conversation: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut conv = Self::row_to_conversation_head(&row)?;

        let rows = sqlx::query("SELECT * FROM messages WHERE user_id = ?1 ORDER BY seq ASC")
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("SELECT messages: {e}")))?;
        conv.messages = rows.iter().map(Self::row_to_message).collect::<Result<_, _>>()?;

        Ok(Some(conv))
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT c.*,
                   (SELECT COUNT(*) FROM messages m WHERE m.user_id = c.user_id) AS message_count,
                   (SELECT m.text FROM messages m WHERE m.user_id = c.user_id
                    ORDER BY m.seq DESC LIMIT 1) AS last_message
            FROM conversations c
            ORDER BY c.last_seen DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("SELECT conversations: {e}")))?;

        rows.iter()
            .map(|row| {
                let head = Self::row_to_conversation_head(row)?;
                let message_count: i64 = column(row, "message_count")?;
                Ok(ConversationSummary {
                    user_id: head.user_id,
                    owner_id: head.owner_id,
                    contact: head.contact,
                    last_seen: head.last_seen,
                    message_count: message_count.max(0) as usize,
                    last_message: column(row, "last_message")?,
                })
            })
            .collect()
    }

    async fn recent_messages(&self, user: &UserId, limit: usize) -> Result<Vec<ChatMessage>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM messages WHERE user_id = ?1 ORDER BY seq DESC LIMIT ?2
            ) ORDER BY seq ASC
            "#,
        )
        .bind(user.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("SELECT recent messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn owner_of(&self, user: &UserId) -> Result<Option<OwnerId>, MemoryError> {
        let owner: Option<Option<String>> =
            sqlx::query_scalar("SELECT owner_id FROM conversations WHERE user_id = ?1")
                .bind(user.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| MemoryError::QueryFailed(format!("SELECT owner: {e}")))?;
        Ok(owner.flatten().map(OwnerId::from))
    }

    async fn assign_owner(&self, user: &UserId, owner: &OwnerId) -> Result<(), MemoryError> {
        let now = ts(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO conversations (user_id, owner_id, created_at, last_seen)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(user_id) DO UPDATE SET owner_id = excluded.owner_id
            "#,
        )
        .bind(user.as_str())
        .bind(owner.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("UPSERT owner failed: {e}")))?;
        Ok(())
    }

    async fn update_contact(&self, user: &UserId, contact: &ContactInfo) -> Result<ContactInfo, MemoryError> {
        self.ensure_conversation(user).await?;
        sqlx::query(
            r#"
            UPDATE conversations SET
                username = COALESCE(?2, username),
                email = COALESCE(?3, email),
                phone = COALESCE(?4, phone)
            WHERE user_id = ?1
            "#,
        )
        .bind(user.as_str())
        .bind(&contact.username)
        .bind(&contact.email)
        .bind(&contact.phone)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("UPDATE contact failed: {e}")))?;

        let row = sqlx::query("SELECT * FROM conversations WHERE user_id = ?1")
            .bind(user.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("SELECT conversation: {e}")))?;
        Ok(Self::row_to_conversation_head(&row)?.contact)
    }

    async fn touch(&self, user: &UserId) -> Result<(), MemoryError> {
        let now = ts(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO conversations (user_id, created_at, last_seen) VALUES (?1, ?2, ?2)
            ON CONFLICT(user_id) DO UPDATE SET last_seen = excluded.last_seen
            "#,
        )
        .bind(user.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("touch failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl AiStateStore for SqliteStore {
    async fn get_ai_state(&self, user: &UserId) -> Result<Option<AiState>, MemoryError> {
        let row = sqlx::query("SELECT * FROM ai_state WHERE user_id = ?1")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("SELECT ai_state: {e}")))?;

        row.map(|row| {
            let last_updated: String = column(&row, "last_updated")?;
            Ok(AiState {
                user_id: user.clone(),
                ai_active: column(&row, "ai_active")?,
                last_updated: parse_ts(&last_updated),
            })
        })
        .transpose()
    }

    async fn set_ai_state(&self, state: AiState) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            INSERT INTO ai_state (user_id, ai_active, last_updated) VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                ai_active = excluded.ai_active,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(state.user_id.as_str())
        .bind(state.ai_active)
        .bind(ts(state.last_updated))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("UPSERT ai_state failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl OwnerSettingsStore for SqliteStore {
    async fn get_settings(&self, owner: &OwnerId) -> Result<Option<OwnerSettings>, MemoryError> {
        let url: Option<Option<String>> =
            sqlx::query_scalar("SELECT website_url FROM owner_settings WHERE owner_id = ?1")
                .bind(owner.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| MemoryError::QueryFailed(format!("SELECT owner_settings: {e}")))?;
        Ok(url.map(|website_url| OwnerSettings {
            owner_id: owner.clone(),
            website_url,
        }))
    }

    async fn set_website(&self, owner: &OwnerId, url: Option<String>) -> Result<OwnerSettings, MemoryError> {
        sqlx::query(
            r#"
            INSERT INTO owner_settings (owner_id, website_url) VALUES (?1, ?2)
            ON CONFLICT(owner_id) DO UPDATE SET website_url = excluded.website_url
            "#,
        )
        .bind(owner.as_str())
        .bind(&url)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("UPSERT owner_settings failed: {e}")))?;
        Ok(OwnerSettings {
            owner_id: owner.clone(),
            website_url: url,
        })
    }
}

#[async_trait]
impl KnowledgeEntryStore for SqliteStore {
    async fn list_entries(&self, owner: &OwnerId, kind: EntryKind) -> Result<Vec<KnowledgeEntry>, MemoryError> {
        let rows = sqlx::query(
            "SELECT * FROM knowledge_entries WHERE owner_id = ?1 AND kind = ?2 ORDER BY iid ASC",
        )
        .bind(owner.as_str())
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("SELECT entries: {e}")))?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn get_entry(&self, owner: &OwnerId, id: &str) -> Result<Option<KnowledgeEntry>, MemoryError> {
        let row = sqlx::query("SELECT * FROM knowledge_entries WHERE owner_id = ?1 AND id = ?2")
            .bind(owner.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("SELECT entry: {e}")))?;
        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn put_entry(&self, entry: KnowledgeEntry) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            INSERT INTO knowledge_entries (id, owner_id, kind, title, body, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entry.id)
        .bind(entry.owner_id.as_str())
        .bind(entry.kind.as_str())
        .bind(&entry.title)
        .bind(&entry.body)
        .bind(ts(entry.created_at))
        .bind(ts(entry.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("UPSERT entry failed: {e}")))?;
        Ok(())
    }

    async fn delete_entry(&self, owner: &OwnerId, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM knowledge_entries WHERE owner_id = ?1 AND id = ?2")
            .bind(owner.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE entry failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaydesk_core::SourceType;

    async fn test_store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn append_and_read_back_in_order() {
        let db = test_store().await;
        let user = UserId::from("u-1");
        for i in 0..20 {
            db.append(&user, Some(&OwnerId::from("acme")), ChatMessage::user(format!("m{i}")))
                .await
                .unwrap();
        }

        let conv = db.get(&user).await.unwrap().unwrap();
        assert_eq!(conv.owner_id, Some(OwnerId::from("acme")));
        let texts: Vec<_> = conv.messages.iter().map(|m| m.text.clone()).collect();
        assert_eq!(texts, (0..20).map(|i| format!("m{i}")).collect::<Vec<_>>());

        let recent = db.recent_messages(&user, 2).await.unwrap();
        assert_eq!(recent[0].text, "m18");
        assert_eq!(recent[1].text, "m19");
    }

    #[tokio::test]
    async fn ai_message_fields_survive_storage() {
        let db = test_store().await;
        let user = UserId::from("u-1");
        let msg = ChatMessage::ai(
            "Open 9-5",
            true,
            vec![SourceRef {
                file_name: "hours.json".into(),
                source_type: SourceType::Json,
                relevance_score: 0.8,
            }],
            false,
        );
        db.append(&user, None, msg.clone()).await.unwrap();
        let stored = db.recent_messages(&user, 1).await.unwrap();
        assert_eq!(stored[0].context_used, Some(true));
        assert_eq!(stored[0].sources, msg.sources);
        assert_eq!(stored[0].degraded, None);
        assert_eq!(stored[0].origin, Origin::Ai);
    }

    #[tokio::test]
    async fn owner_hint_only_fills_empty_owner() {
        let db = test_store().await;
        let user = UserId::from("u-1");
        db.append(&user, None, ChatMessage::user("hi")).await.unwrap();
        assert_eq!(db.owner_of(&user).await.unwrap(), None);

        db.append(&user, Some(&OwnerId::from("acme")), ChatMessage::user("again")).await.unwrap();
        db.append(&user, Some(&OwnerId::from("globex")), ChatMessage::user("third")).await.unwrap();
        assert_eq!(db.owner_of(&user).await.unwrap(), Some(OwnerId::from("acme")));

        db.assign_owner(&user, &OwnerId::from("globex")).await.unwrap();
        assert_eq!(db.owner_of(&user).await.unwrap(), Some(OwnerId::from("globex")));
    }

    #[tokio::test]
    async fn list_summarizes_conversations() {
        let db = test_store().await;
        db.append(&UserId::from("a"), None, ChatMessage::user("one")).await.unwrap();
        db.append(&UserId::from("b"), None, ChatMessage::user("two")).await.unwrap();
        db.append(&UserId::from("b"), None, ChatMessage::user("three")).await.unwrap();

        let list = db.list().await.unwrap();
        assert_eq!(list.len(), 2);
        let b = list.iter().find(|s| s.user_id.as_str() == "b").unwrap();
        assert_eq!(b.message_count, 2);
        assert_eq!(b.last_message.as_deref(), Some("three"));
    }

    #[tokio::test]
    async fn contact_and_ai_state_round_trip() {
        let db = test_store().await;
        let user = UserId::from("u-1");
        db.update_contact(&user, &ContactInfo { username: Some("ana".into()), ..Default::default() })
            .await
            .unwrap();
        let contact = db
            .update_contact(&user, &ContactInfo { phone: Some("555".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(contact.username.as_deref(), Some("ana"));
        assert_eq!(contact.phone.as_deref(), Some("555"));

        assert!(db.get_ai_state(&user).await.unwrap().is_none());
        db.set_ai_state(AiState::new(user.clone(), false)).await.unwrap();
        assert!(!db.get_ai_state(&user).await.unwrap().unwrap().ai_active);
    }

    #[tokio::test]
    async fn website_and_entries() {
        let db = test_store().await;
        let owner = OwnerId::from("acme");
        assert!(db.get_settings(&owner).await.unwrap().is_none());
        db.set_website(&owner, Some("https://acme.test".into())).await.unwrap();
        assert_eq!(
            db.get_settings(&owner).await.unwrap().unwrap().website_url.as_deref(),
            Some("https://acme.test")
        );

        let now = Utc::now();
        let entry = KnowledgeEntry {
            id: "e1".into(),
            owner_id: owner.clone(),
            kind: EntryKind::Product,
            title: "Widget".into(),
            body: "A fine widget".into(),
            created_at: now,
            updated_at: now,
        };
        db.put_entry(entry.clone()).await.unwrap();
        db.put_entry(KnowledgeEntry { body: "An even finer widget".into(), ..entry }).await.unwrap();

        let listed = db.list_entries(&owner, EntryKind::Product).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].body, "An even finer widget");
        assert!(db.delete_entry(&owner, "e1").await.unwrap());
        assert!(!db.delete_entry(&owner, "e1").await.unwrap());
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");
        let url = format!("sqlite://{}", path.display());
        let user = UserId::from("u-1");
        {
            let db = SqliteStore::new(&url).await.unwrap();
            db.append(&user, None, ChatMessage::user("remember me")).await.unwrap();
        }
        let db = SqliteStore::new(&url).await.unwrap();
        let conv = db.get(&user).await.unwrap().unwrap();
        assert_eq!(conv.messages[0].text, "remember me");
    }
}
