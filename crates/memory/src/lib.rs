//! Storage implementations for RelayDesk.
//!
//! Two families of backends live here: durable stores for conversations,
//! takeover state, owner settings and knowledge entries, and the owner-scoped
//! vector index used for retrieval.

pub mod in_memory;
pub mod knowledge;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod sqlite_knowledge;

pub use in_memory::InMemoryStore;
pub use knowledge::InMemoryKnowledgeStore;
pub use vector::{cosine_similarity, rank_by_similarity};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "sqlite")]
pub use sqlite_knowledge::SqliteKnowledgeStore;
