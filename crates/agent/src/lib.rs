//! The AI side of RelayDesk.
//!
//! - [`Responder`] answers a user from the owner's knowledge base
//!   (embed → k-NN search → grounded prompt → completion), degrading to a
//!   context-free reply when retrieval fails.
//! - [`IngestPipeline`] turns owner resources into embedded, overlapping
//!   chunks in the owner's namespace.
//! - [`AiTakeover`] decides, per user, whether the AI or a human owner is
//!   currently answering.
//! - [`KnowledgeEntries`] manages owner-authored Q&A and product entries and
//!   mirrors them into the vector index.

pub mod chunk;
pub mod embedder;
pub mod entries;
pub mod extract;
pub mod ingest;
pub mod responder;
pub mod takeover;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use chunk::split_windows;
pub use embedder::Embedder;
pub use entries::{EntryDeletion, EntryDraft, EntryError, EntryWrite, KnowledgeEntries};
pub use extract::{ExtractError, Extracted, content_type_for_path, extract_text};
pub use ingest::{IngestError, IngestMetadata, IngestPipeline, IngestReport};
pub use responder::{Reply, Responder, ResponderSettings};
pub use takeover::{AiTakeover, Authority};

use std::future::Future;
use std::time::Duration;

/// Run `fut` under an optional deadline; `None` means it elapsed.
pub(crate) async fn within<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
