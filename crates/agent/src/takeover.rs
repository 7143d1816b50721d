//! Per-user AI/human takeover state machine.
//!
//! ```text
//!   AiActive ──owner message──▶ HumanActive
//!      ▲                             │
//!      └────────── reset ────────────┘
//! ```
//!
//! A user with no recorded state is AI-active. User messages never change
//! the state.

use relaydesk_core::error::MemoryError;
use relaydesk_core::identity::UserId;
use relaydesk_core::store::{AiState, AiStateStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Who answers a user right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Authority {
    Ai,
    Human,
}

impl From<bool> for Authority {
    fn from(ai_active: bool) -> Self {
        if ai_active { Self::Ai } else { Self::Human }
    }
}

#[derive(Clone)]
pub struct AiTakeover {
    store: Arc<dyn AiStateStore>,
}

impl AiTakeover {
    pub fn new(store: Arc<dyn AiStateStore>) -> Self {
        Self { store }
    }

    /// Current state, defaulting to AI-active for unknown users.
    pub async fn state(&self, user: &UserId) -> Result<AiState, MemoryError> {
        Ok(self
            .store
            .get_ai_state(user)
            .await?
            .unwrap_or_else(|| AiState::new(user.clone(), true)))
    }

    pub async fn authority(&self, user: &UserId) -> Result<Authority, MemoryError> {
        Ok(self.state(user).await?.ai_active.into())
    }

    /// Whether the AI should answer the user's next message.
    ///
    /// A store failure is logged and treated as AI-active so users are
    /// never left without a reply.
    pub async fn is_ai_authoritative(&self, user: &UserId) -> bool {
        match self.authority(user).await {
            Ok(authority) => authority == Authority::Ai,
            Err(e) => {
                warn!(user_id = %user, error = %e, "AI state lookup failed, assuming AI-active");
                true
            }
        }
    }

    /// An owner spoke to `user`: hand the conversation to the human.
    pub async fn record_owner_message(&self, user: &UserId) -> Result<AiState, MemoryError> {
        let state = AiState::new(user.clone(), false);
        self.store.set_ai_state(state.clone()).await?;
        info!(user_id = %user, "Owner took over conversation");
        Ok(state)
    }

    /// Give the conversation back to the AI.
    pub async fn reset(&self, user: &UserId) -> Result<AiState, MemoryError> {
        let state = AiState::new(user.clone(), true);
        self.store.set_ai_state(state.clone()).await?;
        info!(user_id = %user, "AI control restored");
        Ok(state)
    }
}
