//! Message pipelines between users, owners and the AI responder.
//!
//! # User message
//!
//! 1. Resolve the user's owner and load recent history.
//! 2. Append the message durably, then forward it to the owner if online.
//! 3. Check the takeover state. If the AI is authoritative, run the
//!    responder, append its reply and deliver it to both parties. A failed
//!    reply becomes the configured apology.
//!
//! Storage failures on this path never reach the user as an `error` frame:
//! an unsaved reply is still delivered, and an unsaved user message is
//! answered with the apology.
//!
//! # Owner message
//!
//! The owner must be the user's assigned owner (an unassigned user is
//! claimed). The takeover flag flips to human before the message is
//! appended, so the next user message already sees it.

use relaydesk_agent::{AiTakeover, Responder};
use relaydesk_core::conversation::{ChatMessage, ContactInfo};
use relaydesk_core::error::{MemoryError, RoutingError};
use relaydesk_core::identity::{OwnerId, UserId};
use relaydesk_core::store::{AiState, ConversationStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::protocol::{ActiveUser, MetadataUpdate, OwnerCommand, ServerEvent, UserCommand};
use crate::session::{Connection, ConnectionId, Endpoint, SessionRouter};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl HubError {
    /// The `error` frame shown to the client, if this error should be shown.
    pub fn client_event(&self) -> ServerEvent {
        match self {
            Self::Invalid(_) | Self::Routing(_) => ServerEvent::error(self.to_string()),
            Self::Memory(_) => ServerEvent::error("Message could not be saved, please try again"),
        }
    }
}

pub struct ChatHub {
    sessions: Arc<SessionRouter>,
    conversations: Arc<dyn ConversationStore>,
    takeover: AiTakeover,
    responder: Arc<Responder>,
    history_turns: usize,
    fallback_message: String,
}

impl ChatHub {
    pub fn new(
        sessions: Arc<SessionRouter>,
        conversations: Arc<dyn ConversationStore>,
        takeover: AiTakeover,
        responder: Arc<Responder>,
        history_turns: usize,
        fallback_message: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            conversations,
            takeover,
            responder,
            history_turns,
            fallback_message: fallback_message.into(),
        }
    }

    pub async fn connect_user(&self, user: &UserId, declared: Option<OwnerId>) -> Connection {
        let (connection, _) = self.sessions.register_user(user, declared).await;
        if let Err(e) = self.conversations.touch(user).await {
            warn!(user_id = %user, error = %e, "Could not update last-seen");
        }
        connection
    }

    pub fn disconnect_user(&self, user: &UserId, id: ConnectionId) {
        self.sessions.unregister_user(user, id);
    }

    pub fn connect_owner(&self, owner: &OwnerId) -> Connection {
        self.sessions.register_owner(owner)
    }

    pub fn disconnect_owner(&self, owner: &OwnerId, id: ConnectionId) {
        self.sessions.unregister_owner(owner, id);
    }

    /// Handle one frame from a user. Returns a direct reply, if any.
    pub async fn handle_user(&self, user: &UserId, command: UserCommand) -> Result<Option<ServerEvent>, HubError> {
        match command {
            UserCommand::Message { text } => self.user_message(user, &text).await.map(|_| None),
            UserCommand::SetMetadata(update) => self.set_metadata(user, update).await.map(|_| None),
        }
    }

    /// Handle one frame from an owner. Returns a direct reply, if any.
    pub async fn handle_owner(&self, owner: &OwnerId, command: OwnerCommand) -> Result<Option<ServerEvent>, HubError> {
        match command {
            OwnerCommand::Message { user_id, text } => self.owner_message(owner, &user_id, &text).await.map(|_| None),
            OwnerCommand::JoinUser { user_id } => self.history(owner, &user_id).await.map(Some),
            OwnerCommand::ActiveUsers => self.active_users(owner).await.map(Some),
            OwnerCommand::ResetAi { user_id } => {
                self.ensure_may_address(owner, &user_id).await?;
                let state = self.takeover.reset(&user_id).await?;
                Ok(Some(ServerEvent::AiState(state)))
            }
        }
    }

    pub async fn user_message(&self, user: &UserId, text: &str) -> Result<(), HubError> {
        let text = non_empty(text)?;
        let owner = self.sessions.resolve_owner(user).await;

        let history = match self.conversations.recent_messages(user, self.history_turns).await {
            Ok(history) => history,
            Err(e) => {
                warn!(user_id = %user, error = %e, "Could not load history");
                Vec::new()
            }
        };

        let message = ChatMessage::user(text);
        if let Err(e) = self.conversations.append(user, owner.as_ref(), message.clone()).await {
            error!(user_id = %user, error = %e, "Could not store user message");
            let apology = ChatMessage::ai(self.fallback_message.clone(), false, Vec::new(), true);
            self.sessions.forward(
                &Endpoint::User(user.clone()),
                ServerEvent::Message {
                    user_id: user.clone(),
                    message: apology,
                },
            );
            return Ok(());
        }
        debug!(user_id = %user, message_id = %message.id, "User message stored");
        if let Some(owner) = &owner {
            self.sessions.forward(
                &Endpoint::Owner(owner.clone()),
                ServerEvent::Message { user_id: user.clone(), message },
            );
        }

        if !self.takeover.is_ai_authoritative(user).await {
            debug!(user_id = %user, "Human owner active, AI stays silent");
            return Ok(());
        }

        let reply = match self.responder.respond(owner.as_ref(), text, &history).await {
            Ok(reply) => reply.into_message(),
            Err(e) => {
                error!(user_id = %user, error = %e, "AI reply failed");
                ChatMessage::ai(self.fallback_message.clone(), false, Vec::new(), true)
            }
        };
        if let Err(e) = self.conversations.append(user, owner.as_ref(), reply.clone()).await {
            error!(user_id = %user, message_id = %reply.id, error = %e, "Could not store AI reply");
        }
        self.deliver(user, owner.as_ref(), reply);
        Ok(())
    }

    pub async fn owner_message(&self, owner: &OwnerId, user: &UserId, text: &str) -> Result<(), HubError> {
        let text = non_empty(text)?;
        self.ensure_may_address(owner, user).await?;
        if self.sessions.resolve_owner(user).await.is_none() {
            self.sessions.reassign(user, owner).await?;
        }

        self.takeover.record_owner_message(user).await?;
        let message = ChatMessage::owner(owner.clone(), text);
        self.conversations.append(user, Some(owner), message.clone()).await?;
        info!(owner_id = %owner, user_id = %user, "Owner message stored");

        self.sessions.forward(
            &Endpoint::User(user.clone()),
            ServerEvent::Message { user_id: user.clone(), message },
        );
        Ok(())
    }

    /// Merge contact fields and apply an explicit owner reassignment.
    pub async fn set_metadata(&self, user: &UserId, update: MetadataUpdate) -> Result<ContactInfo, HubError> {
        let contact = self.conversations.update_contact(user, &update.contact).await?;
        if let Some(owner) = &update.owner_id {
            self.sessions.reassign(user, owner).await?;
        }
        if let Some(owner) = self.sessions.resolve_owner(user).await {
            self.sessions.forward(
                &Endpoint::Owner(owner),
                ServerEvent::MetadataUpdated {
                    user_id: user.clone(),
                    contact: contact.clone(),
                },
            );
        }
        Ok(contact)
    }

    pub async fn history(&self, owner: &OwnerId, user: &UserId) -> Result<ServerEvent, HubError> {
        self.ensure_may_address(owner, user).await?;
        let messages = self
            .conversations
            .get(user)
            .await?
            .map(|c| c.messages)
            .unwrap_or_default();
        Ok(ServerEvent::History {
            user_id: user.clone(),
            messages,
        })
    }

    pub async fn active_users(&self, owner: &OwnerId) -> Result<ServerEvent, HubError> {
        let mut users = Vec::new();
        for user_id in self.sessions.active_users(owner) {
            let contact = self
                .conversations
                .get(&user_id)
                .await?
                .map(|c| c.contact)
                .unwrap_or_default();
            users.push(ActiveUser { user_id, contact });
        }
        Ok(ServerEvent::ActiveUsers { users })
    }

    pub async fn reset_ai(&self, user: &UserId) -> Result<AiState, HubError> {
        Ok(self.takeover.reset(user).await?)
    }

    pub async fn ai_state(&self, user: &UserId) -> Result<AiState, HubError> {
        Ok(self.takeover.state(user).await?)
    }

    /// Owners may only address users that are unassigned or assigned to them.
    async fn ensure_may_address(&self, owner: &OwnerId, user: &UserId) -> Result<(), HubError> {
        match self.sessions.resolve_owner(user).await {
            Some(assigned) if &assigned != owner => {
                warn!(owner_id = %owner, user_id = %user, assigned = %assigned, "Owner addressed another owner's user");
                Err(RoutingError::OwnerMismatch {
                    user_id: user.to_string(),
                    owner_id: owner.to_string(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    fn deliver(&self, user: &UserId, owner: Option<&OwnerId>, message: ChatMessage) {
        let event = ServerEvent::Message {
            user_id: user.clone(),
            message,
        };
        if let Some(owner) = owner {
            self.sessions.forward(&Endpoint::Owner(owner.clone()), event.clone());
        }
        self.sessions.forward(&Endpoint::User(user.clone()), event);
    }
}

fn non_empty(text: &str) -> Result<&str, HubError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(HubError::Invalid("Message text must not be empty".into()));
    }
    Ok(trimmed)
}
