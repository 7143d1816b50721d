//! WebSocket wire protocol.
//!
//! Every frame is `{"event": "<name>", "data": {...}}` with camelCase fields.
//! Inbound frames are parsed per role; anything unknown or malformed is a
//! [`ProtocolError`] that the socket answers with an `error` frame.

use relaydesk_core::conversation::{ChatMessage, ContactInfo};
use relaydesk_core::identity::{OwnerId, UserId};
use relaydesk_core::store::AiState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Unknown event '{0}'")]
    UnknownEvent(String),
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

fn parse_envelope(text: &str) -> Result<Envelope, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::Malformed(format!("{event}: {e}")))
}

/// Owner frames must name a user; a blank id is never a valid target.
fn target(event: &str, user_id: UserId) -> Result<UserId, ProtocolError> {
    if user_id.as_str().trim().is_empty() {
        return Err(ProtocolError::Malformed(format!("{event}: userId is blank")));
    }
    Ok(user_id)
}

#[derive(Debug, Clone, Deserialize)]
struct TextPayload {
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    user_id: UserId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerMessagePayload {
    user_id: UserId,
    text: String,
}

/// Contact fields and an optional explicit owner reassignment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdate {
    #[serde(flatten)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub owner_id: Option<OwnerId>,
}

/// Frames a user connection may send.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Message { text: String },
    SetMetadata(MetadataUpdate),
}

impl UserCommand {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let Envelope { event, data } = parse_envelope(text)?;
        match event.as_str() {
            "message" => {
                let p: TextPayload = payload(&event, data)?;
                Ok(Self::Message { text: p.text })
            }
            "setMetadata" => Ok(Self::SetMetadata(payload(&event, data)?)),
            _ => Err(ProtocolError::UnknownEvent(event)),
        }
    }
}

/// Frames an owner connection may send.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnerCommand {
    Message { user_id: UserId, text: String },
    JoinUser { user_id: UserId },
    ActiveUsers,
    ResetAi { user_id: UserId },
}

impl OwnerCommand {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let Envelope { event, data } = parse_envelope(text)?;
        match event.as_str() {
            "message" => {
                let p: OwnerMessagePayload = payload(&event, data)?;
                Ok(Self::Message {
                    user_id: target(&event, p.user_id)?,
                    text: p.text,
                })
            }
            "joinUser" => {
                let p: UserPayload = payload(&event, data)?;
                Ok(Self::JoinUser {
                    user_id: target(&event, p.user_id)?,
                })
            }
            "ready" | "getActiveUsers" => Ok(Self::ActiveUsers),
            "resetAi" => {
                let p: UserPayload = payload(&event, data)?;
                Ok(Self::ResetAi {
                    user_id: target(&event, p.user_id)?,
                })
            }
            _ => Err(ProtocolError::UnknownEvent(event)),
        }
    }
}

/// A live user as listed to their owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUser {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "ContactInfo::is_empty")]
    pub contact: ContactInfo,
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "message")]
    Message { user_id: UserId, message: ChatMessage },

    #[serde(rename = "user:connected")]
    UserConnected { user_id: UserId },

    #[serde(rename = "user:disconnected")]
    UserDisconnected { user_id: UserId },

    #[serde(rename = "metadata:updated")]
    MetadataUpdated { user_id: UserId, contact: ContactInfo },

    #[serde(rename = "activeUsers")]
    ActiveUsers { users: Vec<ActiveUser> },

    #[serde(rename = "history")]
    History { user_id: UserId, messages: Vec<ChatMessage> },

    #[serde(rename = "aiState")]
    AiState(AiState),

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
