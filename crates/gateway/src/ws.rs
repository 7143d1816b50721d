//! `GET /ws`: the live chat socket for users and owners.
//!
//! Identity comes from the query string:
//! `?role=user&userId=U[&ownerId=O]`, `?role=owner&token=T` (looked up in
//! `gateway.owner_tokens`) or, only when no owner tokens are configured,
//! `?role=owner&ownerId=O`.
//!
//! Each socket runs one receive loop that handles its frames in order, and
//! a writer task draining the connection's outbound queue.

use axum::{
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use relaydesk_config::GatewayConfig;
use relaydesk_core::error::RoutingError;
use relaydesk_core::identity::{OwnerId, UserId};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::protocol::{OwnerCommand, ServerEvent, UserCommand};
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Who is on the other end of a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Peer {
    User { user_id: UserId, declared_owner: Option<OwnerId> },
    Owner { owner_id: OwnerId },
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Work out the peer from connect parameters, before upgrading.
pub fn resolve_peer(params: ConnectParams, gateway: &GatewayConfig) -> Result<Peer, RoutingError> {
    match params.role.as_deref() {
        Some("user") => {
            let user_id = present(params.user_id).ok_or_else(|| RoutingError::MissingIdentity("userId".into()))?;
            Ok(Peer::User {
                user_id: UserId::from(user_id),
                declared_owner: present(params.owner_id).map(OwnerId::from),
            })
        }
        Some("owner") => {
            if let Some(token) = present(params.token) {
                let owner = gateway.owner_tokens.get(&token).ok_or(RoutingError::UnknownToken)?;
                return Ok(Peer::Owner {
                    owner_id: OwnerId::from(owner.as_str()),
                });
            }
            if !gateway.owner_tokens.is_empty() {
                return Err(RoutingError::TokenRequired);
            }
            let owner_id = present(params.owner_id)
                .ok_or_else(|| RoutingError::MissingIdentity("ownerId or token".into()))?;
            Ok(Peer::Owner {
                owner_id: OwnerId::from(owner_id),
            })
        }
        _ => Err(RoutingError::MissingIdentity("role must be 'user' or 'owner'".into())),
    }
}

pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(params): Query<ConnectParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let peer = match resolve_peer(params, &state.config.gateway) {
        Ok(peer) => peer,
        Err(e) => return ApiError::from(e).into_response(),
    };
    match upgrade {
        Ok(ws) => ws.on_upgrade(move |socket| run_socket(socket, state, peer)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn run_socket(socket: WebSocket, state: SharedState, peer: Peer) {
    let connection = match &peer {
        Peer::User { user_id, declared_owner } => state.hub.connect_user(user_id, declared_owner.clone()).await,
        Peer::Owner { owner_id } => state.hub.connect_owner(owner_id),
    };
    let id = connection.id;
    let reply = connection.reply;
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        let mut rx = connection.rx;
        while let Some(event) = rx.recv().await {
            let frame = match event.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "Could not encode frame");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };
        let outcome = match &peer {
            Peer::User { user_id, .. } => match UserCommand::parse(&text) {
                Ok(cmd) => state.hub.handle_user(user_id, cmd).await.map_err(|e| e.client_event()),
                Err(e) => Err(ServerEvent::error(e.to_string())),
            },
            Peer::Owner { owner_id } => match OwnerCommand::parse(&text) {
                Ok(cmd) => state.hub.handle_owner(owner_id, cmd).await.map_err(|e| e.client_event()),
                Err(e) => Err(ServerEvent::error(e.to_string())),
            },
        };
        match outcome {
            Ok(Some(event)) | Err(event) => send_reply(&reply, event),
            Ok(None) => {}
        }
    }

    match &peer {
        Peer::User { user_id, .. } => state.hub.disconnect_user(user_id, id),
        Peer::Owner { owner_id } => state.hub.disconnect_owner(owner_id, id),
    }
    drop(reply);
    writer.abort();
    debug!(connection = id, "Socket closed");
}

fn send_reply(reply: &mpsc::Sender<ServerEvent>, event: ServerEvent) {
    if let Err(e) = reply.try_send(event) {
        warn!(error = %e, "Reply dropped");
    }
}
