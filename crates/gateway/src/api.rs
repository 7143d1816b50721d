//! Admin HTTP API, nested under `/api`.
//!
//! Endpoints:
//!
//! - `GET    /conversations`                        List conversation summaries
//! - `GET    /conversations/{userId}`               One conversation
//! - `PUT    /conversations/{userId}/metadata`      Set contact info / owner
//! - `GET    /ai-state/{userId}`                    Current takeover state
//! - `POST   /ai-state/{userId}/reset`              Give control back to the AI
//! - `POST   /owners/{ownerId}/resources`           Ingest a PDF/TXT/JSON resource
//! - `GET    /owners/{ownerId}/knowledge`           Namespace stats
//! - `DELETE /owners/{ownerId}/knowledge`           Clear the namespace
//! - `GET    /owners/{ownerId}/{qa|products}`       List entries
//! - `POST   /owners/{ownerId}/{qa|products}`       Create an entry
//! - `PUT    /owners/{ownerId}/{qa|products}/{id}`  Update an entry
//! - `DELETE /owners/{ownerId}/{qa|products}/{id}`  Delete an entry
//! - `GET    /owners/{ownerId}/website`             Website used for citations
//! - `PUT    /owners/{ownerId}/website`             Set or clear it

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use relaydesk_agent::{EntryDeletion, EntryDraft, EntryWrite, IngestReport};
use relaydesk_core::conversation::{Conversation, ConversationSummary};
use relaydesk_core::identity::{OwnerId, UserId};
use relaydesk_core::knowledge::NamespaceStats;
use relaydesk_core::store::{AiState, EntryKind, KnowledgeEntry, OwnerSettings};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::protocol::MetadataUpdate;
use crate::state::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/conversations/{user_id}", get(get_conversation))
        .route("/conversations/{user_id}/metadata", put(set_metadata))
        .route("/ai-state/{user_id}", get(get_ai_state))
        .route("/ai-state/{user_id}/reset", post(reset_ai_state))
        .route("/owners/{owner_id}/resources", post(ingest_resource))
        .route("/owners/{owner_id}/knowledge", get(knowledge_stats).delete(clear_knowledge))
        .route("/owners/{owner_id}/website", get(get_website).put(set_website))
        .route("/owners/{owner_id}/{collection}", get(list_entries).post(create_entry))
        .route("/owners/{owner_id}/{collection}/{id}", put(update_entry).delete(delete_entry))
}

/// URL segment naming an entry collection.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Collection {
    Qa,
    Products,
}

impl From<Collection> for EntryKind {
    fn from(c: Collection) -> Self {
        match c {
            Collection::Qa => EntryKind::Qa,
            Collection::Products => EntryKind::Product,
        }
    }
}

// ── Conversations ─────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
    pub count: usize,
}

async fn list_conversations(State(state): State<SharedState>) -> Result<Json<ConversationListResponse>, ApiError> {
    let conversations = state.conversations.list().await?;
    Ok(Json(ConversationListResponse {
        count: conversations.len(),
        conversations,
    }))
}

async fn get_conversation(
    State(state): State<SharedState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Conversation>, ApiError> {
    state
        .conversations
        .get(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No conversation for user {user_id}")))
}

async fn set_metadata(
    State(state): State<SharedState>,
    Path(user_id): Path<UserId>,
    Json(update): Json<MetadataUpdate>,
) -> Result<Json<Conversation>, ApiError> {
    state.hub.set_metadata(&user_id, update).await?;
    state
        .conversations
        .get(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No conversation for user {user_id}")))
}

// ── AI state ──────────────────────────────────────────────────────────────

async fn get_ai_state(State(state): State<SharedState>, Path(user_id): Path<UserId>) -> Result<Json<AiState>, ApiError> {
    Ok(Json(state.hub.ai_state(&user_id).await?))
}

async fn reset_ai_state(
    State(state): State<SharedState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<AiState>, ApiError> {
    Ok(Json(state.hub.reset_ai(&user_id).await?))
}

// ── Knowledge base ────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceUpload {
    file_name: String,
    content_type: String,
    /// UTF-8 content (text, JSON).
    #[serde(default)]
    content: Option<String>,
    /// Base64 content (PDF or any binary upload).
    #[serde(default)]
    content_base64: Option<String>,
}

impl ResourceUpload {
    fn bytes(&self) -> Result<Vec<u8>, ApiError> {
        match (&self.content, &self.content_base64) {
            (Some(text), None) => Ok(text.as_bytes().to_vec()),
            (None, Some(encoded)) => BASE64
                .decode(encoded.trim())
                .map_err(|e| ApiError::BadRequest(format!("Invalid base64 content: {e}"))),
            _ => Err(ApiError::BadRequest(
                "Provide exactly one of content or contentBase64".into(),
            )),
        }
    }
}

async fn ingest_resource(
    State(state): State<SharedState>,
    Path(owner_id): Path<OwnerId>,
    Json(upload): Json<ResourceUpload>,
) -> Result<(StatusCode, Json<IngestReport>), ApiError> {
    if upload.file_name.trim().is_empty() {
        return Err(ApiError::BadRequest("fileName must not be empty".into()));
    }
    let bytes = upload.bytes()?;
    let report = state
        .pipeline
        .ingest_document(&owner_id, &upload.file_name, &upload.content_type, &bytes)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn knowledge_stats(
    State(state): State<SharedState>,
    Path(owner_id): Path<OwnerId>,
) -> Result<Json<NamespaceStats>, ApiError> {
    Ok(Json(state.pipeline.stats(&owner_id).await?))
}

async fn clear_knowledge(
    State(state): State<SharedState>,
    Path(owner_id): Path<OwnerId>,
) -> Result<StatusCode, ApiError> {
    state.pipeline.clear(&owner_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Q&A and product entries ───────────────────────────────────────────────

async fn list_entries(
    State(state): State<SharedState>,
    Path((owner_id, collection)): Path<(OwnerId, Collection)>,
) -> Result<Json<Vec<KnowledgeEntry>>, ApiError> {
    Ok(Json(state.entries.list(&owner_id, collection.into()).await?))
}

async fn create_entry(
    State(state): State<SharedState>,
    Path((owner_id, collection)): Path<(OwnerId, Collection)>,
    Json(draft): Json<EntryDraft>,
) -> Result<(StatusCode, Json<EntryWrite>), ApiError> {
    let write = state.entries.create(&owner_id, collection.into(), draft).await?;
    info!(owner_id = %owner_id, entry_id = %write.entry.id, indexed = write.indexed, "Entry created");
    Ok((StatusCode::CREATED, Json(write)))
}

async fn update_entry(
    State(state): State<SharedState>,
    Path((owner_id, collection, id)): Path<(OwnerId, Collection, String)>,
    Json(draft): Json<EntryDraft>,
) -> Result<Json<EntryWrite>, ApiError> {
    Ok(Json(state.entries.update(&owner_id, collection.into(), &id, draft).await?))
}

async fn delete_entry(
    State(state): State<SharedState>,
    Path((owner_id, collection, id)): Path<(OwnerId, Collection, String)>,
) -> Result<Json<EntryDeletion>, ApiError> {
    Ok(Json(state.entries.delete(&owner_id, collection.into(), &id).await?))
}

// ── Website ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebsiteRequest {
    #[serde(default)]
    website_url: Option<String>,
}

async fn get_website(
    State(state): State<SharedState>,
    Path(owner_id): Path<OwnerId>,
) -> Result<Json<OwnerSettings>, ApiError> {
    let settings = state.owner_settings.get_settings(&owner_id).await?.unwrap_or(OwnerSettings {
        owner_id,
        website_url: None,
    });
    Ok(Json(settings))
}

async fn set_website(
    State(state): State<SharedState>,
    Path(owner_id): Path<OwnerId>,
    Json(req): Json<WebsiteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let url = req.website_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
    if let Some(url) = &url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ApiError::BadRequest("websiteUrl must start with http:// or https://".into()));
        }
    }
    Ok(Json(state.owner_settings.set_website(&owner_id, url).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{DIMS, state_with};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use relaydesk_agent::testing::ScriptedProvider;
    use relaydesk_memory::InMemoryStore;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app() -> Router {
        let state = state_with(ScriptedProvider::new(DIMS), InMemoryStore::new());
        router().with_state(state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                req = req.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn missing_conversation_is_404_with_kind() {
        let app = app();
        let (status, body) = send(&app, "GET", "/conversations/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn metadata_creates_and_lists_conversation() {
        let app = app();
        let (status, body) = send(
            &app,
            "PUT",
            "/conversations/u1/metadata",
            Some(json!({"email": "dana@example.com", "ownerId": "acme"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ownerId"], "acme");
        assert_eq!(body["contact"]["email"], "dana@example.com");

        let (_, list) = send(&app, "GET", "/conversations", None).await;
        assert_eq!(list["count"], 1);
    }

    #[tokio::test]
    async fn ai_state_defaults_and_resets() {
        let app = app();
        let (_, body) = send(&app, "GET", "/ai-state/u1", None).await;
        assert_eq!(body["aiActive"], true);
        let (status, body) = send(&app, "POST", "/ai-state/u1/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["userId"], "u1");
    }

    #[tokio::test]
    async fn ingest_then_stats_then_clear() {
        let app = app();
        let (status, report) = send(
            &app,
            "POST",
            "/owners/acme/resources",
            Some(json!({
                "fileName": "hours.json",
                "contentType": "application/json",
                "content": "{\"hours\":\"9-5 Mon-Fri\"}"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(report["chunksStored"], 1);
        assert_eq!(report["collection"], "owner-61636d65");

        let (_, stats) = send(&app, "GET", "/owners/acme/knowledge", None).await;
        assert_eq!(stats["count"], 1);
        assert_eq!(stats["exists"], true);

        let (status, _) = send(&app, "DELETE", "/owners/acme/knowledge", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, stats) = send(&app, "GET", "/owners/acme/knowledge", None).await;
        assert_eq!(stats["exists"], false);
    }

    #[tokio::test]
    async fn base64_text_upload_is_accepted() {
        let app = app();
        let (status, _) = send(
            &app,
            "POST",
            "/owners/acme/resources",
            Some(json!({
                "fileName": "faq.txt",
                "contentType": "text/plain",
                "contentBase64": BASE64.encode("Refunds within 30 days")
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn malformed_uploads_are_400() {
        let app = app();
        for body in [
            json!({"fileName": "x.json", "contentType": "application/json", "content": "{oops"}),
            json!({"fileName": "x.txt", "contentType": "text/plain", "content": "   "}),
            json!({"fileName": "x.png", "contentType": "image/png", "content": "png"}),
            json!({"fileName": "x.txt", "contentType": "text/plain"}),
        ] {
            let (status, err) = send(&app, "POST", "/owners/acme/resources", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(err["kind"], "bad_request");
        }
    }

    #[tokio::test]
    async fn qa_crud_roundtrip() {
        let app = app();
        let (status, created) = send(
            &app,
            "POST",
            "/owners/acme/qa",
            Some(json!({"question": "Do you deliver?", "answer": "Within 5 miles"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["indexed"], true);
        let id = created["entry"]["id"].as_str().unwrap().to_string();

        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/owners/acme/qa/{id}"),
            Some(json!({"title": "Do you deliver?", "body": "Within 10 miles"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["entry"]["body"], "Within 10 miles");

        let (_, list) = send(&app, "GET", "/owners/acme/qa", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        let (_, products) = send(&app, "GET", "/owners/acme/products", None).await;
        assert!(products.as_array().unwrap().is_empty());

        let (status, deleted) = send(&app, "DELETE", &format!("/owners/acme/qa/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["unindexed"], true);

        let (status, _) = send(&app, "DELETE", &format!("/owners/acme/qa/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_collection_is_rejected() {
        let app = app();
        let (status, _) = send(&app, "GET", "/owners/acme/coupons", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn website_set_get_and_validate() {
        let app = app();
        let (_, body) = send(&app, "GET", "/owners/acme/website", None).await;
        assert!(body.get("websiteUrl").is_none());

        let (status, _) = send(
            &app,
            "PUT",
            "/owners/acme/website",
            Some(json!({"websiteUrl": "https://acme.example"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, "GET", "/owners/acme/website", None).await;
        assert_eq!(body["websiteUrl"], "https://acme.example");

        let (status, _) = send(&app, "PUT", "/owners/acme/website", Some(json!({"websiteUrl": "ftp://x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
