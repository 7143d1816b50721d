//! Admin API errors and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relaydesk_agent::{EntryError, ExtractError, IngestError};
use relaydesk_core::error::{MemoryError, ProviderError, RoutingError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::hub::HubError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Missing or invalid credentials")]
    Unauthorized,

    #[error("Upstream service failed: {0}")]
    Upstream(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Upstream(_) => "upstream",
            Self::Storage(_) => "storage",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Storage(_) | Self::Upstream(_)) {
            error!(error = %self, "Admin request failed");
        }
        let body = json!({ "error": self.to_string(), "kind": self.kind() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<MemoryError> for ApiError {
    fn from(e: MemoryError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl From<ExtractError> for ApiError {
    fn from(e: ExtractError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::EmptyInput => Self::BadRequest(e.to_string()),
            IngestError::Extract(e) => e.into(),
            IngestError::Provider(e) => e.into(),
            IngestError::Memory(e) => e.into(),
        }
    }
}

impl From<EntryError> for ApiError {
    fn from(e: EntryError) -> Self {
        match e {
            EntryError::Invalid(_) => Self::BadRequest(e.to_string()),
            EntryError::NotFound(_) => Self::NotFound(e.to_string()),
            EntryError::Memory(e) => e.into(),
        }
    }
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::Invalid(msg) => Self::BadRequest(msg),
            HubError::Routing(e) => e.into(),
            HubError::Memory(e) => e.into(),
        }
    }
}

impl From<RoutingError> for ApiError {
    fn from(e: RoutingError) -> Self {
        match e {
            RoutingError::UnknownToken | RoutingError::TokenRequired => Self::Unauthorized,
            other => Self::BadRequest(other.to_string()),
        }
    }
}
