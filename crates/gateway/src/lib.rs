//! HTTP and WebSocket gateway for RelayDesk.
//!
//! Serves the live chat socket at `/ws`, the admin API under `/api`
//! and a health probe at `/health`.
//!
//! Built on Axum; every route shares one [`AppState`].

pub mod api;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod session;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use hub::{ChatHub, HubError};
pub use protocol::{OwnerCommand, ServerEvent, UserCommand};
pub use session::{Connection, ConnectionId, Endpoint, SessionRouter};
pub use state::{AppState, SharedState, Stores};

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Uploads carry whole documents, so the admin API accepts large bodies.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Build the complete router: health, chat socket and the guarded admin API.
pub fn build_router(state: SharedState) -> Router {
    let admin = api::router().layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws::ws_handler))
        .nest("/api", admin)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway server and run until the listener fails.
pub async fn start(config: relaydesk_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = relaydesk_providers::router::build_from_config(&config).primary();
    let stores = Stores::from_config(&config.storage).await?;
    let state = AppState::new(config, provider, stores);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Bearer check for `/api`. With no admin tokens configured, everything passes.
async fn auth_middleware(State(state): State<SharedState>, req: axum::extract::Request, next: Next) -> Response {
    let tokens = &state.config.gateway.admin_tokens;
    if tokens.is_empty() {
        return next.run(req).await;
    }

    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match auth_header {
        Some(token) if tokens.iter().any(|t| t == token) => next.run(req).await,
        _ => {
            warn!(path = %req.uri().path(), "Unauthorized admin request");
            ApiError::Unauthorized.into_response()
        }
    }
}
