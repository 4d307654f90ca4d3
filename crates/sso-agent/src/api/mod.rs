//! HTTP surface of the agent
//!
//! The agent itself exposes only read-only endpoints: a liveness check and
//! the signed revocation list that verify-only peers pull. Revocations are
//! driven internally via [`crate::store::SessionStore::revoke`]; there are no
//! mutation endpoints.

pub mod error;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use sso_core::SignedRevocationList;

use crate::store::SessionStore;
use error::ApiError;

/// Shared state of the HTTP handlers
pub struct AppState {
    pub store: Arc<SessionStore>,
    /// Bearer tokens accepted on `/revocations`; any match grants access
    pub revocation_tokens: Vec<String>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("no authorization header found".into()))?;
    let header = header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("authorization header is invalid".into()))?;
    match header.split_once(' ') {
        Some(("Bearer", token)) => Ok(token),
        _ => Err(ApiError::Unauthorized(
            "authorization header is invalid".into(),
        )),
    }
}

/// Signed revocation list endpoint
///
/// GET /revocations
pub async fn revocations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SignedRevocationList>, ApiError> {
    let token = bearer_token(&headers)?;
    if !state.revocation_tokens.iter().any(|t| t == token) {
        return Err(ApiError::Unauthorized("unauthorized token".into()));
    }

    let list = state.store.list_revoked().await?;
    Ok(Json(list))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/revocations", get(revocations))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
