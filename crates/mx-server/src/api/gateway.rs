//! Admin gateway management (admin only).
//!
//! GET  /api/gateway/clients       — live connections
//! GET  /api/gateway/clients/{id}  — one live connection
//! POST /api/gateway/revoke        — close every connection using a credential

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::auth_extractor::AuthUser;
use crate::api::error::ApiError;
use crate::gateway::ConnectionSnapshot;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients))
        .route("/clients/{id}", get(get_client))
        .route("/revoke", post(revoke))
}

async fn list_clients(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Json<Vec<ConnectionSnapshot>> {
    Json(state.registry().snapshot())
}

async fn get_client(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ConnectionSnapshot>, ApiError> {
    state
        .registry()
        .find(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("connection {id} not found")))
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub credential: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: usize,
}

async fn revoke(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(body): Json<RevokeRequest>,
) -> Result<Json<RevokeResponse>, ApiError> {
    if body.credential.is_empty() {
        return Err(ApiError::bad_request("credential must not be empty"));
    }
    let revoked = state.sweeper().on_credential_invalidated(&body.credential);
    Ok(Json(RevokeResponse { revoked }))
}
