//! Site options (admin only).
//!
//! GET   /api/options        — every section
//! GET   /api/options/stat   — item counts
//! PATCH /api/options/{key}  — merge, validate and store one section

use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde_json::Value;

use crate::api::auth_extractor::AuthUser;
use crate::api::error::ApiError;
use crate::options::{ConfigKey, Stat};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_all))
        .route("/stat", get(stat))
        .route("/{key}", patch(patch_section))
}

async fn get_all(State(state): State<AppState>, _user: AuthUser) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.options().get_all().await?))
}

async fn stat(State(state): State<AppState>, _user: AuthUser) -> Result<Json<Stat>, ApiError> {
    Ok(Json(state.options().stat().await?))
}

async fn patch_section(
    State(state): State<AppState>,
    user: AuthUser,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let key: ConfigKey = key.parse()?;
    let stored = state.options().patch(key, body).await?;
    tracing::debug!(user_id = %user.principal.user_id, key = key.as_str(), "options patched");
    Ok(Json(stored))
}
