//! Authentication endpoints.
//!
//! POST   /api/auth/register     — create the site owner (only while none exists)
//! POST   /api/auth/login        — exchange credentials for a JWT
//! POST   /api/auth/logout       — close gateway connections using this credential
//! PUT    /api/auth/password     — change password, invalidating all sessions
//! GET    /api/auth/tokens       — list API tokens
//! POST   /api/auth/tokens       — issue an API token
//! DELETE /api/auth/tokens/{id}  — delete an API token and revoke its connections

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mx_common::auth::{self, Claims};
use mx_common::ids;
use mx_common::models::{ApiToken, User};

use crate::api::auth_extractor::AuthUser;
use crate::api::error::ApiError;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/password", put(change_password))
        .route("/tokens", post(create_token).get(list_tokens))
        .route("/tokens/{id}", delete(delete_token))
}

// ── Register ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub username: String,
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    if body.username.trim().is_empty() {
        return Err(ApiError::bad_request("username must not be empty"));
    }
    if body.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if state.identity().count_users().await? > 0 {
        return Err(ApiError::forbidden("the site owner is already registered"));
    }

    let user = User {
        id: ids::user_id(),
        username: body.username,
        password_hash: auth::hash_password(&body.password)?,
        auth_code: auth::generate_auth_code(),
        created_at: Utc::now(),
    };
    if !state.identity().insert_first_user(&user).await? {
        return Err(ApiError::forbidden("the site owner is already registered"));
    }

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            username: user.username,
        }),
    ))
}

// ── Login ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub username: String,
    pub expires_at: i64,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .identity()
        .find_user_by_username(&body.username)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid username or password"))?;

    if !auth::verify_password(&body.password, &user.password_hash)? {
        return Err(ApiError::unauthorized("invalid username or password"));
    }

    let claims = Claims::new(
        &user.id,
        &user.auth_code,
        Utc::now().timestamp(),
        state.jwt_ttl_secs(),
    );
    let token = state.jwt().create_token(&claims)?;

    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
        expires_at: claims.exp,
    }))
}

// ── Logout ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RevokedResponse {
    pub revoked: usize,
}

async fn logout(State(state): State<AppState>, user: AuthUser) -> Json<RevokedResponse> {
    let revoked = state.sweeper().on_credential_invalidated(&user.credential);
    tracing::info!(user_id = %user.principal.user_id, "user logged out");
    Json(RevokedResponse { revoked })
}

// ── Password ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<RevokedResponse>, ApiError> {
    if body.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let record = state
        .identity()
        .find_user(&user.principal.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    if !auth::verify_password(&body.old_password, &record.password_hash)? {
        return Err(ApiError::forbidden("old password does not match"));
    }

    let hash = auth::hash_password(&body.new_password)?;
    state
        .identity()
        .update_credentials(&record.id, &hash, &auth::generate_auth_code())
        .await?;

    let revoked = state.sweeper().on_auth_code_rotated(&record.id);

    tracing::info!(user_id = %record.id, "password changed");
    Ok(Json(RevokedResponse { revoked }))
}

// ── API tokens ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Returned once at creation; the only response that carries the secret.
#[derive(Debug, Serialize)]
pub struct CreatedToken {
    pub id: String,
    pub name: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

async fn create_token(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateTokenRequest>,
) -> Result<(StatusCode, Json<CreatedToken>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("token name must not be empty"));
    }
    let now = Utc::now();
    if body.expires_at.is_some_and(|t| t <= now) {
        return Err(ApiError::bad_request("expires_at must be in the future"));
    }

    let token = ApiToken {
        id: ids::api_token_id(),
        user_id: user.principal.user_id.clone(),
        name: body.name,
        token: auth::generate_api_token(),
        created_at: now,
        expires_at: body.expires_at,
    };
    state.identity().insert_api_token(&token).await?;

    tracing::info!(token_id = %token.id, user_id = %token.user_id, "api token issued");

    Ok((
        StatusCode::CREATED,
        Json(CreatedToken {
            id: token.id,
            name: token.name,
            token: token.token,
            created_at: token.created_at,
            expires_at: token.expires_at,
        }),
    ))
}

async fn list_tokens(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ApiToken>>, ApiError> {
    let tokens = state
        .identity()
        .list_api_tokens(&user.principal.user_id)
        .await?;
    Ok(Json(tokens))
}

async fn delete_token(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<RevokedResponse>, ApiError> {
    let token = state
        .identity()
        .delete_api_token(&user.principal.user_id, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("token not found"))?;

    let revoked = state.sweeper().on_credential_invalidated(&token.token);
    tracing::info!(token_id = %token.id, revoked, "api token deleted");
    Ok(Json(RevokedResponse { revoked }))
}
