//! Post endpoints.
//!
//! GET    /api/posts              — paginated list
//! GET    /api/posts/search       — keyword search
//! GET    /api/posts/slug/{slug}  — one post by slug
//! GET    /api/posts/{id}         — one post by id
//! POST   /api/posts              — create (admin)
//! PUT    /api/posts/{id}         — update (admin)
//! DELETE /api/posts/{id}         — delete (admin)

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use mx_common::models::{ContentDraft, ContentItem, ContentKind, ContentPatch};

use crate::api::auth_extractor::{AuthUser, Viewer};
use crate::api::content::{self, ListQuery, SearchQuery};
use crate::api::error::ApiError;
use crate::content::pagination::Paginated;
use crate::state::AppState;
use crate::store::Filter;

const KIND: ContentKind = ContentKind::Post;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/search", get(search))
        .route("/slug/{slug}", get(get_by_slug))
        .route("/{id}", get(get_one).put(update).delete(remove))
}

async fn list(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<Value>>, ApiError> {
    content::list(&state, KIND, &viewer, &query).await
}

async fn search(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Paginated<Value>>, ApiError> {
    content::search(&state, KIND, &viewer, &query).await
}

async fn get_by_slug(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(slug): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let item = content::find_by(&state, KIND, &viewer, Filter::default().with_slug(&slug), &slug)
        .await?;
    Ok(Json(content::present(&item, &viewer)))
}

async fn get_one(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let item = content::find_by(&state, KIND, &viewer, Filter::default().with_id(&id), &id).await?;
    Ok(Json(content::present(&item, &viewer)))
}

async fn create(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(draft): Json<ContentDraft>,
) -> Result<(StatusCode, Json<ContentItem>), ApiError> {
    content::create(&state, KIND, draft).await
}

async fn update(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<ContentPatch>,
) -> Result<Json<ContentItem>, ApiError> {
    content::update(&state, KIND, &id, patch).await
}

async fn remove(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    content::remove(&state, KIND, &id).await
}
