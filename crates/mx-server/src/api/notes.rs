//! Note endpoints.
//!
//! GET    /api/notes               — paginated list
//! GET    /api/notes/latest        — newest note and the one after it
//! GET    /api/notes/search        — keyword search
//! GET    /api/notes/list/{id}     — window of notes around `id`
//! GET    /api/notes/{id}          — one note with prev/next
//! GET    /api/notes/nid/{nid}     — one note by number, with prev/next
//! POST   /api/notes               — create (admin)
//! PUT    /api/notes/{id}          — update (admin)
//! DELETE /api/notes/{id}          — delete (admin)

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use mx_common::models::{ContentDraft, ContentItem, ContentKind, ContentPatch};

use crate::api::auth_extractor::{AuthUser, Viewer};
use crate::api::content::{self, ListQuery, SearchQuery};
use crate::api::error::ApiError;
use crate::content::pagination::Paginated;
use crate::state::AppState;
use crate::store::Filter;

const KIND: ContentKind = ContentKind::Note;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/latest", get(latest))
        .route("/search", get(search))
        .route("/list/{id}", get(window))
        .route("/nid/{nid}", get(get_by_nid))
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

async fn latest(State(state): State<AppState>, viewer: Viewer) -> Result<Json<Value>, ApiError> {
    let latest = state.navigator(KIND).latest(viewer.visibility()).await?;
    Ok(Json(json!({
        "data": content::present(&latest.latest, &viewer),
        "next": content::present_opt(latest.next.as_ref(), &viewer),
    })))
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default = "default_window")]
    pub size: i64,
}

fn default_window() -> i64 {
    10
}

async fn window(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Value>, ApiError> {
    let window = state
        .navigator(KIND)
        .resolve_window(&id, query.size, viewer.visibility())
        .await?;
    let data: Vec<Value> = window
        .items
        .iter()
        .map(|item| content::present(item, &viewer))
        .collect();
    Ok(Json(json!({ "data": data, "size": window.size })))
}

#[derive(Debug, Deserialize)]
pub struct PasswordQuery {
    pub password: Option<String>,
}

/// The note plus its neighbors, after the password gate.
async fn with_neighbors(
    state: &AppState,
    viewer: &Viewer,
    item: ContentItem,
    password: Option<&str>,
) -> Result<Json<Value>, ApiError> {
    content::check_gate(&item, viewer, password)?;
    let adjacent = state
        .navigator(KIND)
        .adjacent(&item, viewer.visibility())
        .await?;
    Ok(Json(json!({
        "data": item,
        "prev": content::present_opt(adjacent.prev.as_ref(), viewer),
        "next": content::present_opt(adjacent.next.as_ref(), viewer),
    })))
}

async fn get_one(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
    Query(query): Query<PasswordQuery>,
) -> Result<Json<Value>, ApiError> {
    let item = state
        .navigator(KIND)
        .anchor(&id, viewer.visibility())
        .await?;
    with_neighbors(&state, &viewer, item, query.password.as_deref()).await
}

async fn get_by_nid(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(nid): Path<i64>,
    Query(query): Query<PasswordQuery>,
) -> Result<Json<Value>, ApiError> {
    let item = content::find_by(
        &state,
        KIND,
        &viewer,
        Filter::default().with_nid(nid),
        &format!("#{nid}"),
    )
    .await?;
    with_neighbors(&state, &viewer, item, query.password.as_deref()).await
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
