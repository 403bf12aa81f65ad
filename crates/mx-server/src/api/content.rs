//! Handlers shared by the posts, notes and pages routes.

use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use mx_common::models::{ContentDraft, ContentItem, ContentKind, ContentPatch};
use mx_common::protocol::ContentChange;

use crate::api::auth_extractor::Viewer;
use crate::api::error::ApiError;
use crate::content::pagination::{PageRequest, Paginated, Projection};
use crate::content::search::KeywordQuery;
use crate::content::ContentError;
use crate::state::AppState;
use crate::store::{Filter, Sort};

fn default_page() -> i64 {
    1
}

fn default_size() -> i64 {
    10
}

/// `?page=&size=&select=&sort_by=&sort_order=&year=`
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
    pub select: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<i64>,
    pub year: Option<i32>,
}

impl ListQuery {
    fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            size: self.size,
            sort_by: self.sort_by.clone(),
            sort_order: self.sort_order,
        }
    }
}

/// `?keyword=&page=&size=`
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub keyword: String,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
}

/// Serialize an item for `viewer`. Password-gated bodies are withheld from
/// anonymous callers.
pub fn present(item: &ContentItem, viewer: &Viewer) -> Value {
    let mut value = serde_json::to_value(item).unwrap_or(Value::Null);
    if item.is_password_gated() && !viewer.is_master() {
        if let Value::Object(ref mut map) = value {
            map.insert("text".into(), Value::String(String::new()));
            map.insert("summary".into(), Value::Null);
            map.insert("password_required".into(), Value::Bool(true));
        }
    }
    value
}

pub fn present_opt(item: Option<&ContentItem>, viewer: &Viewer) -> Value {
    item.map_or(Value::Null, |i| present(i, viewer))
}

/// Refuse gated items to anonymous callers without the right password.
pub fn check_gate(
    item: &ContentItem,
    viewer: &Viewer,
    password: Option<&str>,
) -> Result<(), ContentError> {
    if viewer.is_master() || item.password_matches(password) {
        Ok(())
    } else {
        Err(ContentError::Forbidden("password required".into()))
    }
}

pub async fn list(
    state: &AppState,
    kind: ContentKind,
    viewer: &Viewer,
    query: &ListQuery,
) -> Result<Json<Paginated<Value>>, ApiError> {
    let ordered = query.page_request().to_query()?;
    let projection = Projection::parse(query.select.as_deref().unwrap_or(""))?;
    let filter = Filter::visible(viewer.visibility()).with_year(query.year);

    let content = state.content();
    let (items, total) = tokio::try_join!(
        content.find(kind, &filter, &ordered),
        content.count(kind, &filter),
    )?;

    let data = items
        .iter()
        .map(|item| {
            let value = present(item, viewer);
            match projection {
                Some(ref p) => p.apply(value),
                None => value,
            }
        })
        .collect();

    Ok(Json(Paginated::new(data, &ordered, total)))
}

pub async fn search(
    state: &AppState,
    kind: ContentKind,
    viewer: &Viewer,
    query: &SearchQuery,
) -> Result<Json<Paginated<Value>>, ApiError> {
    let keywords = KeywordQuery::parse(&query.keyword)?;
    let ordered = PageRequest::new(query.page, query.size).to_query()?;
    let filter = Filter::visible(viewer.visibility()).with_keywords(keywords);

    let content = state.content();
    let (items, total) = tokio::try_join!(
        content.find(kind, &filter, &ordered),
        content.count(kind, &filter),
    )?;

    let data = items.iter().map(|item| present(item, viewer)).collect();
    Ok(Json(Paginated::new(data, &ordered, total)))
}

/// Look up a single item by an alternate key under the viewer's visibility.
pub async fn find_by(
    state: &AppState,
    kind: ContentKind,
    viewer: &Viewer,
    filter: Filter,
    what: &str,
) -> Result<ContentItem, ApiError> {
    let filter = Filter {
        visibility: viewer.visibility(),
        ..filter
    };
    state
        .content()
        .find_one(kind, &filter, Sort::created_desc())
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{kind} {what} not found")))
}

fn check_draft(kind: ContentKind, draft: &mut ContentDraft) -> Result<(), ApiError> {
    if draft.title.trim().is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    match kind {
        // Notes are addressed by nid.
        ContentKind::Note => draft.slug = None,
        ContentKind::Post | ContentKind::Page => {
            if draft.slug.as_deref().is_none_or(|s| s.trim().is_empty()) {
                return Err(ApiError::bad_request("slug is required"));
            }
        }
    }
    Ok(())
}

pub async fn create(
    state: &AppState,
    kind: ContentKind,
    mut draft: ContentDraft,
) -> Result<(StatusCode, Json<ContentItem>), ApiError> {
    check_draft(kind, &mut draft)?;
    let item = state.content().insert(kind, draft).await?;

    tracing::info!(kind = %kind, id = %item.id, "content created");
    state.broadcast_content(kind, ContentChange::Create, &item);

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update(
    state: &AppState,
    kind: ContentKind,
    id: &str,
    mut patch: ContentPatch,
) -> Result<Json<ContentItem>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::bad_request("nothing to update"));
    }
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    match kind {
        ContentKind::Note => patch.slug = None,
        ContentKind::Post | ContentKind::Page => {
            if patch.slug.as_deref().is_some_and(|s| s.trim().is_empty()) {
                return Err(ApiError::bad_request("slug must not be empty"));
            }
        }
    }

    let item = state
        .content()
        .update(kind, id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{kind} {id} not found")))?;

    tracing::info!(kind = %kind, id = %item.id, "content updated");
    state.broadcast_content(kind, ContentChange::Update, &item);

    Ok(Json(item))
}

pub async fn remove(state: &AppState, kind: ContentKind, id: &str) -> Result<StatusCode, ApiError> {
    if !state.content().delete(kind, id).await? {
        return Err(ApiError::not_found(format!("{kind} {id} not found")));
    }

    tracing::info!(kind = %kind, id = %id, "content deleted");
    state.broadcast_content(kind, ContentChange::Delete, json!({ "id": id }));

    Ok(StatusCode::NO_CONTENT)
}
