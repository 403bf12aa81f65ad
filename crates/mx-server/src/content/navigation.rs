//! Navigation around an anchor item in creation order.
//!
//! Display order is `created` descending: "newer" items come before the
//! anchor, "older" items after it. All comparisons against the anchor are
//! strict, so an item sharing the anchor's exact timestamp is reachable
//! through neither direction.

use std::sync::Arc;

use serde::Serialize;

use mx_common::models::{ContentItem, ContentKind};

use super::ContentError;
use crate::store::{ContentStore, CreatedBound, Filter, OrderedQuery, Sort, Visibility};

/// An ordered run of items around an anchor, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct Window {
    pub items: Vec<ContentItem>,
    pub size: usize,
}

/// Immediate neighbors of an item. `prev` is newer, `next` is older.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Adjacent {
    pub prev: Option<ContentItem>,
    pub next: Option<ContentItem>,
}

/// The newest item and the one right after it.
#[derive(Debug, Clone, Serialize)]
pub struct Latest {
    pub latest: ContentItem,
    pub next: Option<ContentItem>,
}

pub struct NeighborWindowResolver {
    store: Arc<dyn ContentStore>,
    kind: ContentKind,
}

impl NeighborWindowResolver {
    pub fn new(store: Arc<dyn ContentStore>, kind: ContentKind) -> Self {
        Self { store, kind }
    }

    /// Look up a single item by id under `visibility`.
    pub async fn anchor(
        &self,
        anchor_id: &str,
        visibility: Visibility,
    ) -> Result<ContentItem, ContentError> {
        self.store
            .find_one(
                self.kind,
                &Filter::visible(visibility).with_id(anchor_id),
                Sort::created_desc(),
            )
            .await?
            .ok_or_else(|| ContentError::NotFound(format!("{} {anchor_id}", self.kind)))
    }

    /// Window of up to `window_size / 2 - 1` newer items, the anchor, and
    /// up to `window_size / 2` older items, ordered newest first.
    ///
    /// Sizes 0 and 1 return the anchor alone. Negative sizes are rejected.
    pub async fn resolve_window(
        &self,
        anchor_id: &str,
        window_size: i64,
        visibility: Visibility,
    ) -> Result<Window, ContentError> {
        if window_size < 0 {
            return Err(ContentError::invalid(format!(
                "window size must not be negative, got {window_size}"
            )));
        }

        let anchor = self.anchor(anchor_id, visibility).await?;
        let half = window_size / 2;

        let (newer, older) = tokio::try_join!(
            self.directional(CreatedBound::After(anchor.created), half - 1, visibility),
            self.directional(CreatedBound::Before(anchor.created), half, visibility),
        )?;

        let mut items = Vec::with_capacity(newer.len() + older.len() + 1);
        items.extend(newer);
        items.extend(older);
        items.push(anchor);
        let order = Sort::created_desc();
        items.sort_by(|a, b| order.compare(a, b));

        let size = items.len();
        Ok(Window { items, size })
    }

    /// Up to `limit` items on one side of the anchor, newest first. On the
    /// newer side these are the newest items overall, not the nearest.
    /// No query is issued when `limit <= 0`.
    async fn directional(
        &self,
        bound: CreatedBound,
        limit: i64,
        visibility: Visibility,
    ) -> Result<Vec<ContentItem>, ContentError> {
        self.bounded(bound, limit, Sort::created_desc(), visibility).await
    }

    async fn bounded(
        &self,
        bound: CreatedBound,
        limit: i64,
        sort: Sort,
        visibility: Visibility,
    ) -> Result<Vec<ContentItem>, ContentError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let filter = Filter::visible(visibility).with_created(bound);
        Ok(self
            .store
            .find(self.kind, &filter, &OrderedQuery::first(limit as u64, sort))
            .await?)
    }

    /// The closest newer and older items relative to `anchor`.
    pub async fn adjacent(
        &self,
        anchor: &ContentItem,
        visibility: Visibility,
    ) -> Result<Adjacent, ContentError> {
        let (prev, next) = tokio::try_join!(
            self.bounded(CreatedBound::After(anchor.created), 1, Sort::created_asc(), visibility),
            self.bounded(CreatedBound::Before(anchor.created), 1, Sort::created_desc(), visibility),
        )?;
        Ok(Adjacent {
            prev: prev.into_iter().next(),
            next: next.into_iter().next(),
        })
    }

    pub async fn latest(&self, visibility: Visibility) -> Result<Latest, ContentError> {
        let mut newest = self
            .store
            .find(
                self.kind,
                &Filter::visible(visibility),
                &OrderedQuery::first(2, Sort::created_desc()),
            )
            .await?
            .into_iter();
        let latest = newest
            .next()
            .ok_or_else(|| ContentError::NotFound(format!("no {} yet", self.kind)))?;
        Ok(Latest {
            latest,
            next: newest.next(),
        })
    }
}
