//! Persistence collaborators.
//!
//! The server only talks to storage through the three traits below. Two
//! implementations exist: [`pg`] (PostgreSQL via sqlx) and [`memory`]
//! (used when no database is configured, and by tests).

pub mod memory;
pub mod pg;

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;

use mx_common::models::{ApiToken, ContentDraft, ContentItem, ContentKind, ContentPatch, User};

use crate::content::search::KeywordQuery;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

// ── Query shape ─────────────────────────────────────────────────────

/// Whether hidden items are part of the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Anonymous callers: hidden items are filtered out.
    #[default]
    PublicOnly,
    /// Authenticated admin: everything is visible.
    IncludeHidden,
}

impl Visibility {
    pub fn for_caller(is_master: bool) -> Self {
        if is_master {
            Visibility::IncludeHidden
        } else {
            Visibility::PublicOnly
        }
    }
}

/// Strict bound on the ordering key relative to an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedBound {
    /// `created > t` (newer).
    After(DateTime<Utc>),
    /// `created < t` (older).
    Before(DateTime<Utc>),
}

/// Equality/range filter over a content collection.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub id: Option<String>,
    pub nid: Option<i64>,
    pub slug: Option<String>,
    pub visibility: Visibility,
    pub created: Option<CreatedBound>,
    /// Calendar year (UTC) of `created`.
    pub year: Option<i32>,
    pub keywords: Option<KeywordQuery>,
}

impl Filter {
    pub fn visible(visibility: Visibility) -> Self {
        Self {
            visibility,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_nid(mut self, nid: i64) -> Self {
        self.nid = Some(nid);
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_created(mut self, bound: CreatedBound) -> Self {
        self.created = Some(bound);
        self
    }

    pub fn with_year(mut self, year: Option<i32>) -> Self {
        self.year = year;
        self
    }

    pub fn with_keywords(mut self, keywords: KeywordQuery) -> Self {
        self.keywords = Some(keywords);
        self
    }

    /// Evaluate the filter against a single item.
    pub fn matches(&self, item: &ContentItem) -> bool {
        if self.id.as_deref().is_some_and(|id| id != item.id) {
            return false;
        }
        if self.nid.is_some() && self.nid != item.nid {
            return false;
        }
        if self.slug.is_some() && self.slug != item.slug {
            return false;
        }
        if self.visibility == Visibility::PublicOnly && item.hidden {
            return false;
        }
        match self.created {
            Some(CreatedBound::After(t)) if item.created <= t => return false,
            Some(CreatedBound::Before(t)) if item.created >= t => return false,
            _ => {}
        }
        if self.year.is_some_and(|year| item.created.year() != year) {
            return false;
        }
        if let Some(ref keywords) = self.keywords {
            if !keywords.matches(&item.title, &item.text) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Created,
    Modified,
    Title,
    Nid,
}

impl SortField {
    /// Parse a client-supplied field name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "created" => Some(SortField::Created),
            "modified" => Some(SortField::Modified),
            "title" => Some(SortField::Title),
            "nid" => Some(SortField::Nid),
            _ => None,
        }
    }

    /// Backing column name.
    pub fn column(self) -> &'static str {
        match self {
            SortField::Created => "created",
            SortField::Modified => "modified",
            SortField::Title => "title",
            SortField::Nid => "nid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Sort specification. Ties on the field are broken by `id` in the same
/// direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Sort {
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub const fn created_desc() -> Self {
        Self::new(SortField::Created, SortDirection::Desc)
    }

    pub const fn created_asc() -> Self {
        Self::new(SortField::Created, SortDirection::Asc)
    }

    /// Total order over items according to this sort.
    pub fn compare(&self, a: &ContentItem, b: &ContentItem) -> Ordering {
        let by_field = match self.field {
            SortField::Created => a.created.cmp(&b.created),
            SortField::Modified => a.modified.cmp(&b.modified),
            SortField::Title => a.title.cmp(&b.title),
            SortField::Nid => a.nid.cmp(&b.nid),
        };
        let ord = by_field.then_with(|| a.id.cmp(&b.id));
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self::created_desc()
    }
}

/// Bounded, ordered query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedQuery {
    pub skip: u64,
    pub limit: u64,
    pub sort: Sort,
}

impl OrderedQuery {
    /// First `limit` items in `sort` order.
    pub fn first(limit: u64, sort: Sort) -> Self {
        Self {
            skip: 0,
            limit,
            sort,
        }
    }
}

// ── Traits ──────────────────────────────────────────────────────────

/// Ordered collection of posts, notes, and pages.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// First item matching `filter` in `sort` order.
    async fn find_one(
        &self,
        kind: ContentKind,
        filter: &Filter,
        sort: Sort,
    ) -> Result<Option<ContentItem>, StoreError>;

    async fn find(
        &self,
        kind: ContentKind,
        filter: &Filter,
        query: &OrderedQuery,
    ) -> Result<Vec<ContentItem>, StoreError>;

    async fn count(&self, kind: ContentKind, filter: &Filter) -> Result<u64, StoreError>;

    /// Insert a new item. Notes get the next sequential `nid`.
    async fn insert(&self, kind: ContentKind, draft: ContentDraft)
        -> Result<ContentItem, StoreError>;

    async fn update(
        &self,
        kind: ContentKind,
        id: &str,
        patch: &ContentPatch,
    ) -> Result<Option<ContentItem>, StoreError>;

    async fn delete(&self, kind: ContentKind, id: &str) -> Result<bool, StoreError>;
}

/// Users and pre-issued API tokens.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn count_users(&self) -> Result<u64, StoreError>;

    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Insert `user` only if no user exists yet, checked and written as one
    /// step. Returns `false` when another user is already present.
    async fn insert_first_user(&self, user: &User) -> Result<bool, StoreError>;

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Replace the password hash and auth code. Returns `false` if the
    /// user does not exist.
    async fn update_credentials(
        &self,
        id: &str,
        password_hash: &str,
        auth_code: &str,
    ) -> Result<bool, StoreError>;

    async fn insert_api_token(&self, token: &ApiToken) -> Result<(), StoreError>;

    /// Look up a token record by its secret.
    async fn find_api_token(&self, secret: &str) -> Result<Option<ApiToken>, StoreError>;

    async fn list_api_tokens(&self, user_id: &str) -> Result<Vec<ApiToken>, StoreError>;

    /// Delete a token owned by `user_id`, returning the removed record.
    async fn delete_api_token(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<ApiToken>, StoreError>;
}

/// Key/value site configuration.
#[async_trait]
pub trait OptionStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn save(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;
}

/// The set of stores the server runs against.
#[derive(Clone)]
pub struct Backend {
    pub content: Arc<dyn ContentStore>,
    pub identity: Arc<dyn IdentityStore>,
    pub options: Arc<dyn OptionStore>,
}

impl Backend {
    /// All stores in process memory.
    pub fn memory() -> Self {
        Self {
            content: Arc::new(memory::MemoryContentStore::default()),
            identity: Arc::new(memory::MemoryIdentityStore::default()),
            options: Arc::new(memory::MemoryOptionStore::default()),
        }
    }

    /// All stores backed by one PostgreSQL pool.
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            content: Arc::new(pg::PgContentStore::new(pool.clone())),
            identity: Arc::new(pg::PgIdentityStore::new(pool.clone())),
            options: Arc::new(pg::PgOptionStore::new(pool)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(id: &str, secs: i64, hidden: bool) -> ContentItem {
        ContentItem {
            id: id.into(),
            kind: ContentKind::Note,
            nid: None,
            slug: None,
            title: format!("title {id}"),
            text: String::new(),
            summary: None,
            hidden,
            password: None,
            created: Utc.timestamp_opt(secs, 0).unwrap(),
            modified: None,
        }
    }

    #[test]
    fn created_bounds_are_strict() {
        let anchor = Utc.timestamp_opt(100, 0).unwrap();
        let after = Filter::default().with_created(CreatedBound::After(anchor));
        let before = Filter::default().with_created(CreatedBound::Before(anchor));

        assert!(after.matches(&item("a", 101, false)));
        assert!(!after.matches(&item("b", 100, false)));
        assert!(before.matches(&item("c", 99, false)));
        assert!(!before.matches(&item("d", 100, false)));
    }

    #[test]
    fn hidden_items_need_privileged_visibility() {
        let hidden = item("h", 1, true);
        assert!(!Filter::visible(Visibility::PublicOnly).matches(&hidden));
        assert!(Filter::visible(Visibility::IncludeHidden).matches(&hidden));
        assert_eq!(Visibility::for_caller(true), Visibility::IncludeHidden);
    }

    #[test]
    fn year_filter_uses_utc_year() {
        let jan_2021 = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap().timestamp();
        let f = Filter::default().with_year(Some(2021));
        assert!(f.matches(&item("a", jan_2021, false)));
        assert!(!f.matches(&item("b", jan_2021 - 1, false)));
    }

    #[test]
    fn sort_breaks_ties_by_id() {
        let a = item("a", 5, false);
        let b = item("b", 5, false);
        assert_eq!(Sort::created_desc().compare(&a, &b), Ordering::Greater);
        assert_eq!(Sort::created_asc().compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn sort_field_names() {
        assert_eq!(SortField::parse("created"), Some(SortField::Created));
        assert_eq!(SortField::parse("nid").map(SortField::column), Some("nid"));
        assert_eq!(SortField::parse("password"), None);
    }
}
