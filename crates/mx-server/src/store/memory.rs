//! In-process stores.
//!
//! Used when `DATABASE_URL` is not set and by the test suites. Every
//! operation takes a `parking_lot` lock for its whole duration, so each
//! call is atomic with respect to the others.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use mx_common::ids;
use mx_common::models::{ApiToken, ContentDraft, ContentItem, ContentKind, ContentPatch, User};

use super::{ContentStore, Filter, IdentityStore, OptionStore, OrderedQuery, Sort, StoreError};

// ── Content ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryContentStore {
    items: RwLock<Vec<ContentItem>>,
}

impl MemoryContentStore {
    /// Insert a fully-formed item as-is (ids and timestamps included).
    /// Used for seeding fixtures with controlled ordering keys.
    pub fn insert_item(&self, item: ContentItem) -> Result<(), StoreError> {
        let mut items = self.items.write();
        check_unique(&items, &item, None)?;
        items.push(item);
        Ok(())
    }

    fn select(&self, kind: ContentKind, filter: &Filter, sort: Sort) -> Vec<ContentItem> {
        let items = self.items.read();
        let mut selected: Vec<ContentItem> = items
            .iter()
            .filter(|item| item.kind == kind && filter.matches(item))
            .cloned()
            .collect();
        selected.sort_by(|a, b| sort.compare(a, b));
        selected
    }
}

/// Enforce per-kind uniqueness of `slug` and `nid`. `skip_id` excludes the
/// item being updated.
fn check_unique(
    items: &[ContentItem],
    candidate: &ContentItem,
    skip_id: Option<&str>,
) -> Result<(), StoreError> {
    for existing in items.iter().filter(|i| i.kind == candidate.kind) {
        if Some(existing.id.as_str()) == skip_id {
            continue;
        }
        if existing.id == candidate.id {
            return Err(StoreError::Conflict(format!("duplicate id {}", candidate.id)));
        }
        if candidate.slug.is_some() && existing.slug == candidate.slug {
            return Err(StoreError::Conflict(format!(
                "slug {:?} already in use",
                candidate.slug.as_deref().unwrap_or_default()
            )));
        }
        if candidate.nid.is_some() && existing.nid == candidate.nid {
            return Err(StoreError::Conflict("nid already in use".into()));
        }
    }
    Ok(())
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn find_one(
        &self,
        kind: ContentKind,
        filter: &Filter,
        sort: Sort,
    ) -> Result<Option<ContentItem>, StoreError> {
        Ok(self.select(kind, filter, sort).into_iter().next())
    }

    async fn find(
        &self,
        kind: ContentKind,
        filter: &Filter,
        query: &OrderedQuery,
    ) -> Result<Vec<ContentItem>, StoreError> {
        Ok(self
            .select(kind, filter, query.sort)
            .into_iter()
            .skip(query.skip as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn count(&self, kind: ContentKind, filter: &Filter) -> Result<u64, StoreError> {
        let items = self.items.read();
        Ok(items
            .iter()
            .filter(|item| item.kind == kind && filter.matches(item))
            .count() as u64)
    }

    async fn insert(
        &self,
        kind: ContentKind,
        draft: ContentDraft,
    ) -> Result<ContentItem, StoreError> {
        let mut items = self.items.write();
        let nid = (kind == ContentKind::Note).then(|| {
            items
                .iter()
                .filter(|i| i.kind == ContentKind::Note)
                .filter_map(|i| i.nid)
                .max()
                .unwrap_or(0)
                + 1
        });
        let item = ContentItem {
            id: ids::content_id(kind),
            kind,
            nid,
            slug: draft.slug,
            title: draft.title,
            text: draft.text,
            summary: draft.summary,
            hidden: draft.hidden,
            password: draft.password.filter(|p| !p.is_empty()),
            created: Utc::now(),
            modified: None,
        };
        check_unique(&items, &item, None)?;
        items.push(item.clone());
        Ok(item)
    }

    async fn update(
        &self,
        kind: ContentKind,
        id: &str,
        patch: &ContentPatch,
    ) -> Result<Option<ContentItem>, StoreError> {
        let mut items = self.items.write();
        let Some(pos) = items.iter().position(|i| i.kind == kind && i.id == id) else {
            return Ok(None);
        };
        let mut updated = items[pos].clone();
        patch.apply_to(&mut updated, Utc::now());
        check_unique(&items, &updated, Some(id))?;
        items[pos] = updated.clone();
        Ok(Some(updated))
    }

    async fn delete(&self, kind: ContentKind, id: &str) -> Result<bool, StoreError> {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|i| !(i.kind == kind && i.id == id));
        Ok(items.len() != before)
    }
}

// ── Identity ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryIdentityStore {
    users: RwLock<BTreeMap<String, User>>,
    tokens: RwLock<BTreeMap<String, ApiToken>>,
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn count_users(&self) -> Result<u64, StoreError> {
        Ok(self.users.read().len() as u64)
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write();
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("username already registered".into()));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn insert_first_user(&self, user: &User) -> Result<bool, StoreError> {
        let mut users = self.users.write();
        if !users.is_empty() {
            return Ok(false);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(true)
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().get(id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn update_credentials(
        &self,
        id: &str,
        password_hash: &str,
        auth_code: &str,
    ) -> Result<bool, StoreError> {
        match self.users.write().get_mut(id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.auth_code = auth_code.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_api_token(&self, token: &ApiToken) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write();
        if tokens.values().any(|t| t.token == token.token) {
            return Err(StoreError::Conflict("token already exists".into()));
        }
        tokens.insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn find_api_token(&self, secret: &str) -> Result<Option<ApiToken>, StoreError> {
        Ok(self
            .tokens
            .read()
            .values()
            .find(|t| t.token == secret)
            .cloned())
    }

    async fn list_api_tokens(&self, user_id: &str) -> Result<Vec<ApiToken>, StoreError> {
        let mut tokens: Vec<ApiToken> = self
            .tokens
            .read()
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    async fn delete_api_token(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<ApiToken>, StoreError> {
        let mut tokens = self.tokens.write();
        match tokens.get(id) {
            Some(t) if t.user_id == user_id => Ok(tokens.remove(id)),
            _ => Ok(None),
        }
    }
}

// ── Options ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryOptionStore {
    values: RwLock<BTreeMap<String, serde_json::Value>>,
}

#[async_trait]
impl OptionStore for MemoryOptionStore {
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn save(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        self.values.write().insert(key.to_string(), value.clone());
        Ok(())
    }
}
