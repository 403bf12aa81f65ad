//! PostgreSQL stores.
//!
//! All content kinds share the `content` table; kind-specific keys are
//! nullable columns with per-kind unique indexes (see `migrations/`).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use mx_common::ids;
use mx_common::models::{ApiToken, ContentDraft, ContentItem, ContentKind, ContentPatch, User};

use super::{
    ContentStore, CreatedBound, Filter, IdentityStore, OptionStore, OrderedQuery, Sort,
    StoreError, Visibility,
};

const CONTENT_COLUMNS: &str =
    "id, kind, nid, slug, title, text, summary, hidden, password, created, modified";

/// Map unique-constraint violations to [`StoreError::Conflict`].
fn map_write_error(e: sqlx::Error, what: &str) -> StoreError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{what} already exists"))
        }
        other => StoreError::Database(other),
    }
}

// ── Content ─────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct ContentRow {
    id: String,
    kind: String,
    nid: Option<i64>,
    slug: Option<String>,
    title: String,
    text: String,
    summary: Option<String>,
    hidden: bool,
    password: Option<String>,
    created: DateTime<Utc>,
    modified: Option<DateTime<Utc>>,
}

impl TryFrom<ContentRow> for ContentItem {
    type Error = StoreError;

    fn try_from(row: ContentRow) -> Result<Self, Self::Error> {
        let kind = row.kind.parse::<ContentKind>().map_err(StoreError::Corrupt)?;
        Ok(ContentItem {
            id: row.id,
            kind,
            nid: row.nid,
            slug: row.slug,
            title: row.title,
            text: row.text,
            summary: row.summary,
            hidden: row.hidden,
            password: row.password,
            created: row.created,
            modified: row.modified,
        })
    }
}

pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Append `WHERE ...` for `kind` and `filter`.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, kind: ContentKind, filter: &Filter) {
    qb.push(" WHERE kind = ").push_bind(kind.to_string());

    if let Some(ref id) = filter.id {
        qb.push(" AND id = ").push_bind(id.clone());
    }
    if let Some(nid) = filter.nid {
        qb.push(" AND nid = ").push_bind(nid);
    }
    if let Some(ref slug) = filter.slug {
        qb.push(" AND slug = ").push_bind(slug.clone());
    }
    if filter.visibility == Visibility::PublicOnly {
        qb.push(" AND hidden = FALSE");
    }
    match filter.created {
        Some(CreatedBound::After(t)) => {
            qb.push(" AND created > ").push_bind(t);
        }
        Some(CreatedBound::Before(t)) => {
            qb.push(" AND created < ").push_bind(t);
        }
        None => {}
    }
    if let Some(year) = filter.year {
        match year_bounds(year) {
            Some((start, end)) => {
                qb.push(" AND created >= ")
                    .push_bind(start)
                    .push(" AND created < ")
                    .push_bind(end);
            }
            None => {
                qb.push(" AND FALSE");
            }
        }
    }
    if let Some(ref keywords) = filter.keywords {
        let patterns = keywords.ilike_patterns();
        qb.push(" AND (title ILIKE ANY(")
            .push_bind(patterns.clone())
            .push(") OR text ILIKE ANY(")
            .push_bind(patterns)
            .push("))");
    }
}

fn push_sort(qb: &mut QueryBuilder<'_, Postgres>, sort: Sort) {
    let dir = sort.direction.sql();
    // Column and direction come from closed enums, never from input.
    qb.push(format!(
        " ORDER BY {} {dir} NULLS LAST, id {dir}",
        sort.field.column()
    ));
}

/// `[Jan 1 year, Jan 1 year+1)` in UTC.
fn year_bounds(year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?;
    let end = Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single()?;
    Some((start, end))
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn find_one(
        &self,
        kind: ContentKind,
        filter: &Filter,
        sort: Sort,
    ) -> Result<Option<ContentItem>, StoreError> {
        let found = self.find(kind, filter, &OrderedQuery::first(1, sort)).await?;
        Ok(found.into_iter().next())
    }

    async fn find(
        &self,
        kind: ContentKind,
        filter: &Filter,
        query: &OrderedQuery,
    ) -> Result<Vec<ContentItem>, StoreError> {
        let mut qb = QueryBuilder::new(format!("SELECT {CONTENT_COLUMNS} FROM content"));
        push_filter(&mut qb, kind, filter);
        push_sort(&mut qb, query.sort);
        qb.push(" LIMIT ")
            .push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<ContentRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ContentItem::try_from).collect()
    }

    async fn count(&self, kind: ContentKind, filter: &Filter) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM content");
        push_filter(&mut qb, kind, filter);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn insert(
        &self,
        kind: ContentKind,
        draft: ContentDraft,
    ) -> Result<ContentItem, StoreError> {
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            "INSERT INTO content (id, kind, nid, slug, title, text, summary, hidden, password, created) \
             VALUES ($1, $2, \
                     CASE WHEN $2 = 'note' \
                          THEN (SELECT COALESCE(MAX(nid), 0) + 1 FROM content WHERE kind = 'note') \
                     END, \
                     $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {CONTENT_COLUMNS}"
        ))
        .bind(ids::content_id(kind))
        .bind(kind.to_string())
        .bind(&draft.slug)
        .bind(&draft.title)
        .bind(&draft.text)
        .bind(&draft.summary)
        .bind(draft.hidden)
        .bind(draft.password.as_deref().filter(|p| !p.is_empty()))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "slug or nid"))?;

        ContentItem::try_from(row)
    }

    async fn update(
        &self,
        kind: ContentKind,
        id: &str,
        patch: &ContentPatch,
    ) -> Result<Option<ContentItem>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE content SET modified = ");
        qb.push_bind(Utc::now());

        if let Some(ref title) = patch.title {
            qb.push(", title = ").push_bind(title.clone());
        }
        if let Some(ref text) = patch.text {
            qb.push(", text = ").push_bind(text.clone());
        }
        if let Some(ref slug) = patch.slug {
            qb.push(", slug = ").push_bind(slug.clone());
        }
        if let Some(ref summary) = patch.summary {
            qb.push(", summary = ").push_bind(summary.clone());
        }
        if let Some(hidden) = patch.hidden {
            qb.push(", hidden = ").push_bind(hidden);
        }
        if let Some(ref password) = patch.password {
            // Empty string clears the gate.
            qb.push(", password = ")
                .push_bind((!password.is_empty()).then(|| password.clone()));
        }

        qb.push(" WHERE kind = ")
            .push_bind(kind.to_string())
            .push(" AND id = ")
            .push_bind(id.to_string())
            .push(format!(" RETURNING {CONTENT_COLUMNS}"));

        let row = qb
            .build_query_as::<ContentRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "slug"))?;

        row.map(ContentItem::try_from).transpose()
    }

    async fn delete(&self, kind: ContentKind, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM content WHERE kind = $1 AND id = $2")
            .bind(kind.to_string())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ── Identity ────────────────────────────────────────────────────────

type UserRow = (String, String, String, String, DateTime<Utc>);
type TokenRow = (String, String, String, String, DateTime<Utc>, Option<DateTime<Utc>>);

fn user_from_row((id, username, password_hash, auth_code, created_at): UserRow) -> User {
    User {
        id,
        username,
        password_hash,
        auth_code,
        created_at,
    }
}

fn token_from_row((id, user_id, name, token, created_at, expires_at): TokenRow) -> ApiToken {
    ApiToken {
        id,
        user_id,
        name,
        token,
        created_at,
        expires_at,
    }
}

pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn count_users(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, auth_code, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.auth_code)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "username"))?;
        Ok(())
    }

    async fn insert_first_user(&self, user: &User) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        // Serializes concurrent first-user inserts; plain reads still proceed.
        sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;
        let inserted = sqlx::query(
            "INSERT INTO users (id, username, password_hash, auth_code, created_at) \
             SELECT $1, $2, $3, $4, $5 WHERE NOT EXISTS (SELECT 1 FROM users)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.auth_code)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, "username"))?
        .rows_affected();
        tx.commit().await?;
        Ok(inserted == 1)
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, auth_code, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, auth_code, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn update_credentials(
        &self,
        id: &str,
        password_hash: &str,
        auth_code: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1, auth_code = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(auth_code)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_api_token(&self, token: &ApiToken) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO api_tokens (id, user_id, name, token, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&token.id)
        .bind(&token.user_id)
        .bind(&token.name)
        .bind(&token.token)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "token"))?;
        Ok(())
    }

    async fn find_api_token(&self, secret: &str) -> Result<Option<ApiToken>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT id, user_id, name, token, created_at, expires_at FROM api_tokens WHERE token = $1",
        )
        .bind(secret)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(token_from_row))
    }

    async fn list_api_tokens(&self, user_id: &str) -> Result<Vec<ApiToken>, StoreError> {
        let rows = sqlx::query_as::<_, TokenRow>(
            "SELECT id, user_id, name, token, created_at, expires_at FROM api_tokens \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(token_from_row).collect())
    }

    async fn delete_api_token(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<ApiToken>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            "DELETE FROM api_tokens WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, name, token, created_at, expires_at",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(token_from_row))
    }
}

// ── Options ─────────────────────────────────────────────────────────

pub struct PgOptionStore {
    pool: PgPool,
}

impl PgOptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OptionStore for PgOptionStore {
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM options WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    async fn save(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO options (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_bounds_cover_one_calendar_year() {
        let (start, end) = year_bounds(2020).unwrap();
        assert_eq!(start.to_rfc3339(), "2020-01-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2021-01-01T00:00:00+00:00");
    }

    #[test]
    fn filter_sql_binds_every_value() {
        use crate::content::search::KeywordQuery;

        let filter = Filter::visible(Visibility::PublicOnly)
            .with_id("nte_1")
            .with_created(CreatedBound::Before(Utc::now()))
            .with_keywords(KeywordQuery::parse("foo bar").unwrap());
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM content");
        push_filter(&mut qb, ContentKind::Note, &filter);
        push_sort(&mut qb, Sort::created_desc());

        let sql = qb.sql();
        assert!(sql.contains("kind = $1"));
        assert!(sql.contains("id = $2"));
        assert!(sql.contains("hidden = FALSE"));
        assert!(sql.contains("created < $3"));
        assert!(sql.contains("title ILIKE ANY($4) OR text ILIKE ANY($5)"));
        assert!(sql.ends_with("ORDER BY created DESC NULLS LAST, id DESC"));
    }
}
