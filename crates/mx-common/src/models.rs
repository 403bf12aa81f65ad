//! Data models for mx-server.
//!
//! These types represent the stored entities. Content items are shared by
//! posts, notes, and pages; kind-specific keys (`nid` for notes, `slug` for
//! posts and pages) are optional fields on the common shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── User ────────────────────────────────────────────────────────────

/// The site owner (the "master" account).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Embedded in issued JWTs; rotated on password change.
    #[serde(skip_serializing)]
    pub auth_code: String,
    pub created_at: DateTime<Utc>,
}

// ── API Token ───────────────────────────────────────────────────────

/// A pre-issued ("custom") token usable in place of a session JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// The secret itself — only returned once, at creation.
    #[serde(skip_serializing)]
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiToken {
    /// Whether the token is past its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

// ── Content ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Post,
    Note,
    Page,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Post, ContentKind::Note, ContentKind::Page];

    pub fn id_prefix(self) -> &'static str {
        match self {
            ContentKind::Post => "pst",
            ContentKind::Note => "nte",
            ContentKind::Page => "pge",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Post => write!(f, "post"),
            ContentKind::Note => write!(f, "note"),
            ContentKind::Page => write!(f, "page"),
        }
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(ContentKind::Post),
            "note" => Ok(ContentKind::Note),
            "page" => Ok(ContentKind::Page),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

/// A post, note, or page as read from the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub kind: ContentKind,
    /// Sequential human key (notes only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nid: Option<i64>,
    /// URL key (posts and pages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub title: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub hidden: bool,
    /// Access password for gated notes. Never serialized.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    /// Primary ordering key.
    pub created: DateTime<Utc>,
    pub modified: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// Whether the item carries an access password.
    pub fn is_password_gated(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Check a caller-supplied password against the item's gate.
    /// Ungated items always pass.
    pub fn password_matches(&self, supplied: Option<&str>) -> bool {
        match self.password.as_deref() {
            None | Some("") => true,
            Some(expected) => supplied == Some(expected),
        }
    }
}

/// Input for creating a content item. The store assigns `id`, `nid`,
/// and `created`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentDraft {
    pub title: String,
    #[serde(default)]
    pub text: String,
    pub slug: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    pub password: Option<String>,
}

/// Partial update — only fields present are changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentPatch {
    pub title: Option<String>,
    pub text: Option<String>,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub hidden: Option<bool>,
    pub password: Option<String>,
}

impl ContentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.text.is_none()
            && self.slug.is_none()
            && self.summary.is_none()
            && self.hidden.is_none()
            && self.password.is_none()
    }

    /// Apply the patch in place, stamping `modified`.
    pub fn apply_to(&self, item: &mut ContentItem, now: DateTime<Utc>) {
        if let Some(ref title) = self.title {
            item.title = title.clone();
        }
        if let Some(ref text) = self.text {
            item.text = text.clone();
        }
        if let Some(ref slug) = self.slug {
            item.slug = Some(slug.clone());
        }
        if let Some(ref summary) = self.summary {
            item.summary = Some(summary.clone());
        }
        if let Some(hidden) = self.hidden {
            item.hidden = hidden;
        }
        if let Some(ref password) = self.password {
            item.password = (!password.is_empty()).then(|| password.clone());
        }
        item.modified = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note() -> ContentItem {
        ContentItem {
            id: "nte_1".into(),
            kind: ContentKind::Note,
            nid: Some(1),
            slug: None,
            title: "t".into(),
            text: "body".into(),
            summary: None,
            hidden: false,
            password: None,
            created: Utc::now(),
            modified: None,
        }
    }

    #[test]
    fn password_never_serialized() {
        let mut item = note();
        item.password = Some("secret".into());
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("password"));
        assert!(json.contains("\"kind\":\"note\""));
    }

    #[test]
    fn password_gate() {
        let mut item = note();
        assert!(item.password_matches(None));

        item.password = Some("pw".into());
        assert!(item.is_password_gated());
        assert!(item.password_matches(Some("pw")));
        assert!(!item.password_matches(Some("nope")));
        assert!(!item.password_matches(None));
    }

    #[test]
    fn patch_clears_password_with_empty_string() {
        let mut item = note();
        item.password = Some("pw".into());
        let patch = ContentPatch {
            password: Some(String::new()),
            title: Some("new".into()),
            ..Default::default()
        };
        let now = Utc::now();
        patch.apply_to(&mut item, now);
        assert_eq!(item.password, None);
        assert_eq!(item.title, "new");
        assert_eq!(item.modified, Some(now));
    }

    #[test]
    fn api_token_expiry() {
        let now = Utc::now();
        let mut token = ApiToken {
            id: "tok_1".into(),
            user_id: "usr_1".into(),
            name: "ci".into(),
            token: "txo123".into(),
            created_at: now,
            expires_at: None,
        };
        assert!(!token.is_expired(now));
        token.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(token.is_expired(now));
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in ContentKind::ALL {
            assert_eq!(kind.to_string().parse::<ContentKind>().unwrap(), kind);
        }
        assert!("comment".parse::<ContentKind>().is_err());
    }
}
