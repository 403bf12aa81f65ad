//! Site configuration sections.
//!
//! Each [`ConfigKey`] maps to one typed section. A patch is shallow-merged
//! over the stored section, decoded into its type (unknown fields are
//! dropped), validated, and persisted.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use mx_common::models::ContentKind;

use crate::store::{ContentStore, Filter, OptionStore, StoreError, Visibility};

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("unknown option key {0:?}")]
    UnknownKey(String),
    #[error("option value must be a JSON object")]
    NotAnObject,
    #[error("invalid option value: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Url,
    CommentOptions,
    ImageBed,
    MailOptions,
    Seo,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::Url,
        ConfigKey::CommentOptions,
        ConfigKey::ImageBed,
        ConfigKey::MailOptions,
        ConfigKey::Seo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Url => "url",
            ConfigKey::CommentOptions => "commentOptions",
            ConfigKey::ImageBed => "imageBed",
            ConfigKey::MailOptions => "mailOptions",
            ConfigKey::Seo => "seo",
        }
    }

    fn defaults(self) -> Result<Value, serde_json::Error> {
        match self {
            ConfigKey::Url => serde_json::to_value(UrlOptions::default()),
            ConfigKey::CommentOptions => serde_json::to_value(CommentOptions::default()),
            ConfigKey::ImageBed => serde_json::to_value(ImageBedOptions::default()),
            ConfigKey::MailOptions => serde_json::to_value(MailOptions::default()),
            ConfigKey::Seo => serde_json::to_value(SeoOptions::default()),
        }
    }

    /// Decode, validate, and re-encode a merged section.
    fn normalize(self, merged: Value) -> Result<Value, OptionsError> {
        match self {
            ConfigKey::Url => normalize::<UrlOptions>(merged),
            ConfigKey::CommentOptions => normalize::<CommentOptions>(merged),
            ConfigKey::ImageBed => normalize::<ImageBedOptions>(merged),
            ConfigKey::MailOptions => normalize::<MailOptions>(merged),
            ConfigKey::Seo => normalize::<SeoOptions>(merged),
        }
    }
}

impl std::str::FromStr for ConfigKey {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| OptionsError::UnknownKey(s.to_string()))
    }
}

/// A typed configuration section.
trait Section: Serialize + DeserializeOwned {
    /// Push one message per violated rule.
    fn validate(&self, errors: &mut Vec<String>);
}

fn normalize<T: Section>(merged: Value) -> Result<Value, OptionsError> {
    let section: T =
        serde_json::from_value(merged).map_err(|e| OptionsError::Invalid(vec![e.to_string()]))?;
    let mut errors = Vec::new();
    section.validate(&mut errors);
    if !errors.is_empty() {
        return Err(OptionsError::Invalid(errors));
    }
    Ok(serde_json::to_value(section).map_err(StoreError::from)?)
}

fn check_url(field: &str, value: &str, schemes: &[&str], errors: &mut Vec<String>) {
    match url::Url::parse(value) {
        Ok(u) if schemes.contains(&u.scheme()) => {}
        Ok(u) => errors.push(format!("{field}: unsupported scheme {:?}", u.scheme())),
        Err(e) => errors.push(format!("{field}: {e}")),
    }
}

// ── Sections ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UrlOptions {
    pub web_url: String,
    pub admin_url: String,
    pub server_url: String,
    pub ws_url: String,
}

impl Default for UrlOptions {
    fn default() -> Self {
        Self {
            web_url: "http://127.0.0.1:2323".into(),
            admin_url: "http://127.0.0.1:9528".into(),
            server_url: "http://127.0.0.1:2333".into(),
            ws_url: "http://127.0.0.1:8080".into(),
        }
    }
}

impl Section for UrlOptions {
    fn validate(&self, errors: &mut Vec<String>) {
        const HTTP: &[&str] = &["http", "https"];
        check_url("webUrl", &self.web_url, HTTP, errors);
        check_url("adminUrl", &self.admin_url, HTTP, errors);
        check_url("serverUrl", &self.server_url, HTTP, errors);
        check_url("wsUrl", &self.ws_url, &["http", "https", "ws", "wss"], errors);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentOptions {
    pub anti_spam: bool,
    pub spam_keywords: Vec<String>,
    pub block_ips: Vec<String>,
    pub disable_no_chinese: bool,
}

impl Section for CommentOptions {
    fn validate(&self, errors: &mut Vec<String>) {
        for ip in &self.block_ips {
            if ip.parse::<std::net::IpAddr>().is_err() {
                errors.push(format!("blockIps: {ip:?} is not an IP address"));
            }
        }
        if self.spam_keywords.iter().any(|k| k.trim().is_empty()) {
            errors.push("spamKeywords: keywords must not be blank".into());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageBedOptions {
    pub enable: bool,
    pub repo: Option<String>,
    pub token: Option<String>,
    pub custom_domain: Option<String>,
}

impl Section for ImageBedOptions {
    fn validate(&self, errors: &mut Vec<String>) {
        if self.enable && self.repo.as_deref().is_none_or(|r| r.trim().is_empty()) {
            errors.push("repo: required when the image bed is enabled".into());
        }
        if let Some(ref domain) = self.custom_domain {
            check_url("customDomain", domain, &["http", "https"], errors);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MailOptions {
    pub enable: bool,
    pub user: String,
    pub pass: String,
    pub host: String,
    /// Kept wide so out-of-range values reach validation.
    pub port: i64,
}

impl Default for MailOptions {
    fn default() -> Self {
        Self {
            enable: false,
            user: String::new(),
            pass: String::new(),
            host: String::new(),
            port: 465,
        }
    }
}

impl Section for MailOptions {
    fn validate(&self, errors: &mut Vec<String>) {
        if !(1..=65535).contains(&self.port) {
            errors.push(format!("port: {} is outside 1..=65535", self.port));
        }
        if self.enable {
            if !self.user.contains('@') {
                errors.push("user: sender address must contain '@'".into());
            }
            if self.host.trim().is_empty() {
                errors.push("host: required when mail is enabled".into());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeoOptions {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
}

impl Default for SeoOptions {
    fn default() -> Self {
        Self {
            title: "mx-space".into(),
            description: String::new(),
            keywords: Vec::new(),
        }
    }
}

impl Section for SeoOptions {
    fn validate(&self, errors: &mut Vec<String>) {
        if self.title.trim().is_empty() {
            errors.push("title: must not be empty".into());
        }
    }
}

// ── Service ─────────────────────────────────────────────────────────

/// Item counts shown on the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stat {
    pub posts: u64,
    pub notes: u64,
    pub pages: u64,
}

#[derive(Clone)]
pub struct OptionsService {
    options: Arc<dyn OptionStore>,
    content: Arc<dyn ContentStore>,
}

impl OptionsService {
    pub fn new(options: Arc<dyn OptionStore>, content: Arc<dyn ContentStore>) -> Self {
        Self { options, content }
    }

    /// Stored value of one section, or its defaults.
    pub async fn get(&self, key: ConfigKey) -> Result<Value, OptionsError> {
        match self.options.load(key.as_str()).await? {
            Some(value) => Ok(value),
            None => Ok(key.defaults().map_err(StoreError::from)?),
        }
    }

    /// Every section keyed by name.
    pub async fn get_all(&self) -> Result<Value, OptionsError> {
        let mut all = Map::new();
        for key in ConfigKey::ALL {
            all.insert(key.as_str().to_string(), self.get(key).await?);
        }
        Ok(Value::Object(all))
    }

    /// Merge `patch` into the section, validate, and persist. Returns the
    /// stored section.
    pub async fn patch(&self, key: ConfigKey, patch: Value) -> Result<Value, OptionsError> {
        let Value::Object(patch) = patch else {
            return Err(OptionsError::NotAnObject);
        };

        let mut merged = match self.get(key).await? {
            Value::Object(current) => current,
            _ => Map::new(),
        };
        merged.extend(patch);

        let normalized = key.normalize(Value::Object(merged))?;
        self.options.save(key.as_str(), &normalized).await?;
        tracing::info!(key = key.as_str(), "option updated");
        Ok(normalized)
    }

    pub async fn stat(&self) -> Result<Stat, OptionsError> {
        let all = Filter::visible(Visibility::IncludeHidden);
        let (posts, notes, pages) = tokio::try_join!(
            self.content.count(ContentKind::Post, &all),
            self.content.count(ContentKind::Note, &all),
            self.content.count(ContentKind::Page, &all),
        )?;
        Ok(Stat {
            posts,
            notes,
            pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::store::Backend;

    fn service() -> OptionsService {
        let backend = Backend::memory();
        OptionsService::new(backend.options, backend.content)
    }

    #[test]
    fn key_names_round_trip() {
        for key in ConfigKey::ALL {
            assert_eq!(key.as_str().parse::<ConfigKey>().unwrap(), key);
        }
        assert!(matches!(
            "theme".parse::<ConfigKey>(),
            Err(OptionsError::UnknownKey(_))
        ));
    }

    #[tokio::test]
    async fn defaults_until_patched() {
        let svc = service();
        let all = svc.get_all().await.unwrap();
        assert_eq!(all["seo"]["title"], "mx-space");
        assert_eq!(all["mailOptions"]["port"], 465);
    }

    #[tokio::test]
    async fn patch_merges_and_drops_unknown_fields() {
        let svc = service();
        let out = svc
            .patch(ConfigKey::Seo, json!({"description": "a blog", "bogus": 1}))
            .await
            .unwrap();
        assert_eq!(out["title"], "mx-space");
        assert_eq!(out["description"], "a blog");
        assert!(out.get("bogus").is_none());
        assert_eq!(svc.get(ConfigKey::Seo).await.unwrap(), out);
    }

    #[tokio::test]
    async fn non_object_body_is_rejected() {
        let svc = service();
        assert!(matches!(
            svc.patch(ConfigKey::Url, json!("http://x")).await,
            Err(OptionsError::NotAnObject)
        ));
    }

    #[tokio::test]
    async fn invalid_values_are_not_persisted() {
        let svc = service();
        let err = svc
            .patch(ConfigKey::Url, json!({"webUrl": "ftp://example.com"}))
            .await
            .unwrap_err();
        assert!(matches!(err, OptionsError::Invalid(ref e) if e[0].starts_with("webUrl")));
        assert_eq!(
            svc.get(ConfigKey::Url).await.unwrap()["webUrl"],
            "http://127.0.0.1:2323"
        );

        assert!(svc.patch(ConfigKey::Seo, json!({"title": " "})).await.is_err());
        assert!(svc
            .patch(ConfigKey::MailOptions, json!({"port": 70000}))
            .await
            .is_err());
        assert!(svc
            .patch(ConfigKey::MailOptions, json!({"enable": true, "user": "nobody", "host": "smtp"}))
            .await
            .is_err());
        assert!(svc
            .patch(ConfigKey::ImageBed, json!({"enable": true}))
            .await
            .is_err());
        assert!(svc
            .patch(ConfigKey::CommentOptions, json!({"blockIps": ["not-an-ip"]}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn wrong_field_type_is_invalid() {
        let svc = service();
        assert!(matches!(
            svc.patch(ConfigKey::CommentOptions, json!({"antiSpam": "yes"})).await,
            Err(OptionsError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn mail_options_accept_valid_config() {
        let svc = service();
        let out = svc
            .patch(
                ConfigKey::MailOptions,
                json!({"enable": true, "user": "me@example.com", "host": "smtp.example.com", "port": 587}),
            )
            .await
            .unwrap();
        assert_eq!(out["port"], 587);
    }

    #[tokio::test]
    async fn stat_counts_hidden_items() {
        let backend = Backend::memory();
        let svc = OptionsService::new(backend.options.clone(), backend.content.clone());
        backend
            .content
            .insert(
                ContentKind::Note,
                mx_common::models::ContentDraft {
                    title: "n".into(),
                    hidden: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let stat = svc.stat().await.unwrap();
        assert_eq!(stat, Stat { posts: 0, notes: 1, pages: 0 });
    }
}
