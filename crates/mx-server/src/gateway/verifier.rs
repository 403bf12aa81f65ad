//! Credential verification for the admin gateway and the REST API.
//!
//! A credential is accepted when it is either a live pre-issued API token
//! or a session JWT whose `auth_code` still matches its user. Every
//! failure is a [`Verdict::Rejected`] value; nothing here returns an
//! error to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::Utc;
use serde::Serialize;

use mx_common::auth::JwtContext;

use crate::store::{IdentityStore, StoreError};

/// Longest credential accepted before any lookup is attempted.
pub const MAX_CREDENTIAL_LEN: usize = 4096;

/// How a principal authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    ApiToken,
    Session,
}

/// The authenticated identity behind a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: String,
    pub username: String,
    pub via: CredentialKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Absent, empty, oversized, or containing whitespace/control chars.
    Malformed,
    /// Not a known API token and not a valid signed session token.
    InvalidSignature,
    /// Signed correctly, but the subject is gone or its auth code rotated.
    UnknownPrincipal,
    /// An identity lookup exceeded the configured bound.
    Timeout,
    /// The identity store returned an error.
    Unavailable,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::Malformed => "malformed",
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::UnknownPrincipal => "unknown_principal",
            RejectReason::Timeout => "timeout",
            RejectReason::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(Principal),
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }

    pub fn principal(self) -> Option<Principal> {
        match self {
            Verdict::Accepted(p) => Some(p),
            Verdict::Rejected(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct AuthVerifier {
    identity: Arc<dyn IdentityStore>,
    jwt: Arc<JwtContext>,
    timeout: Duration,
}

impl AuthVerifier {
    pub fn new(identity: Arc<dyn IdentityStore>, jwt: Arc<JwtContext>, timeout: Duration) -> Self {
        Self {
            identity,
            jwt,
            timeout,
        }
    }

    pub async fn verify(&self, credential: Option<&str>) -> Verdict {
        match self.check(credential).await {
            Ok(principal) => Verdict::Accepted(principal),
            Err(reason) => {
                tracing::debug!(reason = %reason, "credential rejected");
                Verdict::Rejected(reason)
            }
        }
    }

    async fn check(&self, credential: Option<&str>) -> Result<Principal, RejectReason> {
        let credential = credential
            .filter(|c| is_well_formed(c))
            .ok_or(RejectReason::Malformed)?;

        // Pre-issued API token first.
        if let Some(token) = self.bounded(self.identity.find_api_token(credential)).await? {
            if !token.is_expired(Utc::now()) {
                let user = self
                    .bounded(self.identity.find_user(&token.user_id))
                    .await?
                    .ok_or(RejectReason::UnknownPrincipal)?;
                return Ok(Principal {
                    user_id: user.id,
                    username: user.username,
                    via: CredentialKind::ApiToken,
                });
            }
            tracing::debug!(token_id = %token.id, "api token expired");
        }

        let claims = self
            .jwt
            .verify_token(credential)
            .map_err(|_| RejectReason::InvalidSignature)?;

        let user = self
            .bounded(self.identity.find_user(&claims.sub))
            .await?
            .filter(|u| u.auth_code == claims.auth_code)
            .ok_or(RejectReason::UnknownPrincipal)?;

        Ok(Principal {
            user_id: user.id,
            username: user.username,
            via: CredentialKind::Session,
        })
    }

    /// Run one identity lookup under the configured timeout.
    async fn bounded<T>(
        &self,
        lookup: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, RejectReason> {
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "identity lookup failed");
                Err(RejectReason::Unavailable)
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "identity lookup timed out");
                Err(RejectReason::Timeout)
            }
        }
    }
}

fn is_well_formed(credential: &str) -> bool {
    !credential.is_empty()
        && credential.len() <= MAX_CREDENTIAL_LEN
        && !credential
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
}

/// Strip an optional `Bearer ` scheme.
pub fn strip_bearer(value: &str) -> &str {
    value.strip_prefix("Bearer ").unwrap_or(value)
}

/// The credential presented in a request's `Authorization` header.
pub fn credential_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| strip_bearer(v).to_string())
}

/// The credential presented during a gateway handshake: the `token` query
/// parameter if non-empty, else the `Authorization` header.
pub fn credential_from_handshake(query_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    match query_token.filter(|t| !t.is_empty()) {
        Some(token) => Some(strip_bearer(token).to_string()),
        None => credential_from_headers(headers),
    }
}
