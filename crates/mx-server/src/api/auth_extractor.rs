//! Credential extraction for REST routes.
//!
//! Both extractors read `Authorization: Bearer <credential>` and run it
//! through the same [`AuthVerifier`](crate::gateway::AuthVerifier) the admin
//! gateway uses, so API tokens and session JWTs are interchangeable.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use crate::api::error::ApiError;
use crate::gateway::verifier::credential_from_headers;
use crate::gateway::{Principal, RejectReason, Verdict};
use crate::state::AppState;
use crate::store::Visibility;

/// An authenticated administrator. Rejects the request with 401 otherwise.
pub struct AuthUser {
    pub principal: Principal,
    /// The credential as presented, used to revoke its live connections.
    pub credential: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = credential_from_headers(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

        match state.verifier().verify(Some(&credential)).await {
            Verdict::Accepted(principal) => Ok(AuthUser {
                principal,
                credential,
            }),
            Verdict::Rejected(RejectReason::Timeout | RejectReason::Unavailable) => Err(
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "identity service unavailable"),
            ),
            Verdict::Rejected(_) => Err(ApiError::unauthorized("invalid or expired token")),
        }
    }
}

/// The caller of a public route: an administrator if a valid credential was
/// presented, anonymous otherwise. Never rejects.
pub struct Viewer {
    pub principal: Option<Principal>,
}

impl Viewer {
    pub fn is_master(&self) -> bool {
        self.principal.is_some()
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::for_caller(self.is_master())
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = match credential_from_headers(&parts.headers) {
            Some(credential) => state.verifier().verify(Some(&credential)).await.principal(),
            None => None,
        };
        Ok(Viewer { principal })
    }
}
