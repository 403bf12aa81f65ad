//! JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use mx_common::auth::AuthError;

use crate::content::ContentError;
use crate::options::OptionsError;
use crate::store::StoreError;

/// An error rendered as `{"error": "..."}` with an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, msg)
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => ApiError::conflict(msg),
            other => {
                tracing::error!(error = %other, "store error");
                ApiError::internal("internal server error")
            }
        }
    }
}

impl From<ContentError> for ApiError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::NotFound(msg) => ApiError::not_found(msg),
            ContentError::InvalidArgument(msg) => ApiError::bad_request(msg),
            ContentError::Forbidden(msg) => ApiError::forbidden(msg),
            ContentError::Store(e) => e.into(),
        }
    }
}

impl From<OptionsError> for ApiError {
    fn from(e: OptionsError) -> Self {
        match e {
            OptionsError::Store(e) => e.into(),
            other => ApiError::unprocessable(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        tracing::error!(error = %e, "auth primitive failed");
        ApiError::internal("internal server error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ContentError::NotFound("x".into()).into(), StatusCode::NOT_FOUND),
            (ContentError::invalid("x").into(), StatusCode::BAD_REQUEST),
            (ContentError::Forbidden("x".into()).into(), StatusCode::FORBIDDEN),
            (StoreError::Conflict("x".into()).into(), StatusCode::CONFLICT),
            (StoreError::Corrupt("x".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (OptionsError::UnknownKey("x".into()).into(), StatusCode::UNPROCESSABLE_ENTITY),
            (OptionsError::NotAnObject.into(), StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status);
        }
    }
}
