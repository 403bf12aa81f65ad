//! Read-side content algorithms: neighbor windows, pagination, search.

pub mod navigation;
pub mod pagination;
pub mod search;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ContentError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ContentError::InvalidArgument(msg.into())
    }
}
