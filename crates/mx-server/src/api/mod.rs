//! REST API route tree.

pub mod auth;
pub mod auth_extractor;
pub mod content;
pub mod error;
pub mod gateway;
pub mod notes;
pub mod options;
pub mod pages;
pub mod posts;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/notes", notes::router())
        .nest("/posts", posts::router())
        .nest("/pages", pages::router())
        .nest("/options", options::router())
        .nest("/gateway", gateway::router())
}
