//! mx-server library.
//!
//! Re-exports the API router, shared state, gateway, and stores so they can
//! be used by integration tests (and embedded in other binaries).

pub mod api;
pub mod config;
pub mod content;
pub mod db;
pub mod gateway;
pub mod options;
pub mod state;
pub mod store;

use axum::routing::get;
use axum::Router;

/// The full route tree: REST under `/api`, the admin gateway at `/admin`.
pub fn app(state: state::AppState) -> Router {
    Router::new()
        .nest("/api", api::router())
        .route("/admin", get(gateway::ws_admin::handler))
        .with_state(state)
}
