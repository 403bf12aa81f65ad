//! Shared types for mx-server.
//!
//! This crate contains:
//! - **Gateway protocol** — messages pushed to admin WebSocket clients
//! - **Auth primitives** — JWT creation/validation, Argon2id password hashing
//! - **Data models** — User, ApiToken, ContentItem (posts, notes, pages)
//! - **ID generation** — Prefixed UUIDv7 helpers (`usr_`, `pst_`, `nte_`, `ws_`, ...)

pub mod auth;
pub mod ids;
pub mod models;
pub mod protocol;
