//! Prefixed ID generation.
//!
//! All entity IDs use a `prefix_` followed by a UUIDv7 (time-ordered).
//! IDs are globally unique, sortable by creation time, and identifiable
//! by type when reading logs or database rows. Gateway connection IDs
//! rely on the ordering: sorting them yields admission order.

use uuid::Uuid;

use crate::models::ContentKind;

/// Generate a prefixed ID using UUIDv7.
fn prefixed_id(prefix: &str) -> String {
    let id = Uuid::now_v7();
    format!("{}_{}", prefix, id.as_simple())
}

/// Generate a user ID: `usr_<uuid7>`
pub fn user_id() -> String {
    prefixed_id("usr")
}

/// Generate an API token record ID: `tok_<uuid7>`
pub fn api_token_id() -> String {
    prefixed_id("tok")
}

/// Generate an admin gateway connection ID: `ws_<uuid7>`
pub fn connection_id() -> String {
    prefixed_id("ws")
}

/// Generate a content ID for the given kind (`pst_`, `nte_`, `pge_`).
pub fn content_id(kind: ContentKind) -> String {
    prefixed_id(kind.id_prefix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_have_correct_prefix() {
        assert!(user_id().starts_with("usr_"));
        assert!(api_token_id().starts_with("tok_"));
        assert!(connection_id().starts_with("ws_"));
        assert!(content_id(ContentKind::Post).starts_with("pst_"));
        assert!(content_id(ContentKind::Note).starts_with("nte_"));
        assert!(content_id(ContentKind::Page).starts_with("pge_"));
    }

    #[test]
    fn ids_are_unique() {
        let a = connection_id();
        let b = connection_id();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_sortable_by_time() {
        let a = connection_id();
        let b = connection_id();
        // UUIDv7 are time-ordered, so b > a lexicographically
        assert!(b > a, "Expected {b} > {a}");
    }
}
