//! Force-disconnect sessions whose credential was invalidated.

use std::sync::Arc;

use super::registry::ConnectionRegistry;

/// Entry point for identity management (logout, password change, token
/// deletion) to drop live connections tied to a credential.
#[derive(Clone)]
pub struct RevocationSweeper {
    registry: Arc<ConnectionRegistry>,
}

impl RevocationSweeper {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Close every connection admitted with `credential`. Safe to repeat.
    pub fn on_credential_invalidated(&self, credential: &str) -> usize {
        let revoked = self.registry.revoke_by_credential(credential);
        tracing::info!(revoked, "credential invalidated");
        revoked
    }

    /// Close every session connection of a user whose auth code was just
    /// rotated. Their JWTs stop verifying anyway; this drops live sockets.
    pub fn on_auth_code_rotated(&self, user_id: &str) -> usize {
        let revoked = self.registry.revoke_sessions_of(user_id);
        tracing::info!(user_id = %user_id, revoked, "auth code rotated");
        revoked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::registry::Connection;
    use crate::gateway::verifier::{CredentialKind, Principal};

    #[test]
    fn sweeps_matching_connections_once() {
        let registry = Arc::new(ConnectionRegistry::new());
        let principal = Principal {
            user_id: "usr_1".into(),
            username: "admin".into(),
            via: CredentialKind::ApiToken,
        };
        let (conn, _rx) = Connection::new("ws_1", "txo-secret", principal);
        registry.admit(conn);

        let sweeper = RevocationSweeper::new(registry.clone());
        assert_eq!(sweeper.on_credential_invalidated("txo-secret"), 1);
        assert_eq!(sweeper.on_credential_invalidated("txo-secret"), 0);
        assert!(registry.is_empty());
    }
}
