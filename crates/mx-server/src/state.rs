//! Shared application state.

use std::sync::Arc;

use mx_common::auth::JwtContext;
use mx_common::models::ContentKind;
use mx_common::protocol::{ContentChange, EventType, GatewayMessage};

use crate::config::ServerConfig;
use crate::content::navigation::NeighborWindowResolver;
use crate::gateway::{AuthVerifier, ConnectionRegistry, RevocationSweeper};
use crate::options::OptionsService;
use crate::store::{Backend, ContentStore, IdentityStore};

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Backend,
    jwt: Arc<JwtContext>,
    verifier: AuthVerifier,
    /// Live admin gateway connections.
    registry: Arc<ConnectionRegistry>,
    sweeper: RevocationSweeper,
    options: OptionsService,
    jwt_ttl_secs: i64,
}

impl AppState {
    pub fn new(backend: Backend, jwt: JwtContext, config: &ServerConfig) -> Self {
        let jwt = Arc::new(jwt);
        let registry = Arc::new(ConnectionRegistry::new());
        let verifier = AuthVerifier::new(
            backend.identity.clone(),
            jwt.clone(),
            config.identity_timeout,
        );
        let options = OptionsService::new(backend.options.clone(), backend.content.clone());
        Self {
            inner: Arc::new(Inner {
                sweeper: RevocationSweeper::new(registry.clone()),
                backend,
                jwt,
                verifier,
                registry,
                options,
                jwt_ttl_secs: config.jwt_ttl_secs,
            }),
        }
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.inner.backend.content
    }

    pub fn identity(&self) -> &Arc<dyn IdentityStore> {
        &self.inner.backend.identity
    }

    pub fn jwt(&self) -> &JwtContext {
        &self.inner.jwt
    }

    pub fn jwt_ttl_secs(&self) -> i64 {
        self.inner.jwt_ttl_secs
    }

    pub fn verifier(&self) -> &AuthVerifier {
        &self.inner.verifier
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn sweeper(&self) -> &RevocationSweeper {
        &self.inner.sweeper
    }

    pub fn options(&self) -> &OptionsService {
        &self.inner.options
    }

    /// Navigation over one content collection.
    pub fn navigator(&self, kind: ContentKind) -> NeighborWindowResolver {
        NeighborWindowResolver::new(self.inner.backend.content.clone(), kind)
    }

    /// Notify every admin connection of a content change.
    pub fn broadcast_content(
        &self,
        kind: ContentKind,
        change: ContentChange,
        payload: impl serde::Serialize,
    ) {
        let message = GatewayMessage::new(EventType::for_content(kind, change), payload);
        let delivered = self.inner.registry.broadcast(&message);
        tracing::debug!(kind = %kind, delivered, "content event broadcast");
    }
}
