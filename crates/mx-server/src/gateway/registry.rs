//! Live admin connections.
//!
//! Both indexes live behind one mutex and are only mutated together, so
//! every public operation is atomic with respect to every other.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use mx_common::protocol::GatewayMessage;

use super::verifier::{CredentialKind, Principal};

/// Per-connection outbound queue depth.
pub const OUTBOUND_CAPACITY: usize = 64;

/// Instruction for a connection's socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized [`GatewayMessage`] to forward as a text frame.
    Message(String),
    /// Send a close frame with this reason and stop.
    Close(String),
}

/// A registered connection. The socket itself is owned by its task; the
/// registry only holds the sending half of the task's queue.
#[derive(Debug)]
pub struct Connection {
    pub id: String,
    credential: String,
    pub principal: Principal,
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<Outbound>,
}

impl Connection {
    /// Build a connection and the receiver its socket task drains.
    pub fn new(
        id: impl Into<String>,
        credential: impl Into<String>,
        principal: Principal,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let conn = Self {
            id: id.into(),
            credential: credential.into(),
            principal,
            connected_at: Utc::now(),
            tx,
        };
        (conn, rx)
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            id: self.id.clone(),
            user_id: self.principal.user_id.clone(),
            username: self.principal.username.clone(),
            via: self.principal.via,
            connected_at: self.connected_at,
        }
    }

    fn close(&self, reason: &str) {
        if let Err(e) = self.tx.try_send(Outbound::Close(reason.to_string())) {
            // Dropping the entry drops the sender, which ends the task anyway.
            tracing::warn!(connection_id = %self.id, error = %e, "transport close failure");
        }
    }
}

/// Read-only view of a connection. Never carries the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub via: CredentialKind,
    pub connected_at: DateTime<Utc>,
}

#[derive(Default)]
struct Indexes {
    by_id: BTreeMap<String, Connection>,
    by_credential: HashMap<String, BTreeSet<String>>,
}

impl Indexes {
    fn unlink(&mut self, conn: &Connection) {
        if let Some(ids) = self.by_credential.get_mut(&conn.credential) {
            ids.remove(&conn.id);
            if ids.is_empty() {
                self.by_credential.remove(&conn.credential);
            }
        }
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Indexes>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a verified connection. An existing entry with the same id
    /// is closed and replaced.
    pub fn admit(&self, conn: Connection) {
        let mut idx = self.inner.lock();
        if let Some(old) = idx.by_id.remove(&conn.id) {
            old.close("replaced");
            idx.unlink(&old);
        }
        idx.by_credential
            .entry(conn.credential.clone())
            .or_default()
            .insert(conn.id.clone());
        tracing::info!(
            connection_id = %conn.id,
            user_id = %conn.principal.user_id,
            "admin client admitted"
        );
        idx.by_id.insert(conn.id.clone(), conn);
    }

    /// Forget a connection without closing it. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut idx = self.inner.lock();
        match idx.by_id.remove(id) {
            Some(conn) => {
                idx.unlink(&conn);
                true
            }
            None => false,
        }
    }

    pub fn find(&self, id: &str) -> Option<ConnectionSnapshot> {
        self.inner.lock().by_id.get(id).map(Connection::snapshot)
    }

    /// Close and remove every connection admitted with `credential`.
    /// Returns how many were removed.
    pub fn revoke_by_credential(&self, credential: &str) -> usize {
        let mut idx = self.inner.lock();
        let Some(ids) = idx.by_credential.remove(credential) else {
            return 0;
        };
        let mut revoked = 0;
        for id in ids {
            if let Some(conn) = idx.by_id.remove(&id) {
                conn.close("credential revoked");
                revoked += 1;
            }
        }
        revoked
    }

    /// Close and remove every session-token connection of `user_id`. API
    /// token connections are left alone. Returns how many were removed.
    pub fn revoke_sessions_of(&self, user_id: &str) -> usize {
        let mut idx = self.inner.lock();
        let ids: Vec<String> = idx
            .by_id
            .values()
            .filter(|c| c.principal.user_id == user_id && c.principal.via == CredentialKind::Session)
            .map(|c| c.id.clone())
            .collect();
        for id in &ids {
            if let Some(conn) = idx.by_id.remove(id) {
                conn.close("session invalidated");
                idx.unlink(&conn);
            }
        }
        ids.len()
    }

    /// Queue `message` on every live connection. Returns how many accepted it.
    pub fn broadcast(&self, message: &GatewayMessage) -> usize {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize gateway message");
                return 0;
            }
        };
        let idx = self.inner.lock();
        idx.by_id
            .values()
            .filter(|conn| match conn.tx.try_send(Outbound::Message(json.clone())) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(connection_id = %conn.id, error = %e, "broadcast dropped");
                    false
                }
            })
            .count()
    }

    /// Queue `message` on one connection.
    pub fn send_to(&self, id: &str, message: &GatewayMessage) -> bool {
        let Ok(json) = message.to_json() else {
            return false;
        };
        let idx = self.inner.lock();
        idx.by_id
            .get(id)
            .is_some_and(|conn| conn.tx.try_send(Outbound::Message(json)).is_ok())
    }

    /// All live connections in admission order.
    pub fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        self.inner
            .lock()
            .by_id
            .values()
            .map(Connection::snapshot)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mx_common::protocol::EventType;

    fn principal() -> Principal {
        Principal {
            user_id: "usr_1".into(),
            username: "admin".into(),
            via: CredentialKind::Session,
        }
    }

    fn admit(
        registry: &ConnectionRegistry,
        id: &str,
        credential: &str,
    ) -> mpsc::Receiver<Outbound> {
        let (conn, rx) = Connection::new(id, credential, principal());
        registry.admit(conn);
        rx
    }

    #[test]
    fn revoke_with_no_matches_changes_nothing() {
        let registry = ConnectionRegistry::new();
        let mut rx = admit(&registry, "ws_1", "alpha");

        assert_eq!(registry.revoke_by_credential("beta"), 0);
        assert_eq!(registry.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn revoke_twice_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let mut a = admit(&registry, "ws_1", "alpha");
        let mut b = admit(&registry, "ws_2", "alpha");
        let _c = admit(&registry, "ws_3", "beta");

        assert_eq!(registry.revoke_by_credential("alpha"), 2);
        assert_eq!(registry.revoke_by_credential("alpha"), 0);
        assert_eq!(registry.len(), 1);
        assert!(matches!(a.try_recv(), Ok(Outbound::Close(_))));
        assert!(matches!(b.try_recv(), Ok(Outbound::Close(_))));
    }

    #[test]
    fn remove_and_find() {
        let registry = ConnectionRegistry::new();
        let _rx = admit(&registry, "ws_1", "alpha");

        let snap = registry.find("ws_1").unwrap();
        assert_eq!(snap.username, "admin");
        assert!(!serde_json::to_string(&snap).unwrap().contains("alpha"));

        assert!(registry.remove("ws_1"));
        assert!(!registry.remove("ws_1"));
        assert!(registry.find("ws_1").is_none());
        // The credential index is cleaned up with the entry.
        assert_eq!(registry.revoke_by_credential("alpha"), 0);
    }

    #[test]
    fn duplicate_id_replaces_and_closes_old_entry() {
        let registry = ConnectionRegistry::new();
        let mut old = admit(&registry, "ws_1", "alpha");
        let _new = admit(&registry, "ws_1", "beta");

        assert_eq!(registry.len(), 1);
        assert!(matches!(old.try_recv(), Ok(Outbound::Close(_))));
        assert_eq!(registry.revoke_by_credential("alpha"), 0);
        assert_eq!(registry.revoke_by_credential("beta"), 1);
    }

    #[test]
    fn close_failure_still_removes_entry() {
        let registry = ConnectionRegistry::new();
        let rx = admit(&registry, "ws_1", "alpha");
        drop(rx);

        assert_eq!(registry.revoke_by_credential("alpha"), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn broadcast_reaches_every_connection() {
        let registry = ConnectionRegistry::new();
        let mut a = admit(&registry, "ws_1", "alpha");
        let mut b = admit(&registry, "ws_2", "beta");

        let msg = GatewayMessage::new(EventType::NoteCreate, serde_json::json!({"nid": 1}));
        assert_eq!(registry.broadcast(&msg), 2);
        for rx in [&mut a, &mut b] {
            match rx.try_recv() {
                Ok(Outbound::Message(json)) => assert!(json.contains("NOTE_CREATE")),
                other => panic!("unexpected {other:?}"),
            }
        }

        assert!(registry.send_to("ws_2", &msg));
        assert!(!registry.send_to("ws_9", &msg));
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_ok());
    }

    #[test]
    fn revoke_sessions_keeps_api_token_connections() {
        let registry = ConnectionRegistry::new();
        let _s1 = admit(&registry, "ws_1", "jwt-a");
        let _s2 = admit(&registry, "ws_2", "jwt-b");
        let (conn, _t) = Connection::new(
            "ws_3",
            "txo-token",
            Principal {
                via: CredentialKind::ApiToken,
                ..principal()
            },
        );
        registry.admit(conn);

        assert_eq!(registry.revoke_sessions_of("usr_1"), 2);
        assert_eq!(registry.revoke_sessions_of("usr_1"), 0);
        let left: Vec<_> = registry.snapshot().into_iter().map(|s| s.id).collect();
        assert_eq!(left, vec!["ws_3"]);
        assert_eq!(registry.revoke_by_credential("jwt-a"), 0);
    }

    #[test]
    fn snapshot_is_in_admission_order() {
        let registry = ConnectionRegistry::new();
        let _a = admit(&registry, "ws_a", "x");
        let _b = admit(&registry, "ws_b", "y");
        let ids: Vec<_> = registry.snapshot().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["ws_a", "ws_b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admission_then_partial_revoke() {
        let registry = Arc::new(ConnectionRegistry::new());

        let tasks: Vec<_> = (0..100)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let credential = if i < 40 {
                        "shared".to_string()
                    } else {
                        format!("cred-{i}")
                    };
                    admit(&registry, &format!("ws_{i:03}"), &credential)
                })
            })
            .collect();

        let mut receivers = Vec::new();
        for task in tasks {
            receivers.push(task.await.unwrap());
        }
        assert_eq!(registry.len(), 100);

        assert_eq!(registry.revoke_by_credential("shared"), 40);
        assert_eq!(registry.len(), 60);

        let idx = registry.inner.lock();
        for (id, conn) in &idx.by_id {
            let i: usize = id.trim_start_matches("ws_").parse().unwrap();
            assert!(i >= 40);
            assert_eq!(conn.credential, format!("cred-{i}"));
        }
        assert!(!idx.by_credential.contains_key("shared"));
        drop(idx);

        for (i, rx) in receivers.iter_mut().enumerate() {
            let closed = matches!(rx.try_recv(), Ok(Outbound::Close(_)));
            assert_eq!(closed, i < 40, "connection {i}");
        }
    }
}
