//! WebSocket handler for the admin gateway.
//!
//! Endpoint: GET /admin
//!
//! The credential is taken from `?token=` or the `Authorization` header and
//! verified once the socket is open, and again right after registration.
//! Rejected clients receive an `AUTH_FAILED` message followed by a close
//! frame. Accepted clients receive content events until they disconnect or
//! their credential is revoked.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::stream::StreamExt;
use futures::SinkExt;
use serde::Deserialize;

use mx_common::ids;
use mx_common::protocol::GatewayMessage;

use super::registry::{Connection, Outbound};
use super::verifier::{credential_from_handshake, RejectReason, Verdict};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    pub token: Option<String>,
}

/// Axum handler — upgrades HTTP to WebSocket.
pub async fn handler(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let credential = credential_from_handshake(query.token.as_deref(), &headers);
    ws.on_upgrade(move |socket| handle_socket(state, socket, credential))
}

async fn handle_socket(state: AppState, socket: WebSocket, credential: Option<String>) {
    let verdict = state.verifier().verify(credential.as_deref()).await;
    let (principal, credential) = match (verdict, credential) {
        (Verdict::Accepted(principal), Some(credential)) => (principal, credential),
        (Verdict::Accepted(_), None) => return reject(socket, RejectReason::Malformed).await,
        (Verdict::Rejected(reason), _) => return reject(socket, reason).await,
    };

    let connection_id = ids::connection_id();
    let (conn, mut rx) = Connection::new(&connection_id, credential.clone(), principal);
    state.registry().admit(conn);

    // A revocation that ran during the first check found nothing to close.
    // Once admitted, any later revocation finds this entry.
    if let Verdict::Rejected(reason) = state.verifier().verify(Some(&credential)).await {
        state.registry().remove(&connection_id);
        return reject(socket, reason).await;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            out = rx.recv() => {
                match out {
                    Some(Outbound::Message(json)) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close(reason)) => {
                        let frame = CloseFrame {
                            code: close_code::POLICY,
                            reason: reason.into(),
                        };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        break;
                    }
                    // Entry dropped from the registry without a close.
                    None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "admin socket error");
                        break;
                    }
                    _ => {} // Admin clients only listen
                }
            }
        }
    }

    state.registry().remove(&connection_id);
    tracing::info!(connection_id = %connection_id, "admin client disconnected");
}

async fn reject(mut socket: WebSocket, reason: RejectReason) {
    tracing::info!(reason = %reason, "admin handshake rejected");

    match GatewayMessage::auth_failed("authentication failed").to_json() {
        Ok(json) => {
            let _ = socket.send(Message::Text(json.into())).await;
        }
        Err(e) => tracing::warn!(error = %e, "failed to serialize AUTH_FAILED"),
    }

    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: "authentication failed".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}
