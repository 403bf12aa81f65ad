//! Admin gateway tests over a real TCP socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use mx_common::auth::JwtContext;
use mx_common::models::{ApiToken, User};
use mx_server::config::ServerConfig;
use mx_server::state::AppState;
use mx_server::store::memory::MemoryIdentityStore;
use mx_server::store::{Backend, IdentityStore, StoreError};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the app on an ephemeral port.
async fn spawn_server() -> (SocketAddr, AppState) {
    spawn_server_with(Backend::memory()).await
}

async fn spawn_server_with(backend: Backend) -> (SocketAddr, AppState) {
    let (jwt, _) = JwtContext::generate();
    let state = AppState::new(backend, jwt, &ServerConfig::default());
    let app = mx_server::app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn call(state: &AppState, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let req = builder.body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap();
    let resp = mx_server::app(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn session_token(state: &AppState) -> String {
    let creds = json!({"username": "admin", "password": "password123"});
    let (status, _) = call(state, "POST", "/api/auth/register", None, creds.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, body) = call(state, "POST", "/api/auth/login", None, creds).await;
    body["token"].as_str().unwrap().to_string()
}

async fn connect(addr: SocketAddr, token: &str) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/admin?token={token}"))
        .await
        .unwrap();
    ws
}

async fn next_message(ws: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("websocket error")
}

async fn wait_for_clients(state: &AppState, n: usize) {
    for _ in 0..200 {
        if state.registry().len() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {n} clients, have {}", state.registry().len());
}

fn assert_policy_close(msg: Message) {
    match msg {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_token_gets_auth_failed_then_close() {
    let (addr, state) = spawn_server().await;
    let mut ws = connect(addr, "not-a-token").await;

    match next_message(&mut ws).await {
        Message::Text(text) => {
            let msg: Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(msg["type"], "AUTH_FAILED");
        }
        other => panic!("expected AUTH_FAILED, got {other:?}"),
    }
    assert_policy_close(next_message(&mut ws).await);
    assert!(state.registry().is_empty());
}

#[tokio::test]
async fn missing_token_is_rejected() {
    let (addr, _) = spawn_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/admin"))
        .await
        .unwrap();
    assert!(matches!(next_message(&mut ws).await, Message::Text(_)));
    assert_policy_close(next_message(&mut ws).await);
}

#[tokio::test]
async fn admitted_client_receives_content_events() {
    let (addr, state) = spawn_server().await;
    let token = session_token(&state).await;
    let mut ws = connect(addr, &token).await;
    wait_for_clients(&state, 1).await;

    let (status, _) = call(&state, "POST", "/api/notes", Some(&token), json!({"title": "hello"})).await;
    assert_eq!(status, StatusCode::CREATED);

    match next_message(&mut ws).await {
        Message::Text(text) => {
            let msg: Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(msg["type"], "NOTE_CREATE");
            assert_eq!(msg["payload"]["title"], "hello");
        }
        other => panic!("expected NOTE_CREATE, got {other:?}"),
    }

    let (_, clients) = call(&state, "GET", "/api/gateway/clients", Some(&token), Value::Null).await;
    assert_eq!(clients.as_array().unwrap().len(), 1);
    assert_eq!(clients[0]["username"], "admin");
}

#[tokio::test]
async fn authorization_header_is_accepted() {
    let (addr, state) = spawn_server().await;
    let token = session_token(&state).await;

    let mut req = format!("ws://{addr}/admin").into_client_request().unwrap();
    req.headers_mut()
        .insert("authorization", format!("Bearer {token}").parse().unwrap());
    let (_ws, _) = tokio_tungstenite::connect_async(req).await.unwrap();

    wait_for_clients(&state, 1).await;
}

#[tokio::test]
async fn logout_closes_connections_using_that_credential() {
    let (addr, state) = spawn_server().await;
    let token = session_token(&state).await;
    let mut first = connect(addr, &token).await;
    let mut second = connect(addr, &token).await;
    wait_for_clients(&state, 2).await;

    let (status, body) = call(&state, "POST", "/api/auth/logout", Some(&token), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 2);

    assert_policy_close(next_message(&mut first).await);
    assert_policy_close(next_message(&mut second).await);
    assert!(state.registry().is_empty());
}

#[tokio::test]
async fn deleting_api_token_revokes_its_connections() {
    let (addr, state) = spawn_server().await;
    let jwt = session_token(&state).await;
    let (_, created) = call(&state, "POST", "/api/auth/tokens", Some(&jwt), json!({"name": "bot"})).await;
    let secret = created["token"].as_str().unwrap().to_string();
    let id = created["id"].as_str().unwrap().to_string();

    let mut bot = connect(addr, &secret).await;
    let _admin = connect(addr, &jwt).await;
    wait_for_clients(&state, 2).await;

    let (_, body) = call(&state, "DELETE", &format!("/api/auth/tokens/{id}"), Some(&jwt), Value::Null).await;
    assert_eq!(body["revoked"], 1);
    assert_policy_close(next_message(&mut bot).await);
    wait_for_clients(&state, 1).await;
}

#[tokio::test]
async fn client_disconnect_removes_entry() {
    let (addr, state) = spawn_server().await;
    let token = session_token(&state).await;
    let ws = connect(addr, &token).await;
    wait_for_clients(&state, 1).await;

    drop(ws);
    wait_for_clients(&state, 0).await;
}

/// Memory identity store whose next `find_user` blocks until released.
#[derive(Default)]
struct HeldIdentity {
    inner: MemoryIdentityStore,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl IdentityStore for HeldIdentity {
    async fn count_users(&self) -> Result<u64, StoreError> {
        self.inner.count_users().await
    }
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.insert_user(user).await
    }
    async fn insert_first_user(&self, user: &User) -> Result<bool, StoreError> {
        self.inner.insert_first_user(user).await
    }
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.find_user(id).await
    }
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_username(username).await
    }
    async fn update_credentials(&self, id: &str, hash: &str, code: &str) -> Result<bool, StoreError> {
        self.inner.update_credentials(id, hash, code).await
    }
    async fn insert_api_token(&self, token: &ApiToken) -> Result<(), StoreError> {
        self.inner.insert_api_token(token).await
    }
    async fn find_api_token(&self, secret: &str) -> Result<Option<ApiToken>, StoreError> {
        self.inner.find_api_token(secret).await
    }
    async fn list_api_tokens(&self, user_id: &str) -> Result<Vec<ApiToken>, StoreError> {
        self.inner.list_api_tokens(user_id).await
    }
    async fn delete_api_token(&self, user_id: &str, id: &str) -> Result<Option<ApiToken>, StoreError> {
        self.inner.delete_api_token(user_id, id).await
    }
}

#[tokio::test]
async fn token_deleted_during_handshake_is_not_admitted() {
    let identity = Arc::new(HeldIdentity::default());
    let mut backend = Backend::memory();
    backend.identity = identity.clone();
    let (addr, state) = spawn_server_with(backend).await;

    let jwt = session_token(&state).await;
    let (_, created) = call(&state, "POST", "/api/auth/tokens", Some(&jwt), json!({"name": "bot"})).await;
    let secret = created["token"].as_str().unwrap().to_string();
    let id = created["id"].as_str().unwrap().to_string();

    // Hold the handshake's user lookup, revoke meanwhile, then let it finish.
    identity.armed.store(true, Ordering::SeqCst);
    let mut bot = connect(addr, &secret).await;
    tokio::time::timeout(Duration::from_secs(5), identity.entered.notified())
        .await
        .expect("handshake never reached the identity store");

    let (status, body) = call(&state, "DELETE", &format!("/api/auth/tokens/{id}"), Some(&jwt), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 0);
    identity.release.notify_one();

    match next_message(&mut bot).await {
        Message::Text(text) => {
            let msg: Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(msg["type"], "AUTH_FAILED");
        }
        other => panic!("expected AUTH_FAILED, got {other:?}"),
    }
    assert_policy_close(next_message(&mut bot).await);
    assert!(state.registry().is_empty());
}
