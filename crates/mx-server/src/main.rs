//! mx-server
//!
//! Single binary that runs:
//! - REST API for posts, notes, pages and site options
//! - WebSocket endpoint for authenticated admin clients

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use mx_common::auth::JwtContext;
use mx_server::config::ServerConfig;
use mx_server::store::Backend;
use mx_server::{app, db, state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // ── Storage ─────────────────────────────────────────────────
    let backend = match config.database_url {
        Some(ref url) => {
            let pool = db::connect(url).await?;
            db::migrate(&pool).await?;
            Backend::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores (data is lost on exit)");
            Backend::memory()
        }
    };

    // ── Dev seed data ───────────────────────────────────────────
    if config.dev_seed {
        db::seed_dev_data(&backend).await?;
    }

    // ── JWT context ─────────────────────────────────────────────
    let jwt = match config.jwt_seed_b64 {
        Some(ref seed) => JwtContext::from_ed25519_seed(seed)
            .map_err(|e| anyhow::anyhow!("invalid JWT seed: {e}"))?,
        None => {
            tracing::warn!("JWT_SEED_B64 not set, generating ephemeral key (tokens won't survive restart)");
            JwtContext::generate().0
        }
    };

    // ── Router ──────────────────────────────────────────────────
    let state = state::AppState::new(backend, jwt, &config);
    let app = app(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // ── Listen ──────────────────────────────────────────────────
    tracing::info!("mx-server listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
