//! Database connection pool, migrations, and development seed data.

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use mx_common::models::{ContentDraft, ContentKind, User};
use mx_common::{auth, ids};

use crate::store::Backend;

/// Connect to PostgreSQL and return a connection pool.
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;

    tracing::info!("connected to PostgreSQL");
    Ok(pool)
}

/// Run embedded SQL migrations.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database migrations complete");
    Ok(())
}

/// Insert an `admin`/`admin` user and a few sample items.
/// Activated by setting the `DEV_SEED` environment variable.
pub async fn seed_dev_data(backend: &Backend) -> anyhow::Result<()> {
    let user = User {
        id: ids::user_id(),
        username: "admin".into(),
        password_hash: auth::hash_password("admin")?,
        auth_code: auth::generate_auth_code(),
        created_at: Utc::now(),
    };
    if !backend.identity.insert_first_user(&user).await? {
        tracing::info!("dev seed data already exists, skipping");
        return Ok(());
    }

    for n in 1..=3 {
        backend
            .content
            .insert(
                ContentKind::Note,
                ContentDraft {
                    title: format!("Note {n}"),
                    text: format!("Sample note number {n}."),
                    ..Default::default()
                },
            )
            .await?;
    }

    backend
        .content
        .insert(
            ContentKind::Post,
            ContentDraft {
                title: "Hello, world".into(),
                text: "The first post.".into(),
                slug: Some("hello-world".into()),
                ..Default::default()
            },
        )
        .await?;

    backend
        .content
        .insert(
            ContentKind::Page,
            ContentDraft {
                title: "About".into(),
                text: "About this site.".into(),
                slug: Some("about".into()),
                ..Default::default()
            },
        )
        .await?;

    tracing::info!(user_id = %user.id, "dev seed data inserted (admin / admin)");
    Ok(())
}
