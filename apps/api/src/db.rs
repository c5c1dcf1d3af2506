use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Idempotent DDL, applied statement by statement at startup.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            UUID PRIMARY KEY,
        username      TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL,
        updated_at    TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resumes (
        id             UUID PRIMARY KEY,
        author         UUID NOT NULL,
        field          TEXT NOT NULL,
        work           TEXT[] NOT NULL,
        school         TEXT[] NOT NULL,
        initial_rating DOUBLE PRECISION NOT NULL,
        created_at     TIMESTAMPTZ NOT NULL,
        updated_at     TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS resumes_author_idx ON resumes (author)",
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id         UUID PRIMARY KEY,
        author     UUID NOT NULL,
        title      TEXT NOT NULL,
        content    TEXT NOT NULL,
        audience   TEXT[] NOT NULL,
        tags       TEXT[] NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS posts_author_idx ON posts (author)",
    r#"
    CREATE TABLE IF NOT EXISTS annotations (
        id         UUID PRIMARY KEY,
        original   UUID NOT NULL,
        author     UUID NOT NULL,
        comment    TEXT NOT NULL,
        quote      TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS annotations_original_idx ON annotations (original)",
    "CREATE INDEX IF NOT EXISTS annotations_author_idx ON annotations (author)",
    r#"
    CREATE TABLE IF NOT EXISTS validations (
        id             UUID PRIMARY KEY,
        kind           TEXT NOT NULL,
        object_id      UUID NOT NULL,
        have_validated UUID[] NOT NULL,
        have_refuted   UUID[] NOT NULL,
        created_at     TIMESTAMPTZ NOT NULL,
        updated_at     TIMESTAMPTZ NOT NULL,
        UNIQUE (kind, object_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dependency_maps (
        id         UUID PRIMARY KEY,
        author     UUID NOT NULL,
        title      TEXT NOT NULL,
        tags       TEXT[] NOT NULL,
        deps       JSONB NOT NULL,
        all_items  UUID[] NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates any missing tables and indexes.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to apply schema statement: {}", statement.trim()))?;
    }
    info!("Schema ready ({} statements)", SCHEMA.len());
    Ok(())
}
