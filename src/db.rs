use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn connect_to_db(db_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .context("Failed to connect to database")?;
    Ok(pool)
}

/// Create the document table backing [`crate::store::PgStore`].
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            path TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            data JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create documents table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS documents_collection_idx ON documents (collection)")
        .execute(pool)
        .await
        .context("Failed to create collection index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS documents_data_idx ON documents USING GIN (data)")
        .execute(pool)
        .await
        .context("Failed to create data index")?;

    tracing::info!("Database migrations applied");
    Ok(())
}
