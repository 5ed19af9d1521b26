use std::sync::Arc;

use anyhow::{Context, Result};
use tower_sessions::{MemoryStore as SessionMemoryStore, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::EnvFilter;

use stranger_chat::{
    app_state::AppState,
    blobs::{BlobStore, LocalBlobStore},
    config::AppConfig,
    db, routes,
    services::{AlwaysReachable, ChatServices, Presence},
    store::{MemoryStore, PgStore, Store},
    websocket::manager::WebSocketManager,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stranger_chat=debug")),
        )
        .init();

    tracing::info!("Starting stranger-chat v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env();
    if let Err(e) = run(config).await {
        tracing::error!(error = ?e, "Server failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let blobs: Arc<dyn BlobStore> = Arc::new(
        LocalBlobStore::new(
            config.blob_storage_path.clone(),
            config.public_base_url.clone(),
            config.max_attachment_bytes,
        )
        .await
        .context("Failed to initialize attachment storage")?,
    );

    let websocket_manager = WebSocketManager::new();
    let presence: Arc<dyn Presence> = if config.require_live_connection {
        Arc::new(websocket_manager.clone())
    } else {
        Arc::new(AlwaysReachable)
    };

    let router = routes::create_routes(&config);
    let config = Arc::new(config);
    let build_state = |store: Arc<dyn Store>| AppState {
        services: ChatServices::new(
            store,
            blobs.clone(),
            presence.clone(),
            config.chat_settings(),
        ),
        websocket_manager: websocket_manager.clone(),
        config: config.clone(),
    };

    let app = match &config.database_url {
        Some(url) => {
            let pool = db::connect_to_db(url, config.db_max_connections).await?;
            db::run_migrations(&pool).await?;

            let session_store = PostgresStore::new(pool.clone());
            session_store
                .migrate()
                .await
                .context("Failed to migrate session store")?;

            tracing::info!("Using PostgreSQL document store");
            let state = build_state(Arc::new(PgStore::new(pool)));
            router
                .layer(SessionManagerLayer::new(session_store).with_secure(false))
                .with_state(state)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; state is lost on restart");
            let state = build_state(Arc::new(MemoryStore::new()));
            router
                .layer(SessionManagerLayer::new(SessionMemoryStore::default()).with_secure(false))
                .with_state(state)
        }
    };

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_addr))?;
    tracing::info!(addr = %config.http_addr, "HTTP server listening");
    axum::serve(listener, app).await.context("HTTP server error")?;
    Ok(())
}
