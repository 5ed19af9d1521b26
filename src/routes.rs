mod index;
mod v1;

use crate::app_state::AppState;
use crate::config::AppConfig;
use axum::{http::header, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub fn create_routes(config: &AppConfig) -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .merge(index::index_route())
        .nest("/api/v1", v1::v1_routes(config))
        .nest_service("/files", ServeDir::new(&config.blob_storage_path))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
