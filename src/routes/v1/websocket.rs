use axum::{middleware, routing::get, Router};

use crate::{app_state::AppState, middlewares::auth::auth_middleware, websocket::handlers};

/// `/ws` upgrades an authenticated session into the live chat feed.
pub fn websocket_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(handlers::websocket_handler))
        .layer(middleware::from_fn(auth_middleware))
}
