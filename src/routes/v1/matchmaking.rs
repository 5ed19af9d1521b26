use crate::handlers::v1::matchmaking;
use crate::{app_state::AppState, middlewares::auth::auth_middleware};
use axum::routing::post;
use axum::{middleware, Router};

pub fn matchmaking_routes() -> Router<AppState> {
    // Protected routes that require authentication
    Router::new()
        .route("/start", post(matchmaking::start))
        .route("/cancel", post(matchmaking::cancel))
        .layer(middleware::from_fn(auth_middleware))
}
