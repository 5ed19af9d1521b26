use crate::handlers::v1::friends;
use crate::{app_state::AppState, middlewares::auth::auth_middleware};
use axum::routing::{get, post};
use axum::{middleware, Router};

pub fn friends_routes() -> Router<AppState> {
    // Protected routes that require authentication
    Router::new()
        .route("/requests", get(friends::incoming_requests))
        .route(
            "/requests/{request_id}/accept",
            post(friends::accept_friend_request),
        )
        .route(
            "/requests/{request_id}/reject",
            post(friends::reject_friend_request),
        )
        .layer(middleware::from_fn(auth_middleware))
}
