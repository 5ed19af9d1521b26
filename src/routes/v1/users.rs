use crate::handlers::v1::users;
use crate::{app_state::AppState, middlewares::auth::auth_middleware};
use axum::{middleware, routing::get, routing::post, Router};

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(users::me))
        .route_layer(middleware::from_fn(auth_middleware))
        .route("/session", post(users::create_session)) // /api/v1/users/session
}
