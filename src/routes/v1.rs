pub mod chats;
pub mod friends;
pub mod matchmaking;
pub mod users;
pub mod websocket;

use crate::app_state::AppState;
use crate::config::AppConfig;
use axum::Router;

pub fn v1_routes(config: &AppConfig) -> Router<AppState> {
    Router::new()
        .nest("/users", users::users_routes())
        .nest("/matchmaking", matchmaking::matchmaking_routes())
        .nest("/chats", chats::chats_routes(config))
        .nest("/friends", friends::friends_routes())
        .merge(websocket::websocket_routes())
}
