use crate::config::AppConfig;
use crate::handlers::v1::chats;
use crate::{app_state::AppState, middlewares::auth::auth_middleware};
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::{middleware, Router};

// Headroom for multipart boundaries and the caption field
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn chats_routes(config: &AppConfig) -> Router<AppState> {
    // Protected routes that require authentication
    Router::new()
        .route("/", get(chats::list_chats))
        .route(
            "/active",
            get(chats::get_active_chat).put(chats::set_active_chat),
        )
        .route("/{chat_id}", delete(chats::delete_chat))
        .route("/{chat_id}/end", post(chats::end_chat))
        .route(
            "/{chat_id}/messages",
            get(chats::list_messages).post(chats::send_message),
        )
        .route(
            "/{chat_id}/attachments",
            post(chats::upload_attachment).layer(DefaultBodyLimit::max(
                config.max_attachment_bytes + MULTIPART_OVERHEAD,
            )),
        )
        .route("/{chat_id}/read", post(chats::mark_read))
        .route("/{chat_id}/friend_request", post(chats::send_friend_request))
        .route("/{chat_id}/friend_status", get(chats::friend_status))
        .layer(middleware::from_fn(auth_middleware))
}
