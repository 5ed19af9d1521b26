use anyhow::anyhow;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::Session;
use validator::Validate;

use crate::{
    app_state::AppState,
    blobs::Upload,
    error::{AppError, AppResult},
    middlewares::auth::current_user,
    models::{
        chats::{Chat, Message},
        friends::{FriendRequest, FriendStatusView},
    },
};

use super::validation_error;

pub async fn list_chats(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<Chat>>> {
    let user = current_user(&session).await?;
    let chats = state.services.sessions.active_chats(&user.user_id).await?;
    state.services.sessions.reconcile_active(&user.user_id, &chats);
    Ok(Json(chats))
}

pub async fn get_active_chat(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Value>> {
    let user = current_user(&session).await?;
    let chat_id = state.services.active.get(&user.user_id);
    Ok(Json(json!({ "chat_id": chat_id })))
}

#[derive(Deserialize, Validate)]
pub struct SelectChat {
    #[validate(length(min = 1, message = "Chat ID cannot be empty"))]
    chat_id: String,
}

pub async fn set_active_chat(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<SelectChat>,
) -> AppResult<Json<Value>> {
    payload.validate().map_err(validation_error)?;
    let user = current_user(&session).await?;
    state
        .services
        .sessions
        .select_chat(payload.chat_id.trim(), &user.user_id)
        .await?;
    Ok(Json(json!({ "chat_id": payload.chat_id.trim() })))
}

pub async fn end_chat(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = current_user(&session).await?;
    let outcome = state
        .services
        .sessions
        .end_chat(&chat_id, &user.user_id)
        .await?;
    Ok(Json(json!({ "outcome": outcome })))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = current_user(&session).await?;
    let removed = state
        .services
        .sessions
        .delete_chat(&chat_id, &user.user_id)
        .await?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn list_messages(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
) -> AppResult<Json<Vec<Message>>> {
    let user = current_user(&session).await?;
    let messages = state
        .services
        .sessions
        .messages(&chat_id, &user.user_id)
        .await?;
    Ok(Json(messages))
}

#[derive(Deserialize, Validate)]
pub struct SendMessage {
    #[validate(length(max = 4000, message = "Message is too long"))]
    content: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
    Json(payload): Json<SendMessage>,
) -> AppResult<impl IntoResponse> {
    payload.validate().map_err(validation_error)?;
    let user = current_user(&session).await?;
    let message = state
        .services
        .sessions
        .send_message(&chat_id, &user.user_id, Some(payload.content), None)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Multipart form with a `file` part and an optional `content` caption.
pub async fn upload_attachment(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let user = current_user(&session).await?;
    let mut upload = None;
    let mut content = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(anyhow!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("attachment").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(anyhow!("Failed to read file: {}", e)))?;
                if bytes.len() > state.config.max_attachment_bytes {
                    return Err(AppError::BadRequest(anyhow!(
                        "Attachment exceeds {} bytes",
                        state.config.max_attachment_bytes
                    )));
                }
                upload = Some(Upload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("content") => {
                content = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(anyhow!("Invalid caption: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    if upload.is_none() {
        return Err(AppError::BadRequest(anyhow!("Missing file field")));
    }
    let message = state
        .services
        .sessions
        .send_message(&chat_id, &user.user_id, content, upload)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = current_user(&session).await?;
    let updated = state
        .services
        .sessions
        .mark_read(&chat_id, &user.user_id)
        .await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn send_friend_request(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user = current_user(&session).await?;
    let request: FriendRequest = state
        .services
        .friends
        .send_request(&chat_id, &user.user_id, &user.nickname)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn friend_status(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
) -> AppResult<Json<FriendStatusView>> {
    let user = current_user(&session).await?;
    let view = state
        .services
        .friends
        .status_in_chat(&chat_id, &user.user_id)
        .await?;
    Ok(Json(view))
}
