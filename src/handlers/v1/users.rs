use anyhow::anyhow;
use axum::{extract::State, Json};
use serde::Deserialize;
use tower_sessions::Session;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    middlewares::auth::current_user,
    models::{
        sessions::{UserSession, SESSION_KEY},
        users::UserProfile,
    },
    queries::users::upsert_user,
};

use super::validation_error;

#[derive(Deserialize, Validate)]
pub struct CreateSession {
    #[validate(length(min = 1, max = 64, message = "Nickname must be 1 to 64 characters"))]
    nickname: String,
}

/// A session keeps the identity it already holds; otherwise a fresh id is
/// minted. Clients never choose their id.
fn session_user_id(existing: Option<UserSession>) -> String {
    existing
        .map(|user| user.user_id)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

pub async fn create_session(
    State(state): State<AppState>,
    session: Session,
    Json(mut payload): Json<CreateSession>,
) -> AppResult<Json<UserSession>> {
    payload.nickname = payload.nickname.trim().to_string();
    payload.validate().map_err(validation_error)?;

    let existing = session
        .get::<UserSession>(SESSION_KEY)
        .await
        .map_err(|e| AppError::InternalServerError(anyhow!("Failed to read session: {}", e)))?;
    let user_id = session_user_id(existing);

    let profile = UserProfile {
        id: user_id.clone(),
        nickname: Some(payload.nickname.clone()),
    };
    upsert_user(state.services.store.as_ref(), &profile).await?;

    let user_session = UserSession {
        user_id,
        nickname: payload.nickname,
    };
    session
        .insert(SESSION_KEY, user_session.clone())
        .await
        .map_err(|e| AppError::InternalServerError(anyhow!("Failed to store session: {}", e)))?;

    tracing::info!(user_id = %user_session.user_id, "Session established");
    Ok(Json(user_session))
}

pub async fn me(session: Session) -> AppResult<Json<UserSession>> {
    Ok(Json(current_user(&session).await?))
}
