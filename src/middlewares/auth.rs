use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tower_sessions::Session;

use crate::error::{AppError, AppResult};
use crate::models::sessions::{UserSession, SESSION_KEY};

pub async fn auth_middleware(
    session: Session,
    req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    // Check if the session has a user session
    match session.get::<UserSession>(SESSION_KEY).await {
        Ok(Some(_user_session)) => {
            // User is authenticated, continue
            Ok(next.run(req).await)
        }
        Ok(None) => {
            // No user session found
            Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))
        }
        Err(e) => {
            // Session error
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// The anonymous identity bound to this session.
pub async fn current_user(session: &Session) -> AppResult<UserSession> {
    session
        .get::<UserSession>(SESSION_KEY)
        .await
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Cannot find user session")))?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User session not found")))
}
