use axum::{extract::State, Json};
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::{
    app_state::AppState, error::AppResult, middlewares::auth::current_user,
    services::MatchOutcome,
};

pub async fn start(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<MatchOutcome>> {
    let user = current_user(&session).await?;
    let outcome = state
        .services
        .matchmaking
        .start_chat(&user.user_id, &user.nickname)
        .await?;
    Ok(Json(outcome))
}

pub async fn cancel(State(state): State<AppState>, session: Session) -> AppResult<Json<Value>> {
    let user = current_user(&session).await?;
    let removed = state.services.matchmaking.cancel_search(&user.user_id).await?;
    Ok(Json(json!({ "removed": removed })))
}
