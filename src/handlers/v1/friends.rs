use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::{
    app_state::AppState,
    error::AppResult,
    middlewares::auth::current_user,
    models::friends::{Friendship, IncomingRequest},
};

pub async fn incoming_requests(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<IncomingRequest>>> {
    let user = current_user(&session).await?;
    let requests = state.services.friends.incoming_requests(&user.user_id).await?;
    Ok(Json(requests))
}

pub async fn accept_friend_request(
    State(state): State<AppState>,
    session: Session,
    Path(request_id): Path<String>,
) -> AppResult<Json<Friendship>> {
    let user = current_user(&session).await?;
    let friendship = state
        .services
        .friends
        .accept_request(&request_id, &user.user_id)
        .await?;
    Ok(Json(friendship))
}

pub async fn reject_friend_request(
    State(state): State<AppState>,
    session: Session,
    Path(request_id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = current_user(&session).await?;
    let outcome = state
        .services
        .friends
        .reject_request(&request_id, &user.user_id)
        .await?;
    Ok(Json(json!({ "outcome": outcome })))
}
