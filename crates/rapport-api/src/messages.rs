use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use rapport_db::DbError;
use rapport_types::api::{MarkReadResponse, MessageHistory, SendMessageRequest};

use crate::error::ApiError;
use crate::extract::{JsonBody, PathId};
use crate::middleware::AuthUser;
use crate::state::AppState;

/// Persist a message, then hand it to the hub for live delivery.
/// Nothing is routed unless the write succeeded.
pub async fn send_message(
    State(state): State<AppState>,
    PathId(connection_id): PathId,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    JsonBody(req): JsonBody<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .db(move |db| db.post_message(connection_id, user_id, &req.content))
        .await?;

    state.hub.route(message.clone());
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    PathId(connection_id): PathId,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state
        .db(move |db| {
            let connection = db.connection_for_member(connection_id, user_id)?;
            let messages = db.list_messages(connection.id)?;
            let user = db
                .get_profile(connection.counterpart(user_id))?
                .ok_or_else(|| DbError::not_found("user not found"))?;
            Ok(MessageHistory { messages, user })
        })
        .await?;

    Ok(Json(history))
}

pub async fn mark_read(
    State(state): State<AppState>,
    PathId(connection_id): PathId,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.db(move |db| db.mark_read(connection_id, user_id)).await?;
    debug!("User {} marked {} messages read on connection {}", user_id, updated, connection_id);
    Ok(Json(MarkReadResponse { updated }))
}
