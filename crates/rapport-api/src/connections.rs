use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use rapport_types::api::CreatedRequestResponse;

use crate::error::ApiError;
use crate::extract::PathId;
use crate::middleware::AuthUser;
use crate::state::AppState;

// -- Connection requests --

pub async fn create_request(
    State(state): State<AppState>,
    PathId(target_id): PathId,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .db(move |db| db.create_request(user_id, target_id))
        .await?;

    info!("User {} requested a connection with user {}", user_id, target_id);
    Ok((
        StatusCode::CREATED,
        Json(CreatedRequestResponse {
            id: request.id,
            status: request.status,
        }),
    ))
}

/// Requests addressed to the caller.
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = state.db(move |db| db.list_incoming_requests(user_id)).await?;
    Ok(Json(requests))
}

pub async fn accept_request(
    State(state): State<AppState>,
    PathId(request_id): PathId,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let connection = state
        .db(move |db| db.accept_request(request_id, user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

pub async fn reject_request(
    State(state): State<AppState>,
    PathId(request_id): PathId,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .db(move |db| db.reject_request(request_id, user_id))
        .await?;
    Ok(Json(request))
}

// -- Connections --

pub async fn list_connections(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let connections = state.db(move |db| db.list_connections(user_id)).await?;
    Ok(Json(connections))
}

pub async fn delete_connection(
    State(state): State<AppState>,
    PathId(connection_id): PathId,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db(move |db| db.delete_connection(connection_id, user_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
