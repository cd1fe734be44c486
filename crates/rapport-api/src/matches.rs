use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};

use rapport_types::pagination::PageParams;

use crate::error::ApiError;
use crate::extract::{PathId, QueryParams};
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn get_matches(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    QueryParams(params): QueryParams<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let window = params.resolve();
    let page = state.db(move |db| db.matches_for_user(user_id, window)).await?;
    Ok(Json(page))
}

/// Score and relationship flags between the caller and one other user.
pub async fn get_compatibility(
    State(state): State<AppState>,
    PathId(other_id): PathId,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .db(move |db| db.pair_compatibility(user_id, other_id))
        .await?;
    Ok(Json(entry))
}
