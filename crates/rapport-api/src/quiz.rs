use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use rapport_db::DbError;
use rapport_types::api::{SubmitAnswersRequest, SubmitAnswersResponse};

use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::middleware::AuthUser;
use crate::state::AppState;

/// The question catalogue. Only offered to users who have not answered yet.
pub async fn get_questions(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let questions = state
        .db(move |db| {
            if db.has_taken_quiz(user_id)? {
                return Err(DbError::invalid_state("quiz already taken"));
            }
            db.list_questions()
        })
        .await?;

    Ok(Json(questions))
}

pub async fn submit_answers(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    JsonBody(req): JsonBody<SubmitAnswersRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = state
        .db(move |db| db.submit_answers(user_id, &req.answers))
        .await?;

    info!("User {} submitted {} answers", user_id, saved);
    Ok((StatusCode::CREATED, Json(SubmitAnswersResponse { saved })))
}
