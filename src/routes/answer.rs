use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::answer::{AnswerResult, SkipRequest, SubmitAnswerRequest},
    error::AppError,
    services::answer_intake,
    state::SharedState,
};

/// Routes accepting player submissions for the current question.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}/answers", post(submit_answer))
        .route("/sessions/{id}/answers/skip", post(skip_question))
}

/// Submit an answer to the current question.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answers",
    tag = "answer",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer graded and recorded", body = AnswerResult),
        (status = 409, description = "An answer was already recorded for this question")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerResult>, AppError> {
    let result =
        answer_intake::submit_answer(&state, id, payload.participant_id, payload.answer).await?;
    Ok(Json(result))
}

/// Skip the current question without answering.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answers/skip",
    tag = "answer",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SkipRequest,
    responses(
        (status = 200, description = "Skip recorded", body = AnswerResult)
    )
)]
pub async fn skip_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SkipRequest>,
) -> Result<Json<AnswerResult>, AppError> {
    let result = answer_intake::skip_question(&state, id, payload.participant_id).await?;
    Ok(Json(result))
}
