use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{
        CreateSessionRequest, HostActionRequest, JoinResponse, JoinSessionRequest, KickRequest,
        LeaveRequest, SessionSummary,
    },
    error::AppError,
    services::lifecycle,
    state::SharedState,
};

/// Routes driving the session lifecycle: creation, membership, and the
/// host-only control actions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/join", post(join_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/start", post(start_session))
        .route("/sessions/{id}/pause", post(pause_session))
        .route("/sessions/{id}/resume", post(resume_session))
        .route("/sessions/{id}/advance", post(advance_question))
        .route("/sessions/{id}/end", post(end_session))
        .route("/sessions/{id}/cancel", post(cancel_session))
        .route("/sessions/{id}/leave", post(leave_session))
        .route(
            "/sessions/{id}/participants/{participant_id}/kick",
            post(kick_participant),
        )
}

/// Create a session for a published quiz.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "session",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionSummary)
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = lifecycle::create_session(&state, &payload).await?;
    Ok(Json(summary))
}

/// Join a session by its six-digit code.
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "session",
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Joined the session", body = JoinResponse)
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<JoinResponse>, AppError> {
    let response = lifecycle::join_session(&state, payload).await?;
    Ok(Json(response))
}

/// Fetch the current projection of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "session",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session found", body = SessionSummary)
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let session = state.load_session(id).await?;
    Ok(Json(session.into()))
}

/// Start the game with a countdown.
#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "session",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Countdown started", body = SessionSummary)
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HostActionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = lifecycle::start_session(&state, id, payload.host_id).await?;
    Ok(Json(summary))
}

/// Pause gameplay.
#[utoipa::path(
    post,
    path = "/sessions/{id}/pause",
    tag = "session",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Session paused", body = SessionSummary)
    )
)]
pub async fn pause_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HostActionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = lifecycle::pause_session(&state, id, payload.host_id).await?;
    Ok(Json(summary))
}

/// Resume gameplay after a pause.
#[utoipa::path(
    post,
    path = "/sessions/{id}/resume",
    tag = "session",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Session resumed", body = SessionSummary)
    )
)]
pub async fn resume_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HostActionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = lifecycle::resume_session(&state, id, payload.host_id).await?;
    Ok(Json(summary))
}

/// Advance to the next question; ends the game past the last one.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advance",
    tag = "session",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Moved to the next question", body = SessionSummary),
        (status = 409, description = "No questions left; the game was ended")
    )
)]
pub async fn advance_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HostActionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = lifecycle::advance_question(&state, id, payload.host_id).await?;
    Ok(Json(summary))
}

/// End the game and publish the final leaderboard.
#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    tag = "session",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Session ended", body = SessionSummary)
    )
)]
pub async fn end_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HostActionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = lifecycle::end_session(&state, id, payload.host_id).await?;
    Ok(Json(summary))
}

/// Cancel a session before it finishes.
#[utoipa::path(
    post,
    path = "/sessions/{id}/cancel",
    tag = "session",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Session cancelled", body = SessionSummary)
    )
)]
pub async fn cancel_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HostActionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = lifecycle::cancel_session(&state, id, payload.host_id).await?;
    Ok(Json(summary))
}

/// Leave a session voluntarily.
#[utoipa::path(
    post,
    path = "/sessions/{id}/leave",
    tag = "session",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = LeaveRequest,
    responses(
        (status = 204, description = "Participant left")
    )
)]
pub async fn leave_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LeaveRequest>,
) -> Result<axum::http::StatusCode, AppError> {
    lifecycle::leave_session(&state, id, payload.participant_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Remove a participant from a session. Host only.
#[utoipa::path(
    post,
    path = "/sessions/{id}/participants/{participant_id}/kick",
    tag = "session",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("participant_id" = Uuid, Path, description = "Participant to remove")
    ),
    request_body = KickRequest,
    responses(
        (status = 204, description = "Participant removed")
    )
)]
pub async fn kick_participant(
    State(state): State<SharedState>,
    Path((id, participant_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<KickRequest>,
) -> Result<axum::http::StatusCode, AppError> {
    lifecycle::kick_participant(&state, id, participant_id, payload.host_id, payload.reason)
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
