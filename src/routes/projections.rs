use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{
        leaderboard::{LeaderboardEntry, SessionStatistics},
        session::ParticipantSummary,
    },
    error::AppError,
    services::projections,
    state::SharedState,
};

/// Read-only projections served from the TTL caches.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}/participants", get(get_participants))
        .route("/sessions/{id}/leaderboard", get(get_leaderboard))
        .route(
            "/sessions/{id}/leaderboard/final",
            get(get_final_leaderboard),
        )
        .route("/sessions/{id}/statistics", get(get_statistics))
}

/// List the participants of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/participants",
    tag = "projection",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Participant roster", body = [ParticipantSummary])
    )
)]
pub async fn get_participants(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ParticipantSummary>>, AppError> {
    let roster = projections::get_participants(&state, id).await?;
    Ok(Json(roster))
}

/// Current standings, ranked by score then cumulative response time.
#[utoipa::path(
    get,
    path = "/sessions/{id}/leaderboard",
    tag = "projection",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Ranked standings", body = [LeaderboardEntry])
    )
)]
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let board = projections::get_leaderboard(&state, id).await?;
    Ok(Json(board))
}

/// Final standings of a finished session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/leaderboard/final",
    tag = "projection",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Final standings", body = [LeaderboardEntry]),
        (status = 409, description = "The session has not finished")
    )
)]
pub async fn get_final_leaderboard(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let board = projections::get_final_leaderboard(&state, id).await?;
    Ok(Json(board))
}

/// Aggregate answer statistics of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/statistics",
    tag = "projection",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session statistics", body = SessionStatistics)
    )
)]
pub async fn get_statistics(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStatistics>, AppError> {
    let statistics = projections::session_statistics(&state, id).await?;
    Ok(Json(statistics))
}
