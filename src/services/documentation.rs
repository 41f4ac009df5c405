use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quizstorm.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::event_stream,
        crate::routes::session::create_session,
        crate::routes::session::join_session,
        crate::routes::session::get_session,
        crate::routes::session::start_session,
        crate::routes::session::pause_session,
        crate::routes::session::resume_session,
        crate::routes::session::advance_question,
        crate::routes::session::end_session,
        crate::routes::session::cancel_session,
        crate::routes::session::leave_session,
        crate::routes::session::kick_participant,
        crate::routes::answer::submit_answer,
        crate::routes::answer::skip_question,
        crate::routes::projections::get_participants,
        crate::routes::projections::get_leaderboard,
        crate::routes::projections::get_final_leaderboard,
        crate::routes::projections::get_statistics,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::ServiceHealth,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::JoinSessionRequest,
            crate::dto::session::HostActionRequest,
            crate::dto::session::KickRequest,
            crate::dto::session::LeaveRequest,
            crate::dto::session::SessionSummary,
            crate::dto::session::ParticipantSummary,
            crate::dto::session::JoinResponse,
            crate::dto::answer::SubmitAnswerRequest,
            crate::dto::answer::SkipRequest,
            crate::dto::answer::AnswerResult,
            crate::dto::leaderboard::LeaderboardEntry,
            crate::dto::leaderboard::QuestionStatistics,
            crate::dto::leaderboard::SessionStatistics,
            crate::state::question::SubmittedAnswer,
            crate::state::status::SessionStatus,
            crate::state::status::ParticipantStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "session", description = "Session lifecycle and membership"),
        (name = "answer", description = "Answer submission for the current question"),
        (name = "projection", description = "Leaderboards, rosters, and statistics"),
    )
)]
pub struct ApiDoc;
