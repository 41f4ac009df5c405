use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::format_system_time,
    state::{
        session::{GameSession, Participant, SessionConfig},
        status::{ParticipantStatus, SessionStatus},
    },
};

/// Payload used to create a new session for a published quiz.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    /// Quiz to host.
    pub quiz_id: Uuid,
    /// User hosting the session.
    pub host_id: Uuid,
    /// Maximum number of participants.
    #[serde(default = "default_max_players")]
    #[validate(range(min = 1, max = 500))]
    pub max_players: u32,
    /// Whether participants without an account may join.
    #[serde(default = "default_true")]
    pub allow_anonymous: bool,
    /// Whether the live leaderboard is broadcast between questions.
    #[serde(default = "default_true")]
    pub show_leaderboard: bool,
    /// Whether the question order is shuffled once at game start.
    #[serde(default)]
    pub randomize_questions: bool,
    /// Whether option order is shuffled per broadcast.
    #[serde(default)]
    pub randomize_options: bool,
}

fn default_max_players() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

impl CreateSessionRequest {
    /// Extract the host-selected configuration.
    pub fn config(&self) -> SessionConfig {
        SessionConfig {
            max_players: self.max_players,
            allow_anonymous: self.allow_anonymous,
            show_leaderboard: self.show_leaderboard,
            randomize_questions: self.randomize_questions,
            randomize_options: self.randomize_options,
        }
    }
}

/// Payload used to join a session by its six-digit code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    /// Join code displayed by the host.
    #[validate(length(equal = 6))]
    pub code: String,
    /// Display name for the leaderboard.
    #[validate(length(min = 1, max = 32))]
    pub nickname: String,
    /// Account of the joining player; omit to join anonymously.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    /// Re-entry token from a previous anonymous join.
    #[serde(default)]
    pub guest_token: Option<String>,
}

/// Body of every host-only control action.
#[derive(Debug, Deserialize, ToSchema)]
pub struct HostActionRequest {
    /// Caller-supplied host identity; must match the session's host.
    pub host_id: Uuid,
}

/// Body of a kick action.
#[derive(Debug, Deserialize, ToSchema)]
pub struct KickRequest {
    /// Caller-supplied host identity; must match the session's host.
    pub host_id: Uuid,
    /// Reason surfaced to the kicked participant.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of a voluntary leave action.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LeaveRequest {
    /// Participant leaving the session.
    pub participant_id: Uuid,
}

/// Projection of a session returned by the REST surface.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: Uuid,
    /// Hosting user.
    pub host_id: Uuid,
    /// Quiz being played.
    pub quiz_id: Uuid,
    /// Six-digit join code.
    pub join_code: String,
    /// Current lifecycle phase.
    pub status: SessionStatus,
    /// 1-based number of the current question; `None` before the first.
    pub current_question_number: Option<u32>,
    /// Number of questions in the session.
    pub total_questions: u32,
    /// Total participants admitted.
    pub player_count: u32,
    /// Participants still able to play.
    pub active_player_count: u32,
    /// Maximum participants allowed.
    pub max_players: u32,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
    /// Start timestamp, RFC 3339.
    pub started_at: Option<String>,
    /// End timestamp, RFC 3339.
    pub ended_at: Option<String>,
}

impl From<GameSession> for SessionSummary {
    fn from(session: GameSession) -> Self {
        let current_question_number = (session.current_question_index >= 0)
            .then(|| session.current_question_index as u32 + 1);
        Self {
            id: session.id,
            host_id: session.host_id,
            quiz_id: session.quiz_id,
            join_code: session.join_code,
            status: session.status,
            current_question_number,
            total_questions: session.question_order.len() as u32,
            player_count: session.player_count,
            active_player_count: session.active_player_count,
            max_players: session.config.max_players,
            created_at: format_system_time(session.created_at),
            started_at: session.started_at.map(format_system_time),
            ended_at: session.ended_at.map(format_system_time),
        }
    }
}

/// Projection of a participant returned by the REST surface.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantSummary {
    /// Participant identifier.
    pub id: Uuid,
    /// Display name.
    pub nickname: String,
    /// Membership state.
    pub status: ParticipantStatus,
    /// Cumulative points.
    pub score: u32,
    /// Correctly answered questions.
    pub correct_count: u32,
    /// Current correct-answer streak.
    pub streak: u32,
    /// Whether the participant joined without an account.
    pub anonymous: bool,
    /// Rank assigned at game end.
    pub final_rank: Option<u32>,
}

impl From<Participant> for ParticipantSummary {
    fn from(participant: Participant) -> Self {
        Self {
            id: participant.id,
            nickname: participant.nickname.clone(),
            status: participant.status,
            score: participant.score,
            correct_count: participant.correct_count,
            streak: participant.streak,
            anonymous: participant.is_anonymous(),
            final_rank: participant.final_rank,
        }
    }
}

/// Response to a successful join, carrying the participant identity the
/// client must present on subsequent calls.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    /// Identity to present when submitting answers.
    pub participant_id: Uuid,
    /// Re-entry token; only set for anonymous participants.
    pub guest_token: Option<String>,
    /// Session joined.
    pub session: SessionSummary,
}
