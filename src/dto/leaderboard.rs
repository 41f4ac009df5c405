use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One row of the projected leaderboard.
///
/// Ordering key: score descending, cumulative response time ascending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position; contiguous across the board.
    pub rank: u32,
    /// Participant this row belongs to.
    pub participant_id: Uuid,
    /// Display name.
    pub nickname: String,
    /// Cumulative points.
    pub score: u32,
    /// Correctly answered questions.
    pub correct_count: u32,
    /// Current run of consecutive correct answers.
    pub streak: u32,
    /// Mean response latency in milliseconds.
    pub avg_response_ms: u64,
    /// Whether the participant joined without a user account.
    pub anonymous: bool,
}

/// Per-question answer breakdown used by the statistics projection.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionStatistics {
    /// Question the counts refer to.
    pub question_id: Uuid,
    /// 1-based position within the session.
    pub question_number: u32,
    /// Recorded answers, including skips and timeouts.
    pub answer_count: u32,
    /// Correctly graded answers.
    pub correct_count: u32,
    /// Skipped answers.
    pub skip_count: u32,
    /// Answers that arrived after the time limit.
    pub timeout_count: u32,
}

/// Aggregate session statistics, retained after the session finishes.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionStatistics {
    /// Session the statistics describe.
    pub session_id: Uuid,
    /// Lifecycle phase at the time of the read.
    pub status: crate::state::status::SessionStatus,
    /// Total participants admitted.
    pub player_count: u32,
    /// Participants still able to play.
    pub active_player_count: u32,
    /// Participants who finished the game.
    pub completed_player_count: u32,
    /// Mean score across participants.
    pub average_score: f64,
    /// Number of questions in the session.
    pub total_questions: u32,
    /// Per-question answer breakdown.
    pub questions: Vec<QuestionStatistics>,
}
