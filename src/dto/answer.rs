use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::question::SubmittedAnswer;

/// Payload used to submit an answer to the current question.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    /// Caller-supplied participant identity.
    pub participant_id: Uuid,
    /// Type-specific answer payload.
    pub answer: SubmittedAnswer,
}

/// Payload used to skip the current question.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SkipRequest {
    /// Caller-supplied participant identity.
    pub participant_id: Uuid,
}

/// Outcome of a graded (or skipped) submission.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerResult {
    /// Question the answer was recorded against.
    pub question_id: Uuid,
    /// Grading outcome. `false` for skips and timeouts.
    pub correct: bool,
    /// Points awarded.
    pub points_earned: u32,
    /// Maximum points achievable including speed bonus.
    pub max_points: u32,
    /// Latency between question broadcast and submission, in milliseconds.
    pub response_ms: u64,
    /// Whether the submission arrived after the time limit.
    pub timed_out: bool,
    /// Whether the question was skipped.
    pub skipped: bool,
    /// Participant's streak after this answer.
    pub streak: u32,
    /// Participant's cumulative score after this answer.
    pub total_score: u32,
}
