use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{
    question::SubmittedAnswer,
    status::{ParticipantStatus, SessionStatus},
};

/// Host-selected configuration frozen at session creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum number of participants allowed in the lobby.
    pub max_players: u32,
    /// Whether participants without a user account may join.
    pub allow_anonymous: bool,
    /// Whether the live leaderboard is broadcast between questions.
    pub show_leaderboard: bool,
    /// Whether the question order is shuffled once at game start.
    pub randomize_questions: bool,
    /// Whether option order is shuffled per broadcast.
    pub randomize_options: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: 50,
            allow_anonymous: true,
            show_leaderboard: true,
            randomize_questions: false,
            randomize_options: false,
        }
    }
}

/// Authoritative state of one hosted play-through of a quiz.
///
/// Player counters are derived from the participant set through
/// [`GameSession::recount`] rather than incremented in place, so they cannot
/// drift from actual membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSession {
    /// Primary key of the session.
    pub id: Uuid,
    /// User hosting and controlling the session.
    pub host_id: Uuid,
    /// Quiz being played, owned by the authoring subsystem.
    pub quiz_id: Uuid,
    /// Six-digit code participants enter to join. Unique among live sessions.
    pub join_code: String,
    /// Host-selected configuration.
    pub config: SessionConfig,
    /// Current lifecycle phase.
    pub status: SessionStatus,
    /// Question ids in play order. Shuffled once at start when configured.
    pub question_order: Vec<Uuid>,
    /// Index into `question_order`; -1 before the first question.
    pub current_question_index: i32,
    /// Id of the question currently being played.
    pub current_question_id: Option<Uuid>,
    /// Instant the current question was broadcast; latency baseline. Shifted
    /// forward on resume so paused time never counts as response latency.
    pub question_started_at: Option<SystemTime>,
    /// Instant the game was paused; `None` while running.
    pub paused_at: Option<SystemTime>,
    /// Participants currently holding a seat (left and kicked excluded).
    pub player_count: u32,
    /// Participants still able to play.
    pub active_player_count: u32,
    /// Participants who finished the game.
    pub completed_player_count: u32,
    /// Mean final score, populated at game end.
    pub average_score: f64,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Timestamp of the transition to `InProgress`.
    pub started_at: Option<SystemTime>,
    /// Timestamp of the transition to a terminal phase.
    pub ended_at: Option<SystemTime>,
}

impl GameSession {
    /// Build a fresh session in the waiting phase with zeroed counters.
    pub fn new(
        quiz_id: Uuid,
        host_id: Uuid,
        join_code: String,
        question_order: Vec<Uuid>,
        config: SessionConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            host_id,
            quiz_id,
            join_code,
            config,
            status: SessionStatus::Waiting,
            question_order,
            current_question_index: -1,
            current_question_id: None,
            question_started_at: None,
            paused_at: None,
            player_count: 0,
            active_player_count: 0,
            completed_player_count: 0,
            average_score: 0.0,
            created_at: SystemTime::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Number of questions in the session.
    pub fn total_questions(&self) -> u32 {
        self.question_order.len() as u32
    }

    /// Whether the current question is the last one.
    pub fn on_last_question(&self) -> bool {
        self.current_question_index >= self.question_order.len() as i32 - 1
    }

    /// Recompute the player counters from the participant status distribution.
    ///
    /// Leaving or being kicked frees the seat: neither counts toward
    /// `player_count`, so the session accepts a replacement join and a lobby
    /// whose players all left cannot be started. A re-activated rejoin
    /// reclaims the seat through the same recount.
    pub fn recount(&mut self, participants: &[Participant]) {
        self.player_count = participants
            .iter()
            .filter(|p| p.status.holds_seat())
            .count() as u32;
        self.active_player_count =
            participants.iter().filter(|p| p.status.is_active()).count() as u32;
        self.completed_player_count = participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Completed)
            .count() as u32;
    }

    /// Milliseconds elapsed since the current question was broadcast.
    pub fn question_elapsed_ms(&self, now: SystemTime) -> Option<u64> {
        let started = self.question_started_at?;
        let elapsed = now.duration_since(started).unwrap_or(Duration::ZERO);
        Some(elapsed.as_millis() as u64)
    }
}

/// One player within a session, authenticated or anonymous.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    /// Primary key of the participant.
    pub id: Uuid,
    /// Session this participant belongs to.
    pub session_id: Uuid,
    /// Account of the player; `None` for anonymous participants.
    pub user_id: Option<Uuid>,
    /// Display name shown on the leaderboard.
    pub nickname: String,
    /// Re-entry credential handed to anonymous participants.
    pub guest_token: Option<String>,
    /// Expiry of the guest token.
    pub guest_token_expires_at: Option<SystemTime>,
    /// Membership state.
    pub status: ParticipantStatus,
    /// Cumulative points earned.
    pub score: u32,
    /// Number of correctly answered questions.
    pub correct_count: u32,
    /// Current run of consecutive correct answers.
    pub streak: u32,
    /// Number of answers recorded (including skips and timeouts).
    pub answer_count: u32,
    /// Cumulative response latency in milliseconds across all answers.
    pub total_response_ms: u64,
    /// Rank assigned once, at game end.
    pub final_rank: Option<u32>,
    /// Timestamp of the initial join.
    pub joined_at: SystemTime,
}

impl Participant {
    /// Admit a new participant into a session's lobby.
    pub fn new(session_id: Uuid, user_id: Option<Uuid>, nickname: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            nickname,
            guest_token: None,
            guest_token_expires_at: None,
            status: ParticipantStatus::Joined,
            score: 0,
            correct_count: 0,
            streak: 0,
            answer_count: 0,
            total_response_ms: 0,
            final_rank: None,
            joined_at: SystemTime::now(),
        }
    }

    /// Whether the participant joined without a user account.
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    /// Mean response latency across recorded answers, in milliseconds.
    pub fn average_response_ms(&self) -> u64 {
        if self.answer_count == 0 {
            0
        } else {
            self.total_response_ms / u64::from(self.answer_count)
        }
    }
}

/// Persisted outcome of one answer submission.
///
/// At most one record may exist per (session, participant, question) triple;
/// the storage layer enforces this at insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRecord {
    /// Session the answer belongs to.
    pub session_id: Uuid,
    /// Participant who answered.
    pub participant_id: Uuid,
    /// Question that was answered.
    pub question_id: Uuid,
    /// Raw submitted payload; `None` for skips.
    pub payload: Option<SubmittedAnswer>,
    /// Grading outcome. Always `false` for skips and timeouts.
    pub correct: bool,
    /// Points awarded after the scoring policy was applied.
    pub points_earned: u32,
    /// Maximum points achievable on this question including speed bonus.
    pub max_points: u32,
    /// Latency between question broadcast and submission, in milliseconds.
    pub response_ms: u64,
    /// Whether the participant skipped instead of answering.
    pub skipped: bool,
    /// Whether the answer arrived after the time limit.
    pub timed_out: bool,
    /// Wall-clock submission time.
    pub submitted_at: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(status: ParticipantStatus) -> Participant {
        let mut p = Participant::new(Uuid::new_v4(), None, "p".into());
        p.status = status;
        p
    }

    #[test]
    fn recount_derives_counters_from_statuses() {
        let mut session = GameSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "123456".into(),
            vec![Uuid::new_v4()],
            SessionConfig::default(),
        );
        let participants = vec![
            participant(ParticipantStatus::Joined),
            participant(ParticipantStatus::Playing),
            participant(ParticipantStatus::Left),
            participant(ParticipantStatus::Kicked),
            participant(ParticipantStatus::Completed),
        ];

        session.recount(&participants);

        assert_eq!(session.player_count, 4);
        assert_eq!(session.active_player_count, 2);
        assert_eq!(session.completed_player_count, 1);
        assert!(session.active_player_count <= session.player_count);
    }

    #[test]
    fn fresh_session_starts_before_question_zero() {
        let session = GameSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "000001".into(),
            vec![Uuid::new_v4(), Uuid::new_v4()],
            SessionConfig::default(),
        );
        assert_eq!(session.current_question_index, -1);
        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(session.total_questions(), 2);
        assert!(!session.on_last_question());
    }

    #[test]
    fn average_latency_handles_zero_answers() {
        let p = Participant::new(Uuid::new_v4(), None, "p".into());
        assert_eq!(p.average_response_ms(), 0);
    }
}
