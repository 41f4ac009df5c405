use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::format_system_time;
use crate::state::question::{Question, QuestionBody, QuestionKind};

/// Dispatched payload carried across the SSE channel.
#[derive(Clone, Debug)]
pub struct ServerEvent {
    /// SSE event name. Carries the [`GameEventKind`] tag.
    pub event: Option<String>,
    /// Serialized JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

/// Tag identifying each externally observable session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameEventKind {
    /// A session was created and is joinable.
    GameCreated,
    /// The host pressed start; countdown running.
    GameStarting,
    /// The start countdown failed and the session rolled back to waiting.
    GameStartFailed,
    /// The session moved to in-progress.
    GameStarted,
    /// A participant joined or re-joined the lobby.
    ParticipantJoined,
    /// A participant left voluntarily.
    ParticipantLeft,
    /// A participant was removed by the host.
    ParticipantKicked,
    /// A question was broadcast and its deadline scheduled.
    QuestionStarted,
    /// A question deadline fired; leaderboard and answer revealed.
    QuestionEnded,
    /// The host paused gameplay.
    GamePaused,
    /// The host resumed gameplay.
    GameResumed,
    /// The session finished normally.
    GameEnded,
    /// The session was cancelled before completion.
    GameCancelled,
    /// The session finished because no active players remained.
    GameAutoEnded,
}

impl GameEventKind {
    /// Wire tag used as the SSE event name.
    pub fn tag(self) -> &'static str {
        match self {
            GameEventKind::GameCreated => "GAME_CREATED",
            GameEventKind::GameStarting => "GAME_STARTING",
            GameEventKind::GameStartFailed => "GAME_START_FAILED",
            GameEventKind::GameStarted => "GAME_STARTED",
            GameEventKind::ParticipantJoined => "PARTICIPANT_JOINED",
            GameEventKind::ParticipantLeft => "PARTICIPANT_LEFT",
            GameEventKind::ParticipantKicked => "PARTICIPANT_KICKED",
            GameEventKind::QuestionStarted => "QUESTION_STARTED",
            GameEventKind::QuestionEnded => "QUESTION_ENDED",
            GameEventKind::GamePaused => "GAME_PAUSED",
            GameEventKind::GameResumed => "GAME_RESUMED",
            GameEventKind::GameEnded => "GAME_ENDED",
            GameEventKind::GameCancelled => "GAME_CANCELLED",
            GameEventKind::GameAutoEnded => "GAME_AUTO_ENDED",
        }
    }
}

/// Envelope wrapping every broadcast transition.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameEventEnvelope {
    /// Session the event belongs to.
    pub session_id: Uuid,
    /// Transition tag.
    pub kind: GameEventKind,
    /// User who triggered the transition, when one did.
    pub actor: Option<Uuid>,
    /// Event-specific payload map.
    pub payload: serde_json::Value,
    /// Wall-clock emission time, RFC 3339.
    pub emitted_at: String,
}

impl GameEventEnvelope {
    /// Build an envelope stamped with the current time.
    pub fn new(
        session_id: Uuid,
        kind: GameEventKind,
        actor: Option<Uuid>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            session_id,
            kind,
            actor,
            payload,
            emitted_at: format_system_time(std::time::SystemTime::now()),
        }
    }
}

/// Player-facing projection of an option, stripped of its correctness marker.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PublicOption {
    /// Option identifier to submit back.
    pub id: u32,
    /// Text (or image reference) shown to the player.
    pub text: String,
}

/// Player-facing projection of a question, safe to broadcast mid-game.
///
/// Carries option texts and ids but never correctness flags or accepted
/// answers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionSnapshot {
    /// Question identifier to submit answers against.
    pub id: Uuid,
    /// Prompt shown to players.
    pub text: String,
    /// Question type discriminant.
    pub kind: QuestionKind,
    /// Seconds allowed to answer.
    pub time_limit_secs: u32,
    /// Base points at stake.
    pub points: u32,
    /// Selectable options, when the type has any.
    pub options: Vec<PublicOption>,
}

impl QuestionSnapshot {
    /// Strip a question down to its broadcastable parts.
    pub fn from_question(question: &Question) -> Self {
        let options = match &question.body {
            QuestionBody::SingleChoice { options }
            | QuestionBody::MultipleChoice { options }
            | QuestionBody::ImageSelection { options }
            | QuestionBody::Dropdown { options } => options
                .iter()
                .map(|option| PublicOption {
                    id: option.id,
                    text: option.text.clone(),
                })
                .collect(),
            QuestionBody::Ordering { items } | QuestionBody::Ranking { items } => items
                .iter()
                .map(|item| PublicOption {
                    id: item.id,
                    text: item.text.clone(),
                })
                .collect(),
            QuestionBody::TrueFalse { .. }
            | QuestionBody::FillInBlank { .. }
            | QuestionBody::Matching { .. }
            | QuestionBody::DragDrop { .. }
            | QuestionBody::ShortAnswer { .. }
            | QuestionBody::Essay
            | QuestionBody::Hotspot { .. }
            | QuestionBody::Matrix { .. } => Vec::new(),
        };

        Self {
            id: question.id,
            text: question.text.clone(),
            kind: question.kind(),
            time_limit_secs: question.time_limit_secs,
            points: question.points,
            options,
        }
    }
}
