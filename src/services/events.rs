//! Broadcast helpers emitting one event per externally observable session
//! transition onto the shared SSE hub.

use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        events::{GameEventEnvelope, GameEventKind, QuestionSnapshot, ServerEvent},
        leaderboard::LeaderboardEntry,
    },
    state::SharedState,
};

/// Broadcast a transition with an empty payload.
pub fn emit(state: &SharedState, session_id: Uuid, kind: GameEventKind, actor: Option<Uuid>) {
    emit_with(state, session_id, kind, actor, json!({}));
}

/// Broadcast a transition with an event-specific payload map.
pub fn emit_with(
    state: &SharedState,
    session_id: Uuid,
    kind: GameEventKind,
    actor: Option<Uuid>,
    payload: serde_json::Value,
) {
    let envelope = GameEventEnvelope::new(session_id, kind, actor, payload);
    match ServerEvent::json(Some(kind.tag().to_string()), &envelope) {
        Ok(event) => state.events().broadcast(event),
        Err(err) => warn!(kind = kind.tag(), error = %err, "failed to serialize session event"),
    }
}

/// Broadcast the start-countdown announcement.
pub fn emit_game_starting(
    state: &SharedState,
    session_id: Uuid,
    actor: Uuid,
    countdown_secs: u64,
) {
    emit_with(
        state,
        session_id,
        GameEventKind::GameStarting,
        Some(actor),
        json!({ "countdown_secs": countdown_secs }),
    );
}

/// Broadcast a question with its answers stripped.
pub fn emit_question_started(
    state: &SharedState,
    session_id: Uuid,
    question: &QuestionSnapshot,
    question_number: u32,
    total_questions: u32,
) {
    emit_with(
        state,
        session_id,
        GameEventKind::QuestionStarted,
        None,
        json!({
            "question": question,
            "question_number": question_number,
            "total_questions": total_questions,
            "time_limit_secs": question.time_limit_secs,
        }),
    );
}

/// Broadcast a question deadline with the reveal and current standings.
pub fn emit_question_ended(
    state: &SharedState,
    session_id: Uuid,
    question_id: Uuid,
    correct_answer: &str,
    leaderboard: Option<&[LeaderboardEntry]>,
) {
    emit_with(
        state,
        session_id,
        GameEventKind::QuestionEnded,
        None,
        json!({
            "question_id": question_id,
            "correct_answer": correct_answer,
            "leaderboard": leaderboard,
        }),
    );
}

/// Broadcast a participant membership change.
pub fn emit_membership(
    state: &SharedState,
    session_id: Uuid,
    kind: GameEventKind,
    actor: Option<Uuid>,
    participant_id: Uuid,
    nickname: &str,
) {
    emit_with(
        state,
        session_id,
        kind,
        actor,
        json!({ "participant_id": participant_id, "nickname": nickname }),
    );
}

/// Broadcast the end of a game together with its final standings.
pub fn emit_game_ended(
    state: &SharedState,
    session_id: Uuid,
    kind: GameEventKind,
    actor: Option<Uuid>,
    reason: Option<&str>,
    leaderboard: &[LeaderboardEntry],
) {
    emit_with(
        state,
        session_id,
        kind,
        actor,
        json!({ "reason": reason, "leaderboard": leaderboard }),
    );
}
