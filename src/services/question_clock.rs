//! Question clock: broadcasts each question and runs its answer deadline as a
//! deferred task.
//!
//! Armed deadlines are registered on the shared state so pausing, advancing,
//! and ending a session abort the pending task outright; as a second line of
//! defence a firing task re-acquires the session gate and checks that the
//! session is still in progress on the same question index it was armed for,
//! turning any race into a no-op.

use std::time::{Duration, SystemTime};

use rand::seq::SliceRandom;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::events::{GameEventKind, QuestionSnapshot},
    error::ServiceError,
    services::{events, grading, leaderboard, lifecycle},
    state::{SharedState, question::Question, session::GameSession, status::SessionStatus},
};

/// Broadcast a question to players and arm its deadline.
///
/// Callers must hold the session gate and have already persisted the session
/// with the new question index and start timestamp.
pub(crate) fn begin_question(state: &SharedState, session: &GameSession, question: &Question) {
    let mut snapshot = QuestionSnapshot::from_question(question);
    if session.config.randomize_options && snapshot.options.len() > 1 {
        let mut rng = rand::rng();
        snapshot.options.shuffle(&mut rng);
    }

    let question_number = session.current_question_index as u32 + 1;
    events::emit_question_started(
        state,
        session.id,
        &snapshot,
        question_number,
        session.total_questions(),
    );

    let time_limit = Duration::from_secs(u64::from(question.time_limit_secs));
    arm(state, session.id, session.current_question_index, time_limit);
}

/// Re-arm the current question's deadline after a resume, for the time left.
///
/// Callers must hold the session gate and have already shifted the question
/// start timestamp past the paused span. A pause that outlived the deadline
/// re-arms at zero, ending the question immediately after the resume.
pub(crate) async fn resume_deadline(
    state: &SharedState,
    session: &GameSession,
) -> Result<(), ServiceError> {
    let Some(question_id) = session.current_question_id else {
        return Ok(());
    };
    let question = lifecycle::question_by_id(state, session.quiz_id, question_id).await?;
    let limit = Duration::from_secs(u64::from(question.time_limit_secs));
    let elapsed = session
        .question_elapsed_ms(SystemTime::now())
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO);
    arm(
        state,
        session.id,
        session.current_question_index,
        limit.saturating_sub(elapsed),
    );
    Ok(())
}

/// Spawn the deadline task and register it so pause and advance can cancel it.
fn arm(state: &SharedState, session_id: Uuid, armed_index: i32, limit: Duration) {
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        run_deadline(task_state, session_id, armed_index, limit).await;
    });
    state.arm_deadline(session_id, handle.abort_handle());
}

/// Deferred deadline for one question.
async fn run_deadline(state: SharedState, session_id: Uuid, armed_index: i32, limit: Duration) {
    sleep(limit).await;

    let gate = state.session_gate(session_id);
    let _guard = gate.lock().await;

    let session = match state.load_session(session_id).await {
        Ok(session) => session,
        Err(err) => {
            debug!(%session_id, error = %err, "deadline could not reload session");
            return;
        }
    };
    if session.status != SessionStatus::InProgress || session.current_question_index != armed_index
    {
        debug!(
            %session_id,
            armed_index,
            current_index = session.current_question_index,
            status = ?session.status,
            "deadline raced a lifecycle change; ignoring"
        );
        return;
    }

    if let Err(err) = fire(&state, session).await {
        warn!(%session_id, armed_index, error = %err, "question deadline handling failed");
    }
}

async fn fire(state: &SharedState, mut session: GameSession) -> Result<(), ServiceError> {
    let question_id = session
        .current_question_id
        .ok_or_else(|| ServiceError::InvalidInput("session has no current question".into()))?;
    let question = lifecycle::question_by_id(state, session.quiz_id, question_id).await?;

    // Submissions landing after the deadline see a fresh leaderboard.
    leaderboard::invalidate(state, session.id);
    let board = leaderboard::rank(state, session.id).await?;
    let reveal = session.config.show_leaderboard.then_some(board.as_slice());

    events::emit_question_ended(
        state,
        session.id,
        question_id,
        &grading::canonical_answer(&question),
        reveal,
    );

    if session.on_last_question() {
        lifecycle::end_locked(
            state,
            session.id,
            None,
            GameEventKind::GameAutoEnded,
            Some("final question deadline elapsed"),
        )
        .await
    } else if state.config().auto_advance {
        lifecycle::advance_step(state, &mut session).await
    } else {
        // Host-paced game: stay on the ended question until the host advances.
        Ok(())
    }
}
