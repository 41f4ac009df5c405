//! Session lifecycle controller: host-initiated transitions and participant
//! membership changes.
//!
//! Every mutation of one session is serialized through that session's gate,
//! and statuses are re-validated after acquiring it, so deferred timers and
//! concurrent host actions cannot interleave mid-transition.

use std::time::{Duration, SystemTime};

use rand::{Rng, seq::SliceRandom};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        events::GameEventKind,
        session::{CreateSessionRequest, JoinResponse, JoinSessionRequest, SessionSummary},
    },
    error::ServiceError,
    services::{events, leaderboard, question_clock},
    state::{
        SharedState,
        question::Question,
        session::{GameSession, Participant},
        status::{ParticipantStatus, SessionStatus},
    },
};

/// Bounded number of join-code allocation attempts before giving up.
const JOIN_CODE_ATTEMPTS: u32 = 10;
/// Validity window of the anonymous re-entry token.
const GUEST_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Create a session for a published quiz and broadcast its availability.
pub async fn create_session(
    state: &SharedState,
    request: &CreateSessionRequest,
) -> Result<SessionSummary, ServiceError> {
    let quiz = state
        .catalog()
        .find_quiz(request.quiz_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz `{}` not found", request.quiz_id)))?;

    if !quiz.published {
        return Err(ServiceError::InvalidInput(format!(
            "quiz `{}` is not published",
            quiz.id
        )));
    }
    if quiz.questions.is_empty() {
        return Err(ServiceError::InvalidInput(format!(
            "quiz `{}` has no questions",
            quiz.id
        )));
    }

    let question_order: Vec<Uuid> = quiz.questions.iter().map(|question| question.id).collect();
    let session = persist_with_fresh_code(state, quiz.id, request, question_order).await?;

    events::emit(
        state,
        session.id,
        GameEventKind::GameCreated,
        Some(request.host_id),
    );
    Ok(session.into())
}

/// Join a waiting session by its six-digit code.
///
/// Re-joining after a voluntary leave re-activates the existing participant
/// instead of duplicating it; kicked participants stay barred.
pub async fn join_session(
    state: &SharedState,
    request: JoinSessionRequest,
) -> Result<JoinResponse, ServiceError> {
    let nickname = request.nickname.trim().to_owned();
    if nickname.is_empty() {
        return Err(ServiceError::InvalidInput("nickname must not be empty".into()));
    }

    let session_id = state.load_session_by_code(&request.code).await?.id;
    let gate = state.session_gate(session_id);
    let _guard = gate.lock().await;

    let mut session = state.load_session(session_id).await?;
    if request.user_id.is_none() && !session.config.allow_anonymous {
        return Err(ServiceError::AccessDenied(
            "anonymous players are not allowed in this session".into(),
        ));
    }
    if let Some(user_id) = request.user_id {
        state
            .catalog()
            .find_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user `{user_id}` is not known")))?;
    }

    let store = state.require_store().await?;
    let participants = store.list_participants(session.id).await?;

    let mut returning = find_returning(&participants, &request)?;
    if returning.is_none() {
        if let Some(token) = &request.guest_token {
            returning = find_returning_by_token(state, &session, token).await?;
        }
    }

    // Returning participants may re-enter mid-game; brand-new joins are only
    // accepted while the session is waiting.
    if let Some(existing) = returning {
        let mut participant = existing;
        if participant.status == ParticipantStatus::Left {
            participant.status = match session.status {
                SessionStatus::InProgress | SessionStatus::Paused => ParticipantStatus::Playing,
                _ => ParticipantStatus::Joined,
            };
        }
        state.persist_participant(&participant).await?;
        session.recount(&refresh(&participants, &participant));
        state.persist_session(&session).await?;
        events::emit_membership(
            state,
            session.id,
            GameEventKind::ParticipantJoined,
            participant.user_id,
            participant.id,
            &participant.nickname,
        );
        let guest_token = participant.guest_token.clone();
        return Ok(JoinResponse {
            participant_id: participant.id,
            guest_token,
            session: session.into(),
        });
    }

    if session.status != SessionStatus::Waiting {
        return Err(ServiceError::InvalidTransition(format!(
            "session `{}` is no longer accepting players",
            session.id
        )));
    }

    let current_count = participants
        .iter()
        .filter(|p| p.status.holds_seat())
        .count() as u32;
    if current_count >= session.config.max_players {
        return Err(ServiceError::CapacityExhausted(format!(
            "session `{}` is full",
            session.id
        )));
    }

    let mut participant = Participant::new(session.id, request.user_id, nickname);
    if participant.is_anonymous() {
        participant.guest_token = Some(Uuid::new_v4().simple().to_string());
        participant.guest_token_expires_at = Some(SystemTime::now() + GUEST_TOKEN_TTL);
    }
    state.persist_participant(&participant).await?;

    session.recount(&refresh(&participants, &participant));
    state.persist_session(&session).await?;

    events::emit_membership(
        state,
        session.id,
        GameEventKind::ParticipantJoined,
        participant.user_id,
        participant.id,
        &participant.nickname,
    );

    Ok(JoinResponse {
        participant_id: participant.id,
        guest_token: participant.guest_token.clone(),
        session: session.into(),
    })
}

/// Start a waiting session: emit the countdown and schedule the deferred
/// transition to in-progress.
pub async fn start_session(
    state: &SharedState,
    session_id: Uuid,
    host_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    let gate = state.session_gate(session_id);
    let _guard = gate.lock().await;

    let mut session = state.load_session(session_id).await?;
    ensure_host(&session, host_id)?;
    session.status.validate_transition(SessionStatus::Starting)?;
    if session.player_count == 0 {
        return Err(ServiceError::InvalidTransition(
            "cannot start a session with no players".into(),
        ));
    }

    session.status = SessionStatus::Starting;
    state.persist_session(&session).await?;

    let countdown = state.config().countdown;
    events::emit_game_starting(state, session.id, host_id, countdown.as_secs());

    let task_state = state.clone();
    tokio::spawn(async move {
        run_start_countdown(task_state, session_id, countdown).await;
    });

    Ok(session.into())
}

/// Deferred continuation of [`start_session`].
///
/// Re-validates that the session is still starting once the countdown
/// elapses; a cancel or failure that raced the countdown makes this a no-op.
/// A failure mid-continuation rolls the session back to waiting instead of
/// stranding it in the starting phase.
pub(crate) async fn run_start_countdown(
    state: SharedState,
    session_id: Uuid,
    countdown: Duration,
) {
    sleep(countdown).await;

    let gate = state.session_gate(session_id);
    let _guard = gate.lock().await;

    let session = match state.load_session(session_id).await {
        Ok(session) => session,
        Err(err) => {
            warn!(%session_id, error = %err, "start countdown could not reload session");
            return;
        }
    };
    if session.status != SessionStatus::Starting {
        debug!(%session_id, status = ?session.status, "start countdown raced; ignoring");
        return;
    }

    if let Err(err) = complete_start(&state, session).await {
        warn!(%session_id, error = %err, "start continuation failed; rolling back");
        rollback_start(&state, session_id).await;
    }
}

async fn complete_start(state: &SharedState, mut session: GameSession) -> Result<(), ServiceError> {
    let store = state.require_store().await?;

    // The play order is fixed once, here, not re-shuffled per advance.
    if session.config.randomize_questions && session.question_order.len() > 1 {
        let mut rng = rand::rng();
        session.question_order.shuffle(&mut rng);
    }

    let participants = store.list_participants(session.id).await?;
    for participant in &participants {
        if participant.status.is_active() {
            let mut playing = participant.clone();
            playing.status = ParticipantStatus::Playing;
            state.persist_participant(&playing).await?;
        }
    }

    session.status = SessionStatus::InProgress;
    session.started_at = Some(SystemTime::now());
    state.persist_session(&session).await?;

    if let Err(err) = state.catalog().record_play_started(session.quiz_id).await {
        warn!(quiz_id = %session.quiz_id, error = %err, "play count callback failed");
    }

    events::emit(state, session.id, GameEventKind::GameStarted, None);
    advance_step(state, &mut session).await
}

async fn rollback_start(state: &SharedState, session_id: Uuid) {
    match state.load_session(session_id).await {
        Ok(mut session) if session.status == SessionStatus::Starting => {
            session.status = SessionStatus::Waiting;
            if let Err(err) = state.persist_session(&session).await {
                warn!(%session_id, error = %err, "failed to roll back session to waiting");
                return;
            }
            events::emit(state, session_id, GameEventKind::GameStartFailed, None);
        }
        Ok(_) => {}
        Err(err) => {
            warn!(%session_id, error = %err, "failed to reload session during rollback");
        }
    }
}

/// Pause an in-progress session. Host only.
pub async fn pause_session(
    state: &SharedState,
    session_id: Uuid,
    host_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    set_pause_state(state, session_id, host_id, SessionStatus::Paused).await
}

/// Resume a paused session. Host only.
pub async fn resume_session(
    state: &SharedState,
    session_id: Uuid,
    host_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    set_pause_state(state, session_id, host_id, SessionStatus::InProgress).await
}

async fn set_pause_state(
    state: &SharedState,
    session_id: Uuid,
    host_id: Uuid,
    next: SessionStatus,
) -> Result<SessionSummary, ServiceError> {
    let gate = state.session_gate(session_id);
    let _guard = gate.lock().await;

    let mut session = state.load_session(session_id).await?;
    ensure_host(&session, host_id)?;
    session.status.validate_transition(next)?;
    session.status = next;

    if next == SessionStatus::Paused {
        state.disarm_deadline(session_id);
        session.paused_at = Some(SystemTime::now());
    } else if let Some(paused_at) = session.paused_at.take() {
        // Shift the latency baseline past the paused span so neither answer
        // latency nor the re-armed deadline charges players for the pause.
        let pause_span = SystemTime::now()
            .duration_since(paused_at)
            .unwrap_or(Duration::ZERO);
        session.question_started_at = session.question_started_at.map(|started| started + pause_span);
    }
    state.persist_session(&session).await?;

    if next == SessionStatus::InProgress {
        question_clock::resume_deadline(state, &session).await?;
    }

    let kind = match next {
        SessionStatus::Paused => GameEventKind::GamePaused,
        _ => GameEventKind::GameResumed,
    };
    events::emit(state, session_id, kind, Some(host_id));
    Ok(session.into())
}

/// Advance to the next question. Host only.
///
/// On the last question this ends the game and still reports the exhaustion
/// to the caller, preserving both observable behaviors of the original
/// advance-past-the-end path.
pub async fn advance_question(
    state: &SharedState,
    session_id: Uuid,
    host_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    let gate = state.session_gate(session_id);
    let _guard = gate.lock().await;

    let mut session = state.load_session(session_id).await?;
    ensure_host(&session, host_id)?;
    if session.status != SessionStatus::InProgress {
        return Err(ServiceError::InvalidTransition(format!(
            "cannot advance a session in status {:?}",
            session.status
        )));
    }

    if session.on_last_question() {
        end_locked(
            state,
            session_id,
            Some(host_id),
            GameEventKind::GameEnded,
            None,
        )
        .await?;
        return Err(ServiceError::NoMoreQuestions);
    }

    advance_step(state, &mut session).await?;
    Ok(session.into())
}

/// Move the session to its next question and hand off to the question clock.
///
/// Callers must hold the session gate.
pub(crate) async fn advance_step(
    state: &SharedState,
    session: &mut GameSession,
) -> Result<(), ServiceError> {
    let next_index = session.current_question_index + 1;
    let question_id = *session
        .question_order
        .get(next_index as usize)
        .ok_or(ServiceError::NoMoreQuestions)?;
    let question = question_by_id(state, session.quiz_id, question_id).await?;

    session.current_question_index = next_index;
    session.current_question_id = Some(question_id);
    session.question_started_at = Some(SystemTime::now());
    state.persist_session(session).await?;

    question_clock::begin_question(state, session, &question);
    Ok(())
}

/// End an in-progress (or never-started) session. Host only.
pub async fn end_session(
    state: &SharedState,
    session_id: Uuid,
    host_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    let gate = state.session_gate(session_id);
    let _guard = gate.lock().await;

    let session = state.load_session(session_id).await?;
    ensure_host(&session, host_id)?;
    end_locked(
        state,
        session_id,
        Some(host_id),
        GameEventKind::GameEnded,
        None,
    )
    .await?;
    let session = state.load_session(session_id).await?;
    Ok(session.into())
}

/// Finalize a session: aggregates, final ranks, terminal status, broadcast.
///
/// Callers must hold the session gate. Re-ending a terminal session is
/// refused by the transition check, which makes `end` idempotent-guarded.
pub(crate) async fn end_locked(
    state: &SharedState,
    session_id: Uuid,
    actor: Option<Uuid>,
    kind: GameEventKind,
    reason: Option<&str>,
) -> Result<(), ServiceError> {
    let mut session = state.load_session(session_id).await?;
    session.status.validate_transition(SessionStatus::Finished)?;

    let board = leaderboard::final_rank(state, session_id).await?;

    let store = state.require_store().await?;
    let participants = store.list_participants(session_id).await?;
    session.recount(&participants);
    session.average_score = if board.is_empty() {
        0.0
    } else {
        board.iter().map(|entry| f64::from(entry.score)).sum::<f64>() / board.len() as f64
    };
    session.status = SessionStatus::Finished;
    session.ended_at = Some(SystemTime::now());
    state.persist_session(&session).await?;

    if let Err(err) = state
        .catalog()
        .record_completion(session.quiz_id, session.average_score)
        .await
    {
        warn!(quiz_id = %session.quiz_id, error = %err, "completion callback failed");
    }

    events::emit_game_ended(state, session_id, kind, actor, reason, &board);
    // Terminal: free the per-session concurrency structures. Kept last so a
    // deadline task finalizing its own session has no awaits left to abort.
    state.disarm_deadline(session_id);
    state.release_session_gate(session_id);
    Ok(())
}

/// Cancel a session from any non-terminal state. Host only.
pub async fn cancel_session(
    state: &SharedState,
    session_id: Uuid,
    host_id: Uuid,
) -> Result<SessionSummary, ServiceError> {
    let gate = state.session_gate(session_id);
    let _guard = gate.lock().await;

    let mut session = state.load_session(session_id).await?;
    ensure_host(&session, host_id)?;
    session.status.validate_transition(SessionStatus::Cancelled)?;

    session.status = SessionStatus::Cancelled;
    session.ended_at = Some(SystemTime::now());
    state.persist_session(&session).await?;
    // A cancelled game serves no further reads; drop its derived projections
    // along with the pending deadline and the lifecycle gate.
    state.caches().invalidate_session(session_id);
    state.disarm_deadline(session_id);
    state.release_session_gate(session_id);

    events::emit(state, session_id, GameEventKind::GameCancelled, Some(host_id));
    Ok(session.into())
}

/// Remove a participant at the host's request.
pub async fn kick_participant(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
    host_id: Uuid,
    reason: Option<String>,
) -> Result<(), ServiceError> {
    let gate = state.session_gate(session_id);
    let _guard = gate.lock().await;

    let session = state.load_session(session_id).await?;
    ensure_host(&session, host_id)?;
    depart(
        state,
        session,
        participant_id,
        ParticipantStatus::Kicked,
        Some(host_id),
        reason,
    )
    .await
}

/// Leave a session voluntarily.
pub async fn leave_session(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
) -> Result<(), ServiceError> {
    let gate = state.session_gate(session_id);
    let _guard = gate.lock().await;

    let session = state.load_session(session_id).await?;
    depart(
        state,
        session,
        participant_id,
        ParticipantStatus::Left,
        None,
        None,
    )
    .await
}

async fn depart(
    state: &SharedState,
    mut session: GameSession,
    participant_id: Uuid,
    next: ParticipantStatus,
    actor: Option<Uuid>,
    reason: Option<String>,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let mut participant = fetch_member(state, &session, participant_id).await?;

    participant.status = next;
    state.persist_participant(&participant).await?;

    let participants = store.list_participants(session.id).await?;
    session.recount(&participants);
    state.persist_session(&session).await?;
    leaderboard::invalidate(state, session.id);

    let kind = match next {
        ParticipantStatus::Kicked => GameEventKind::ParticipantKicked,
        _ => GameEventKind::ParticipantLeft,
    };
    if let Some(reason) = reason {
        events::emit_with(
            state,
            session.id,
            kind,
            actor,
            serde_json::json!({
                "participant_id": participant.id,
                "nickname": participant.nickname,
                "reason": reason,
            }),
        );
    } else {
        events::emit_membership(state, session.id, kind, actor, participant.id, &participant.nickname);
    }

    // The only lifecycle transition not driven by the host: a game with no
    // active players left cannot continue.
    if session.status == SessionStatus::InProgress && session.active_player_count == 0 {
        end_locked(
            state,
            session.id,
            None,
            GameEventKind::GameAutoEnded,
            Some("no active players remaining"),
        )
        .await?;
    }

    Ok(())
}

/// Access guard shared by answer intake and membership operations: the
/// participant must belong to the session and must not be left or kicked.
pub(crate) fn access_guard(
    session: &GameSession,
    participant: &Participant,
) -> Result<(), ServiceError> {
    if participant.session_id != session.id {
        return Err(ServiceError::AccessDenied(format!(
            "participant `{}` does not belong to session `{}`",
            participant.id, session.id
        )));
    }
    if participant.status.denies_access() {
        return Err(ServiceError::AccessDenied(format!(
            "participant `{}` has left or been removed from the session",
            participant.id
        )));
    }
    Ok(())
}

/// Load a participant and verify the access guard against the session.
pub(crate) async fn fetch_member(
    state: &SharedState,
    session: &GameSession,
    participant_id: Uuid,
) -> Result<Participant, ServiceError> {
    let store = state.require_store().await?;
    let participant = store.find_participant(participant_id).await?.ok_or_else(|| {
        ServiceError::NotFound(format!("participant `{participant_id}` not found"))
    })?;
    access_guard(session, &participant)?;
    Ok(participant)
}

/// Fetch one question of a quiz from the authoring catalog.
pub(crate) async fn question_by_id(
    state: &SharedState,
    quiz_id: Uuid,
    question_id: Uuid,
) -> Result<Question, ServiceError> {
    let quiz = state
        .catalog()
        .find_quiz(quiz_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz `{quiz_id}` not found")))?;
    quiz.questions
        .into_iter()
        .find(|question| question.id == question_id)
        .ok_or_else(|| ServiceError::NotFound(format!("question `{question_id}` not found")))
}

fn ensure_host(session: &GameSession, host_id: Uuid) -> Result<(), ServiceError> {
    if session.host_id != host_id {
        return Err(ServiceError::AccessDenied(
            "only the session host may perform this action".into(),
        ));
    }
    Ok(())
}

fn find_returning(
    participants: &[Participant],
    request: &JoinSessionRequest,
) -> Result<Option<Participant>, ServiceError> {
    let Some(user_id) = request.user_id else {
        return Ok(None);
    };
    let Some(existing) = participants
        .iter()
        .find(|p| p.user_id == Some(user_id))
        .cloned()
    else {
        return Ok(None);
    };
    if existing.status == ParticipantStatus::Kicked {
        return Err(ServiceError::AccessDenied(
            "participant was removed from this session".into(),
        ));
    }
    Ok(Some(existing))
}

async fn find_returning_by_token(
    state: &SharedState,
    session: &GameSession,
    token: &str,
) -> Result<Option<Participant>, ServiceError> {
    let store = state.require_store().await?;
    let Some(existing) = store
        .find_participant_by_guest_token(token.to_owned())
        .await?
    else {
        return Ok(None);
    };
    if existing.session_id != session.id {
        return Ok(None);
    }
    if existing.status == ParticipantStatus::Kicked {
        return Err(ServiceError::AccessDenied(
            "participant was removed from this session".into(),
        ));
    }
    let expired = existing
        .guest_token_expires_at
        .is_some_and(|expiry| expiry < SystemTime::now());
    if expired {
        return Err(ServiceError::AccessDenied("guest token expired".into()));
    }
    Ok(Some(existing))
}

fn refresh(participants: &[Participant], changed: &Participant) -> Vec<Participant> {
    let mut merged: Vec<Participant> = participants
        .iter()
        .filter(|p| p.id != changed.id)
        .cloned()
        .collect();
    merged.push(changed.clone());
    merged
}

/// Draws join codes until the store accepts one.
///
/// Uniqueness among live sessions is enforced by the store at write time, so
/// two racing creators can never end up sharing a code. A pre-check skips
/// codes that are visibly taken; the persist itself is the arbiter.
async fn persist_with_fresh_code(
    state: &SharedState,
    quiz_id: Uuid,
    request: &CreateSessionRequest,
    question_order: Vec<Uuid>,
) -> Result<GameSession, ServiceError> {
    let store = state.require_store().await?;
    for _ in 0..JOIN_CODE_ATTEMPTS {
        let code = {
            let mut rng = rand::rng();
            format!("{:06}", rng.random_range(0..1_000_000u32))
        };
        if store.find_session_by_code(code.clone()).await?.is_some() {
            continue;
        }
        let candidate = GameSession::new(
            quiz_id,
            request.host_id,
            code,
            question_order.clone(),
            request.config(),
        );
        match state.persist_session(&candidate).await {
            Ok(()) => return Ok(candidate),
            Err(ServiceError::CapacityExhausted(_)) => continue,
            Err(err) => return Err(err),
        }
    }
    Err(ServiceError::CapacityExhausted(
        "join code generation exhausted".into(),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };
    use std::time::Duration;

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::EngineConfig,
        dao::{
            quiz_catalog::{QuizDefinition, StaticQuizCatalog, UserRef},
            session_store::{SessionStore, memory::MemorySessionStore},
            storage::{StorageError, StorageResult},
        },
        dto::session::CreateSessionRequest,
        state::{
            AppState,
            question::{ChoiceOption, QuestionBody},
            session::AnswerRecord,
        },
    };

    fn single_choice_quiz() -> QuizDefinition {
        QuizDefinition {
            id: Uuid::new_v4(),
            title: "capitals".into(),
            published: true,
            questions: vec![Question {
                id: Uuid::new_v4(),
                text: "Capital of France?".into(),
                time_limit_secs: 30,
                points: 1000,
                order_index: 0,
                body: QuestionBody::SingleChoice {
                    options: vec![
                        ChoiceOption {
                            id: 1,
                            text: "Paris".into(),
                            correct: true,
                        },
                        ChoiceOption {
                            id: 2,
                            text: "Lyon".into(),
                            correct: false,
                        },
                    ],
                },
            }],
        }
    }

    async fn test_state(quiz: &QuizDefinition) -> SharedState {
        test_state_with_users(quiz, &[]).await
    }

    async fn test_state_with_users(quiz: &QuizDefinition, users: &[Uuid]) -> SharedState {
        let catalog = StaticQuizCatalog::new();
        catalog.insert(quiz.clone());
        for &id in users {
            catalog.insert_user(UserRef {
                id,
                display_name: format!("user-{id}"),
            });
        }
        let config = EngineConfig {
            countdown: Duration::ZERO,
            ..EngineConfig::default()
        };
        let state = AppState::new(config, Arc::new(catalog));
        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        state
    }

    fn create_request(quiz_id: Uuid, host_id: Uuid) -> CreateSessionRequest {
        CreateSessionRequest {
            quiz_id,
            host_id,
            max_players: 2,
            allow_anonymous: true,
            show_leaderboard: true,
            randomize_questions: false,
            randomize_options: false,
        }
    }

    async fn wait_until_in_progress(state: &SharedState, session_id: Uuid) {
        for _ in 0..200 {
            let session = state.load_session(session_id).await.unwrap();
            if session.status == SessionStatus::InProgress {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("session never reached in-progress");
    }

    #[tokio::test]
    async fn created_sessions_are_joinable_by_code() {
        let quiz = single_choice_quiz();
        let state = test_state(&quiz).await;
        let host = Uuid::new_v4();

        let summary = create_session(&state, &create_request(quiz.id, host))
            .await
            .unwrap();
        assert_eq!(summary.status, SessionStatus::Waiting);
        assert_eq!(summary.join_code.len(), 6);
        assert_eq!(summary.current_question_number, None);

        let joined = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "ada".into(),
                user_id: None,
                guest_token: None,
            },
        )
        .await
        .unwrap();
        assert!(joined.guest_token.is_some());
        assert_eq!(joined.session.player_count, 1);
    }

    /// Store double whose first writes report a join-code collision.
    struct CollidingStore {
        inner: MemorySessionStore,
        rejections: AtomicU32,
    }

    impl SessionStore for CollidingStore {
        fn save_session(&self, session: GameSession) -> BoxFuture<'static, StorageResult<()>> {
            if self.rejections.load(Ordering::SeqCst) > 0 {
                self.rejections.fetch_sub(1, Ordering::SeqCst);
                return Box::pin(async {
                    Err(StorageError::Conflict {
                        message: "join code is already held by a live session".into(),
                    })
                });
            }
            self.inner.save_session(session)
        }

        fn find_session(
            &self,
            id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<GameSession>>> {
            self.inner.find_session(id)
        }

        fn find_session_by_code(
            &self,
            code: String,
        ) -> BoxFuture<'static, StorageResult<Option<GameSession>>> {
            self.inner.find_session_by_code(code)
        }

        fn save_participant(
            &self,
            participant: Participant,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.save_participant(participant)
        }

        fn find_participant(
            &self,
            id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<Participant>>> {
            self.inner.find_participant(id)
        }

        fn find_participant_by_guest_token(
            &self,
            token: String,
        ) -> BoxFuture<'static, StorageResult<Option<Participant>>> {
            self.inner.find_participant_by_guest_token(token)
        }

        fn list_participants(
            &self,
            session_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<Participant>>> {
            self.inner.list_participants(session_id)
        }

        fn insert_answer(&self, answer: AnswerRecord) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.insert_answer(answer)
        }

        fn find_answer(
            &self,
            session_id: Uuid,
            participant_id: Uuid,
            question_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<AnswerRecord>>> {
            self.inner.find_answer(session_id, participant_id, question_id)
        }

        fn list_answers(
            &self,
            session_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<AnswerRecord>>> {
            self.inner.list_answers(session_id)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    #[tokio::test]
    async fn session_creation_retries_past_join_code_collisions() {
        let quiz = single_choice_quiz();
        let catalog = StaticQuizCatalog::new();
        catalog.insert(quiz.clone());
        let state = AppState::new(EngineConfig::default(), Arc::new(catalog));
        state
            .set_session_store(Arc::new(CollidingStore {
                inner: MemorySessionStore::new(),
                rejections: AtomicU32::new(2),
            }))
            .await;

        let summary = create_session(&state, &create_request(quiz.id, Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(summary.join_code.len(), 6);
        assert!(
            state.load_session(summary.id).await.is_ok(),
            "session should be persisted after retrying"
        );
    }

    #[tokio::test]
    async fn unpublished_quizzes_cannot_be_hosted() {
        let mut quiz = single_choice_quiz();
        quiz.published = false;
        let state = test_state(&quiz).await;

        let err = create_session(&state, &create_request(quiz.id, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn full_sessions_reject_new_players() {
        let quiz = single_choice_quiz();
        let state = test_state(&quiz).await;
        let summary = create_session(&state, &create_request(quiz.id, Uuid::new_v4()))
            .await
            .unwrap();

        for nickname in ["one", "two"] {
            join_session(
                &state,
                JoinSessionRequest {
                    code: summary.join_code.clone(),
                    nickname: nickname.into(),
                    user_id: None,
                    guest_token: None,
                },
            )
            .await
            .unwrap();
        }

        let err = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "three".into(),
                user_id: None,
                guest_token: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::CapacityExhausted(_)));
    }

    #[tokio::test]
    async fn leaving_frees_a_seat_for_a_new_join() {
        let quiz = single_choice_quiz();
        let state = test_state(&quiz).await;
        let summary = create_session(&state, &create_request(quiz.id, Uuid::new_v4()))
            .await
            .unwrap();

        let mut joined = Vec::new();
        for nickname in ["one", "two"] {
            let response = join_session(
                &state,
                JoinSessionRequest {
                    code: summary.join_code.clone(),
                    nickname: nickname.into(),
                    user_id: None,
                    guest_token: None,
                },
            )
            .await
            .unwrap();
            joined.push(response.participant_id);
        }

        leave_session(&state, summary.id, joined[0]).await.unwrap();
        let session = state.load_session(summary.id).await.unwrap();
        assert_eq!(session.player_count, 1);

        let replacement = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "three".into(),
                user_id: None,
                guest_token: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(replacement.session.player_count, 2);
    }

    #[tokio::test]
    async fn anonymous_joins_respect_the_session_flag() {
        let quiz = single_choice_quiz();
        let state = test_state(&quiz).await;
        let mut request = create_request(quiz.id, Uuid::new_v4());
        request.allow_anonymous = false;
        let summary = create_session(&state, &request).await.unwrap();

        let err = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code,
                nickname: "ghost".into(),
                user_id: None,
                guest_token: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn rejoin_after_leave_reactivates_the_same_participant() {
        let quiz = single_choice_quiz();
        let user = Uuid::new_v4();
        let state = test_state_with_users(&quiz, &[user]).await;
        let summary = create_session(&state, &create_request(quiz.id, Uuid::new_v4()))
            .await
            .unwrap();

        let first = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "bob".into(),
                user_id: Some(user),
                guest_token: None,
            },
        )
        .await
        .unwrap();

        leave_session(&state, summary.id, first.participant_id)
            .await
            .unwrap();

        let second = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "bob".into(),
                user_id: Some(user),
                guest_token: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(first.participant_id, second.participant_id);
        assert_eq!(second.session.player_count, 1);
    }

    #[tokio::test]
    async fn guest_token_reenters_the_same_anonymous_participant() {
        let quiz = single_choice_quiz();
        let state = test_state(&quiz).await;
        let summary = create_session(&state, &create_request(quiz.id, Uuid::new_v4()))
            .await
            .unwrap();

        let first = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "ghost".into(),
                user_id: None,
                guest_token: None,
            },
        )
        .await
        .unwrap();
        let token = first.guest_token.clone().unwrap();

        leave_session(&state, summary.id, first.participant_id)
            .await
            .unwrap();

        let second = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "ghost".into(),
                user_id: None,
                guest_token: Some(token),
            },
        )
        .await
        .unwrap();
        assert_eq!(first.participant_id, second.participant_id);
    }

    #[tokio::test]
    async fn only_the_host_may_control_the_session() {
        let quiz = single_choice_quiz();
        let state = test_state(&quiz).await;
        let host = Uuid::new_v4();
        let summary = create_session(&state, &create_request(quiz.id, host))
            .await
            .unwrap();

        let err = start_session(&state, summary.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn starting_requires_players() {
        let quiz = single_choice_quiz();
        let state = test_state(&quiz).await;
        let host = Uuid::new_v4();
        let summary = create_session(&state, &create_request(quiz.id, host))
            .await
            .unwrap();

        let err = start_session(&state, summary.id, host).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn full_game_flow_ends_with_ranked_leaderboard() {
        let quiz = single_choice_quiz();
        let catalog = Arc::new(StaticQuizCatalog::new());
        catalog.insert(quiz.clone());
        let config = EngineConfig {
            countdown: Duration::ZERO,
            ..EngineConfig::default()
        };
        let state = AppState::new(config, catalog.clone());
        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let host = Uuid::new_v4();
        let summary = create_session(&state, &create_request(quiz.id, host))
            .await
            .unwrap();

        let joined = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "ada".into(),
                user_id: None,
                guest_token: None,
            },
        )
        .await
        .unwrap();

        start_session(&state, summary.id, host).await.unwrap();
        wait_until_in_progress(&state, summary.id).await;

        let session = state.load_session(summary.id).await.unwrap();
        assert_eq!(session.current_question_index, 0);
        assert!(session.question_started_at.is_some());

        // One question only: advancing ends the game and reports exhaustion.
        let err = advance_question(&state, summary.id, host).await.unwrap_err();
        assert!(matches!(err, ServiceError::NoMoreQuestions));

        let session = state.load_session(summary.id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Finished);
        assert!(session.ended_at.is_some());

        let store = state.require_store().await.unwrap();
        let participant = store
            .find_participant(joined.participant_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(participant.final_rank, Some(1));
        assert_eq!(participant.status, ParticipantStatus::Completed);

        // Quiz-level statistics callbacks fired once each.
        assert_eq!(catalog.play_count(quiz.id), 1);
        assert_eq!(catalog.completion_count(quiz.id), 1);

        // Terminal sessions refuse further control actions.
        let err = end_session(&state, summary.id, host).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn cancelling_a_starting_session_aborts_the_countdown() {
        let quiz = single_choice_quiz();
        let catalog = StaticQuizCatalog::new();
        catalog.insert(quiz.clone());
        let config = EngineConfig {
            countdown: Duration::from_millis(50),
            ..EngineConfig::default()
        };
        let state = AppState::new(config, Arc::new(catalog));
        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;

        let host = Uuid::new_v4();
        let summary = create_session(&state, &create_request(quiz.id, host))
            .await
            .unwrap();
        join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "ada".into(),
                user_id: None,
                guest_token: None,
            },
        )
        .await
        .unwrap();

        start_session(&state, summary.id, host).await.unwrap();
        cancel_session(&state, summary.id, host).await.unwrap();

        // Give the countdown task time to fire against the cancelled session.
        sleep(Duration::from_millis(120)).await;

        let session = state.load_session(summary.id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Cancelled);
        assert_eq!(session.current_question_index, -1);
    }

    #[tokio::test]
    async fn last_active_player_leaving_auto_ends_the_game() {
        let quiz = single_choice_quiz();
        let state = test_state(&quiz).await;
        let host = Uuid::new_v4();
        let summary = create_session(&state, &create_request(quiz.id, host))
            .await
            .unwrap();

        let joined = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "solo".into(),
                user_id: None,
                guest_token: None,
            },
        )
        .await
        .unwrap();

        start_session(&state, summary.id, host).await.unwrap();
        wait_until_in_progress(&state, summary.id).await;

        leave_session(&state, summary.id, joined.participant_id)
            .await
            .unwrap();

        let session = state.load_session(summary.id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Finished);
        assert_eq!(session.active_player_count, 0);
    }

    #[tokio::test]
    async fn kicked_participants_cannot_rejoin() {
        let quiz = single_choice_quiz();
        let user = Uuid::new_v4();
        let state = test_state_with_users(&quiz, &[user]).await;
        let host = Uuid::new_v4();
        let summary = create_session(&state, &create_request(quiz.id, host))
            .await
            .unwrap();

        let joined = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "rude".into(),
                user_id: Some(user),
                guest_token: None,
            },
        )
        .await
        .unwrap();

        kick_participant(
            &state,
            summary.id,
            joined.participant_id,
            host,
            Some("spam".into()),
        )
        .await
        .unwrap();

        let err = join_session(
            &state,
            JoinSessionRequest {
                code: summary.join_code.clone(),
                nickname: "rude".into(),
                user_id: Some(user),
                guest_token: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn join_codes_are_unique_among_live_sessions() {
        let quiz = single_choice_quiz();
        let state = test_state(&quiz).await;
        let mut codes = std::collections::HashSet::new();
        for _ in 0..25 {
            let summary = create_session(&state, &create_request(quiz.id, Uuid::new_v4()))
                .await
                .unwrap();
            assert!(codes.insert(summary.join_code), "duplicate live join code");
        }
    }
}
