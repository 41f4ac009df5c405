//! Answer intake: idempotent submission and skip handling for the current
//! question.
//!
//! Idempotency is layered. A fail-fast in-process token rejects a second
//! in-flight submission by the same participant immediately, and the store's
//! unique (session, participant, question) insert rejects replays that slip
//! past the token, so exactly one record survives per participant and
//! question.

use std::time::SystemTime;

use tracing::debug;
use uuid::Uuid;

use crate::{
    dto::answer::AnswerResult,
    error::ServiceError,
    services::{grading, leaderboard, lifecycle, scoring},
    state::{
        SharedState,
        question::SubmittedAnswer,
        session::{AnswerRecord, GameSession, Participant},
        status::SessionStatus,
    },
};

/// Grade and record a submission against the current question.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
    answer: SubmittedAnswer,
) -> Result<AnswerResult, ServiceError> {
    let _token = state
        .try_submission_guard(session_id, participant_id)
        .ok_or_else(|| {
            ServiceError::DuplicateSubmission("another submission is already in flight".into())
        })?;

    let (session, question_id, participant) =
        load_submission_context(state, session_id, participant_id).await?;
    let question = lifecycle::question_by_id(state, session.quiz_id, question_id).await?;

    let response_ms = session
        .question_elapsed_ms(SystemTime::now())
        .ok_or_else(|| ServiceError::InvalidInput("no question is currently live".into()))?;
    let timed_out = scoring::is_timeout(response_ms, question.time_limit_secs);

    let graded = grading::grade(&question, &answer)
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    // A late answer is recorded but never scores, regardless of correctness.
    let correct = graded.correct && !timed_out;
    let points_earned = scoring::points(correct, question.points, response_ms, question.time_limit_secs);

    let record = AnswerRecord {
        session_id,
        participant_id,
        question_id,
        payload: Some(answer),
        correct,
        points_earned,
        max_points: scoring::max_points(question.points),
        response_ms,
        skipped: false,
        timed_out,
        submitted_at: SystemTime::now(),
    };

    finalize(state, &session, participant, record).await
}

/// Record a zero-point skip for the current question.
pub async fn skip_question(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
) -> Result<AnswerResult, ServiceError> {
    let _token = state
        .try_submission_guard(session_id, participant_id)
        .ok_or_else(|| {
            ServiceError::DuplicateSubmission("another submission is already in flight".into())
        })?;

    let (session, question_id, participant) =
        load_submission_context(state, session_id, participant_id).await?;
    let question = lifecycle::question_by_id(state, session.quiz_id, question_id).await?;

    let response_ms = session
        .question_elapsed_ms(SystemTime::now())
        .ok_or_else(|| ServiceError::InvalidInput("no question is currently live".into()))?;

    let record = AnswerRecord {
        session_id,
        participant_id,
        question_id,
        payload: None,
        correct: false,
        points_earned: 0,
        max_points: scoring::max_points(question.points),
        response_ms,
        skipped: true,
        timed_out: scoring::is_timeout(response_ms, question.time_limit_secs),
        submitted_at: SystemTime::now(),
    };

    finalize(state, &session, participant, record).await
}

async fn load_submission_context(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
) -> Result<(GameSession, Uuid, Participant), ServiceError> {
    let session = state.load_session(session_id).await?;
    if session.status != SessionStatus::InProgress {
        return Err(ServiceError::InvalidTransition(format!(
            "answers are not accepted while the session is {:?}",
            session.status
        )));
    }
    let question_id = session
        .current_question_id
        .ok_or_else(|| ServiceError::InvalidInput("no question is currently live".into()))?;
    let participant = lifecycle::fetch_member(state, &session, participant_id).await?;

    let store = state.require_store().await?;
    if store
        .find_answer(session_id, participant_id, question_id)
        .await?
        .is_some()
    {
        return Err(ServiceError::DuplicateSubmission(
            "an answer is already recorded for this question".into(),
        ));
    }

    Ok((session, question_id, participant))
}

/// Persist the record, fold it into the participant's running totals, and
/// drop the projections it invalidates.
async fn finalize(
    state: &SharedState,
    session: &GameSession,
    mut participant: Participant,
    record: AnswerRecord,
) -> Result<AnswerResult, ServiceError> {
    let store = state.require_store().await?;
    if !store.insert_answer(record.clone()).await? {
        debug!(
            session_id = %record.session_id,
            participant_id = %record.participant_id,
            question_id = %record.question_id,
            "duplicate answer insert lost the race"
        );
        return Err(ServiceError::DuplicateSubmission(
            "an answer is already recorded for this question".into(),
        ));
    }

    participant.answer_count += 1;
    participant.total_response_ms += record.response_ms;
    if record.correct {
        participant.score += record.points_earned;
        participant.correct_count += 1;
        participant.streak += 1;
    } else {
        participant.streak = 0;
    }
    state.persist_participant(&participant).await?;
    leaderboard::invalidate(state, session.id);

    Ok(AnswerResult {
        question_id: record.question_id,
        correct: record.correct,
        points_earned: record.points_earned,
        max_points: record.max_points,
        response_ms: record.response_ms,
        timed_out: record.timed_out,
        skipped: record.skipped,
        streak: participant.streak,
        total_score: participant.score,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::{
        config::EngineConfig,
        dao::{
            quiz_catalog::{QuizDefinition, StaticQuizCatalog},
            session_store::memory::MemorySessionStore,
        },
        dto::session::{CreateSessionRequest, JoinSessionRequest},
        state::{
            AppState,
            question::{ChoiceOption, Question, QuestionBody},
        },
    };

    fn quiz() -> QuizDefinition {
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

    async fn live_session(quiz: &QuizDefinition) -> (SharedState, Uuid, Uuid) {
        let catalog = StaticQuizCatalog::new();
        catalog.insert(quiz.clone());
        let config = EngineConfig {
            countdown: Duration::ZERO,
            ..EngineConfig::default()
        };
        let state = AppState::new(config, Arc::new(catalog));
        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;

        let host = Uuid::new_v4();
        let summary = lifecycle::create_session(
            &state,
            &CreateSessionRequest {
                quiz_id: quiz.id,
                host_id: host,
                max_players: 10,
                allow_anonymous: true,
                show_leaderboard: true,
                randomize_questions: false,
                randomize_options: false,
            },
        )
        .await
        .unwrap();
        let joined = lifecycle::join_session(
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
        lifecycle::start_session(&state, summary.id, host)
            .await
            .unwrap();

        for _ in 0..200 {
            let session = state.load_session(summary.id).await.unwrap();
            if session.status == SessionStatus::InProgress {
                return (state, summary.id, joined.participant_id);
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("session never reached in-progress");
    }

    /// Backdate the current question so the elapsed clock reads `elapsed`.
    async fn backdate_question(state: &SharedState, session_id: Uuid, elapsed: Duration) {
        let mut session = state.load_session(session_id).await.unwrap();
        session.question_started_at = Some(SystemTime::now() - elapsed);
        state.persist_session(&session).await.unwrap();
    }

    #[tokio::test]
    async fn fast_correct_answer_earns_the_speed_bonus() {
        let quiz = quiz();
        let (state, session_id, participant_id) = live_session(&quiz).await;
        backdate_question(&state, session_id, Duration::from_secs(5)).await;

        let result = submit_answer(
            &state,
            session_id,
            participant_id,
            SubmittedAnswer::Choice { option_id: 1 },
        )
        .await
        .unwrap();

        assert!(result.correct);
        assert_eq!(result.points_earned, 1200);
        assert_eq!(result.streak, 1);
        assert_eq!(result.total_score, 1200);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn wrong_answers_score_zero_and_reset_the_streak() {
        let quiz = quiz();
        let (state, session_id, participant_id) = live_session(&quiz).await;

        let result = submit_answer(
            &state,
            session_id,
            participant_id,
            SubmittedAnswer::Choice { option_id: 2 },
        )
        .await
        .unwrap();

        assert!(!result.correct);
        assert_eq!(result.points_earned, 0);
        assert_eq!(result.streak, 0);
    }

    #[tokio::test]
    async fn late_answers_are_recorded_as_timed_out_with_zero_points() {
        let quiz = quiz();
        let (state, session_id, participant_id) = live_session(&quiz).await;
        backdate_question(&state, session_id, Duration::from_secs(31)).await;

        let result = submit_answer(
            &state,
            session_id,
            participant_id,
            SubmittedAnswer::Choice { option_id: 1 },
        )
        .await
        .unwrap();

        assert!(result.timed_out);
        assert!(!result.correct);
        assert_eq!(result.points_earned, 0);

        let store = state.require_store().await.unwrap();
        let record = store
            .find_answer(session_id, participant_id, quiz.questions[0].id)
            .await
            .unwrap()
            .unwrap();
        assert!(record.timed_out);
        assert!(!record.correct);
    }

    #[tokio::test]
    async fn second_submission_for_the_same_question_is_rejected() {
        let quiz = quiz();
        let (state, session_id, participant_id) = live_session(&quiz).await;

        submit_answer(
            &state,
            session_id,
            participant_id,
            SubmittedAnswer::Choice { option_id: 1 },
        )
        .await
        .unwrap();

        let err = submit_answer(
            &state,
            session_id,
            participant_id,
            SubmittedAnswer::Choice { option_id: 2 },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateSubmission(_)));
    }

    #[tokio::test]
    async fn concurrent_submissions_admit_exactly_one() {
        let quiz = quiz();
        let (state, session_id, participant_id) = live_session(&quiz).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                submit_answer(
                    &state,
                    session_id,
                    participant_id,
                    SubmittedAnswer::Choice { option_id: 1 },
                )
                .await
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);

        let store = state.require_store().await.unwrap();
        let answers = store.list_answers(session_id).await.unwrap();
        assert_eq!(answers.len(), 1);
    }

    #[tokio::test]
    async fn mismatched_payload_shapes_are_rejected() {
        let quiz = quiz();
        let (state, session_id, participant_id) = live_session(&quiz).await;

        let err = submit_answer(
            &state,
            session_id,
            participant_id,
            SubmittedAnswer::Boolean { value: true },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        // A rejected shape leaves no record; a proper retry still succeeds.
        let result = submit_answer(
            &state,
            session_id,
            participant_id,
            SubmittedAnswer::Choice { option_id: 1 },
        )
        .await
        .unwrap();
        assert!(result.correct);
    }

    #[tokio::test]
    async fn skipping_records_a_zero_point_answer_and_resets_the_streak() {
        let quiz = quiz();
        let (state, session_id, participant_id) = live_session(&quiz).await;

        let result = skip_question(&state, session_id, participant_id)
            .await
            .unwrap();
        assert!(result.skipped);
        assert_eq!(result.points_earned, 0);
        assert_eq!(result.streak, 0);

        // Skipping consumes the question like an answer would.
        let err = submit_answer(
            &state,
            session_id,
            participant_id,
            SubmittedAnswer::Choice { option_id: 1 },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateSubmission(_)));
    }

    #[tokio::test]
    async fn departed_participants_cannot_submit() {
        let quiz = quiz();
        let (state, session_id, participant_id) = live_session(&quiz).await;

        // Leaving mid-game auto-ends a one-player session, so drive the
        // rejection through the kicked path of the access guard instead.
        let store = state.require_store().await.unwrap();
        let mut participant = store
            .find_participant(participant_id)
            .await
            .unwrap()
            .unwrap();
        participant.status = crate::state::status::ParticipantStatus::Kicked;
        state.persist_participant(&participant).await.unwrap();

        let err = submit_answer(
            &state,
            session_id,
            participant_id,
            SubmittedAnswer::Choice { option_id: 1 },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::AccessDenied(_)));
    }
}
