//! Read-side projections: participant rosters, live and final leaderboards,
//! and session statistics.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    dto::{
        leaderboard::{LeaderboardEntry, QuestionStatistics, SessionStatistics},
        session::ParticipantSummary,
    },
    error::ServiceError,
    services::leaderboard,
    state::{SharedState, status::SessionStatus},
};

/// Participant roster of a session, served through the projection cache.
pub async fn get_participants(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<ParticipantSummary>, ServiceError> {
    state.load_session(session_id).await?;
    let participants = state.load_participants(session_id).await?;
    Ok(participants.into_iter().map(ParticipantSummary::from).collect())
}

/// Current standings of a session.
pub async fn get_leaderboard(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    state.load_session(session_id).await?;
    leaderboard::rank(state, session_id).await
}

/// Final standings; only available once the session has finished.
pub async fn get_final_leaderboard(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let session = state.load_session(session_id).await?;
    if session.status != SessionStatus::Finished {
        return Err(ServiceError::InvalidTransition(format!(
            "session `{session_id}` has not finished"
        )));
    }
    leaderboard::rank(state, session_id).await
}

/// Aggregate answer statistics for a session, computed from the durable
/// answer records.
pub async fn session_statistics(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SessionStatistics, ServiceError> {
    let session = state.load_session(session_id).await?;
    let store = state.require_store().await?;
    let answers = store.list_answers(session_id).await?;

    let mut per_question: HashMap<Uuid, QuestionStatistics> = HashMap::new();
    for (index, question_id) in session.question_order.iter().enumerate() {
        per_question.insert(
            *question_id,
            QuestionStatistics {
                question_id: *question_id,
                question_number: index as u32 + 1,
                answer_count: 0,
                correct_count: 0,
                skip_count: 0,
                timeout_count: 0,
            },
        );
    }

    for answer in &answers {
        let Some(stats) = per_question.get_mut(&answer.question_id) else {
            continue;
        };
        stats.answer_count += 1;
        if answer.correct {
            stats.correct_count += 1;
        }
        if answer.skipped {
            stats.skip_count += 1;
        }
        if answer.timed_out {
            stats.timeout_count += 1;
        }
    }

    let mut questions: Vec<QuestionStatistics> = per_question.into_values().collect();
    questions.sort_by_key(|stats| stats.question_number);

    Ok(SessionStatistics {
        session_id,
        status: session.status,
        player_count: session.player_count,
        active_player_count: session.active_player_count,
        completed_player_count: session.completed_player_count,
        average_score: session.average_score,
        total_questions: session.total_questions(),
        questions,
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
        services::{answer_intake, lifecycle},
        state::{
            AppState,
            question::{ChoiceOption, Question, QuestionBody, SubmittedAnswer},
        },
    };

    fn quiz() -> QuizDefinition {
        QuizDefinition {
            id: Uuid::new_v4(),
            title: "stats".into(),
            published: true,
            questions: vec![Question {
                id: Uuid::new_v4(),
                text: "2 + 2?".into(),
                time_limit_secs: 30,
                points: 500,
                order_index: 0,
                body: QuestionBody::SingleChoice {
                    options: vec![
                        ChoiceOption {
                            id: 1,
                            text: "4".into(),
                            correct: true,
                        },
                        ChoiceOption {
                            id: 2,
                            text: "5".into(),
                            correct: false,
                        },
                    ],
                },
            }],
        }
    }

    #[tokio::test]
    async fn statistics_break_answers_down_per_question() {
        let quiz = quiz();
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

        let mut ids = Vec::new();
        for nickname in ["right", "wrong", "skipper"] {
            let joined = lifecycle::join_session(
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
            ids.push(joined.participant_id);
        }

        lifecycle::start_session(&state, summary.id, host)
            .await
            .unwrap();
        for _ in 0..200 {
            let session = state.load_session(summary.id).await.unwrap();
            if session.status == SessionStatus::InProgress {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }

        answer_intake::submit_answer(
            &state,
            summary.id,
            ids[0],
            SubmittedAnswer::Choice { option_id: 1 },
        )
        .await
        .unwrap();
        answer_intake::submit_answer(
            &state,
            summary.id,
            ids[1],
            SubmittedAnswer::Choice { option_id: 2 },
        )
        .await
        .unwrap();
        answer_intake::skip_question(&state, summary.id, ids[2])
            .await
            .unwrap();

        let stats = session_statistics(&state, summary.id).await.unwrap();
        assert_eq!(stats.total_questions, 1);
        assert_eq!(stats.player_count, 3);
        let question = &stats.questions[0];
        assert_eq!(question.question_number, 1);
        assert_eq!(question.answer_count, 3);
        assert_eq!(question.correct_count, 1);
        assert_eq!(question.skip_count, 1);
        assert_eq!(question.timeout_count, 0);

        // Final board is refused while the game is still running.
        let err = get_final_leaderboard(&state, summary.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));

        lifecycle::end_session(&state, summary.id, host).await.unwrap();
        let board = get_final_leaderboard(&state, summary.id).await.unwrap();
        assert_eq!(board.len(), 3);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].nickname, "right");
    }
}
