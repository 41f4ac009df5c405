use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};
use crate::state::session::{AnswerRecord, GameSession, Participant};

/// Process-local store backed by concurrent maps.
///
/// Serves as the default backend for single-instance deployments and as the
/// test double for the service layer. Answer uniqueness and live join-code
/// uniqueness are enforced through the map's entry API, so concurrent
/// duplicate inserts race safely.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: DashMap<Uuid, GameSession>,
    // Join-code reservations of non-terminal sessions, keyed code -> owner.
    live_codes: DashMap<String, Uuid>,
    participants: DashMap<Uuid, Participant>,
    answers: DashMap<(Uuid, Uuid, Uuid), AnswerRecord>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn save_session(&self, session: GameSession) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if session.status.is_terminal() {
                inner
                    .live_codes
                    .remove_if(&session.join_code, |_, owner| *owner == session.id);
            } else {
                match inner.live_codes.entry(session.join_code.clone()) {
                    dashmap::mapref::entry::Entry::Occupied(reservation)
                        if *reservation.get() != session.id =>
                    {
                        return Err(StorageError::Conflict {
                            message: format!(
                                "join code `{}` is already held by a live session",
                                session.join_code
                            ),
                        });
                    }
                    dashmap::mapref::entry::Entry::Occupied(_) => {}
                    dashmap::mapref::entry::Entry::Vacant(slot) => {
                        slot.insert(session.id);
                    }
                }
            }
            inner.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameSession>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.sessions.get(&id).map(|entry| entry.clone())) })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSession>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let found = inner
                .sessions
                .iter()
                .find(|entry| entry.join_code == code && !entry.status.is_terminal())
                .map(|entry| entry.clone());
            Ok(found)
        })
    }

    fn save_participant(
        &self,
        participant: Participant,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.participants.insert(participant.id, participant);
            Ok(())
        })
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Participant>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.participants.get(&id).map(|entry| entry.clone())) })
    }

    fn find_participant_by_guest_token(
        &self,
        token: String,
    ) -> BoxFuture<'static, StorageResult<Option<Participant>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let found = inner
                .participants
                .iter()
                .find(|entry| entry.guest_token.as_deref() == Some(token.as_str()))
                .map(|entry| entry.clone());
            Ok(found)
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<Participant>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut list: Vec<Participant> = inner
                .participants
                .iter()
                .filter(|entry| entry.session_id == session_id)
                .map(|entry| entry.clone())
                .collect();
            list.sort_by_key(|p| p.joined_at);
            Ok(list)
        })
    }

    fn insert_answer(&self, answer: AnswerRecord) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let key = (answer.session_id, answer.participant_id, answer.question_id);
            match inner.answers.entry(key) {
                dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(answer);
                    Ok(true)
                }
            }
        })
    }

    fn find_answer(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AnswerRecord>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .answers
                .get(&(session_id, participant_id, question_id))
                .map(|entry| entry.clone()))
        })
    }

    fn list_answers(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerRecord>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .answers
                .iter()
                .filter(|entry| entry.session_id == session_id)
                .map(|entry| entry.clone())
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn answer(session: Uuid, participant: Uuid, question: Uuid) -> AnswerRecord {
        AnswerRecord {
            session_id: session,
            participant_id: participant,
            question_id: question,
            payload: None,
            correct: false,
            points_earned: 0,
            max_points: 0,
            response_ms: 0,
            skipped: true,
            timed_out: false,
            submitted_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn insert_answer_rejects_duplicates() {
        let store = MemorySessionStore::new();
        let (s, p, q) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert!(store.insert_answer(answer(s, p, q)).await.unwrap());
        assert!(!store.insert_answer(answer(s, p, q)).await.unwrap());
        assert_eq!(store.list_answers(s).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn live_sessions_cannot_share_a_join_code() {
        use crate::state::session::SessionConfig;
        use crate::state::status::SessionStatus;

        let store = MemorySessionStore::new();
        let mut first = GameSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "31337".into(),
            vec![Uuid::new_v4()],
            SessionConfig::default(),
        );
        let second = GameSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "31337".into(),
            vec![Uuid::new_v4()],
            SessionConfig::default(),
        );

        store.save_session(first.clone()).await.unwrap();
        let err = store.save_session(second.clone()).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        // A terminal save releases the reservation for the next session.
        first.status = SessionStatus::Cancelled;
        store.save_session(first).await.unwrap();
        store.save_session(second).await.unwrap();
    }

    #[tokio::test]
    async fn terminal_sessions_are_invisible_to_code_lookup() {
        use crate::state::session::SessionConfig;
        use crate::state::status::SessionStatus;

        let store = MemorySessionStore::new();
        let mut session = GameSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "424242".into(),
            vec![Uuid::new_v4()],
            SessionConfig::default(),
        );
        store.save_session(session.clone()).await.unwrap();
        assert!(
            store
                .find_session_by_code("424242".into())
                .await
                .unwrap()
                .is_some()
        );

        session.status = SessionStatus::Cancelled;
        store.save_session(session).await.unwrap();
        assert!(
            store
                .find_session_by_code("424242".into())
                .await
                .unwrap()
                .is_none()
        );
    }
}
