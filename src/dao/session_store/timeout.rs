use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};
use crate::state::session::{AnswerRecord, GameSession, Participant};

/// Decorator bounding every store operation with an I/O deadline.
///
/// Deferred question-deadline timers and request handlers share the same
/// store; a stalled backend must surface as an error instead of hanging them.
pub struct TimeoutStore {
    inner: Arc<dyn SessionStore>,
    limit: Duration,
}

impl TimeoutStore {
    /// Wrap a store so each operation fails after `limit`.
    pub fn new(inner: Arc<dyn SessionStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    fn bound<T: Send + 'static>(
        &self,
        operation: &'static str,
        future: BoxFuture<'static, StorageResult<T>>,
    ) -> BoxFuture<'static, StorageResult<T>> {
        let limit = self.limit;
        Box::pin(async move {
            match tokio::time::timeout(limit, future).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::Timeout { operation }),
            }
        })
    }
}

impl SessionStore for TimeoutStore {
    fn save_session(&self, session: GameSession) -> BoxFuture<'static, StorageResult<()>> {
        self.bound("saving session", self.inner.save_session(session))
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameSession>>> {
        self.bound("finding session", self.inner.find_session(id))
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSession>>> {
        self.bound(
            "finding session by code",
            self.inner.find_session_by_code(code),
        )
    }

    fn save_participant(
        &self,
        participant: Participant,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.bound("saving participant", self.inner.save_participant(participant))
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Participant>>> {
        self.bound("finding participant", self.inner.find_participant(id))
    }

    fn find_participant_by_guest_token(
        &self,
        token: String,
    ) -> BoxFuture<'static, StorageResult<Option<Participant>>> {
        self.bound(
            "finding participant by guest token",
            self.inner.find_participant_by_guest_token(token),
        )
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<Participant>>> {
        self.bound(
            "listing participants",
            self.inner.list_participants(session_id),
        )
    }

    fn insert_answer(&self, answer: AnswerRecord) -> BoxFuture<'static, StorageResult<bool>> {
        self.bound("inserting answer", self.inner.insert_answer(answer))
    }

    fn find_answer(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AnswerRecord>>> {
        self.bound(
            "finding answer",
            self.inner.find_answer(session_id, participant_id, question_id),
        )
    }

    fn list_answers(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerRecord>>> {
        self.bound("listing answers", self.inner.list_answers(session_id))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.bound("pinging the backend", self.inner.health_check())
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.bound("reconnecting", self.inner.try_reconnect())
    }
}
