pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;
pub mod timeout;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::storage::StorageResult;
use crate::state::session::{AnswerRecord, GameSession, Participant};

/// Abstraction over the durable persistence layer for sessions, participants,
/// and answer records.
///
/// The store is the source of truth; the projection caches in front of it are
/// disposable. `insert_answer` is the one operation with write semantics
/// beyond upsert: it must enforce the (session, participant, question)
/// uniqueness atomically and report a duplicate as `Ok(false)`.
pub trait SessionStore: Send + Sync {
    /// Upsert a session aggregate.
    fn save_session(&self, session: GameSession) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a session by id.
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameSession>>>;
    /// Fetch a non-terminal session by join code.
    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSession>>>;
    /// Upsert a participant.
    fn save_participant(&self, participant: Participant)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a participant by id.
    fn find_participant(&self, id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<Participant>>>;
    /// Fetch a participant by its anonymous re-entry token.
    fn find_participant_by_guest_token(
        &self,
        token: String,
    ) -> BoxFuture<'static, StorageResult<Option<Participant>>>;
    /// List every participant of a session, including left and kicked ones.
    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<Participant>>>;
    /// Insert an answer record, returning `false` when one already exists for
    /// the same (session, participant, question) triple.
    fn insert_answer(&self, answer: AnswerRecord) -> BoxFuture<'static, StorageResult<bool>>;
    /// Fetch a single answer record.
    fn find_answer(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AnswerRecord>>>;
    /// List every answer recorded for a session.
    fn list_answers(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerRecord>>>;
    /// Cheap liveness probe used by the storage supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish a dropped backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
