//! MongoDB backend for the [`SessionStore`] trait.
//!
//! Sessions, participants, and answers live in three collections. Each
//! document duplicates its query keys as plain strings at the top level and
//! nests the full serialized aggregate, so lookups never depend on how serde
//! encodes nested types. Answer idempotency maps onto the `_id` of the
//! answers collection: duplicate inserts fail with a duplicate-key error that
//! is reported as `Ok(false)`.

use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};
use crate::state::session::{AnswerRecord, GameSession, Participant};

const SESSION_COLLECTION: &str = "sessions";
const PARTICIPANT_COLLECTION: &str = "participants";
const ANSWER_COLLECTION: &str = "answers";

#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(rename = "_id")]
    id: String,
    join_code: String,
    status: String,
    live: bool,
    session: GameSession,
}

#[derive(Debug, Serialize, Deserialize)]
struct ParticipantDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    guest_token: Option<String>,
    participant: Participant,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnswerDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    answer: AnswerRecord,
}

impl From<GameSession> for SessionDocument {
    fn from(session: GameSession) -> Self {
        Self {
            id: session.id.to_string(),
            join_code: session.join_code.clone(),
            status: status_tag(&session),
            live: !session.status.is_terminal(),
            session,
        }
    }
}

impl From<Participant> for ParticipantDocument {
    fn from(participant: Participant) -> Self {
        Self {
            id: participant.id.to_string(),
            session_id: participant.session_id.to_string(),
            guest_token: participant.guest_token.clone(),
            participant,
        }
    }
}

impl From<AnswerRecord> for AnswerDocument {
    fn from(answer: AnswerRecord) -> Self {
        Self {
            id: answer_key(answer.session_id, answer.participant_id, answer.question_id),
            session_id: answer.session_id.to_string(),
            answer,
        }
    }
}

fn status_tag(session: &GameSession) -> String {
    // serde renders the status enum as its SCREAMING_SNAKE_CASE tag.
    serde_json::to_value(session.status)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_default()
}

fn answer_key(session: Uuid, participant: Uuid, question: Uuid) -> String {
    format!("{session}:{participant}:{question}")
}

/// MongoDB-backed session store.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    uri: String,
    database_name: String,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoSessionStore {
    /// Establish a connection and ensure the indexes the store relies on.
    pub async fn connect(uri: &str, database_name: &str) -> StorageResult<Self> {
        let (client, database) = establish_connection(uri, database_name).await?;
        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { client, database }),
                uri: uri.to_owned(),
                database_name: database_name.to_owned(),
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn database(&self) -> Database {
        self.inner.state.read().await.database.clone()
    }

    async fn sessions(&self) -> Collection<SessionDocument> {
        self.database().await.collection(SESSION_COLLECTION)
    }

    async fn participants(&self) -> Collection<ParticipantDocument> {
        self.database().await.collection(PARTICIPANT_COLLECTION)
    }

    async fn answers(&self) -> Collection<AnswerDocument> {
        self.database().await.collection(ANSWER_COLLECTION)
    }

    async fn ensure_indexes(&self) -> StorageResult<()> {
        let database = self.database().await;

        let sessions = database.collection::<SessionDocument>(SESSION_COLLECTION);
        // Only live (non-terminal) sessions reserve their join code, so a
        // finished game never blocks the code from being reissued.
        let code_index = mongodb::IndexModel::builder()
            .keys(doc! { "join_code": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("session_join_code_idx".to_owned()))
                    .unique(Some(true))
                    .partial_filter_expression(Some(doc! { "live": { "$eq": true } }))
                    .build(),
            )
            .build();
        sessions.create_index(code_index).await.map_err(|source| {
            StorageError::unavailable("creating session join code index".into(), source)
        })?;

        let participants = database.collection::<ParticipantDocument>(PARTICIPANT_COLLECTION);
        let membership_index = mongodb::IndexModel::builder()
            .keys(doc! { "session_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("participant_session_idx".to_owned()))
                    .build(),
            )
            .build();
        participants
            .create_index(membership_index)
            .await
            .map_err(|source| {
                StorageError::unavailable("creating participant session index".into(), source)
            })?;

        let answers = database.collection::<AnswerDocument>(ANSWER_COLLECTION);
        let session_answers_index = mongodb::IndexModel::builder()
            .keys(doc! { "session_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("answer_session_idx".to_owned()))
                    .build(),
            )
            .build();
        answers
            .create_index(session_answers_index)
            .await
            .map_err(|source| {
                StorageError::unavailable("creating answer session index".into(), source)
            })?;

        Ok(())
    }
}

impl SessionStore for MongoSessionStore {
    fn save_session(&self, session: GameSession) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document: SessionDocument = session.into();
            store
                .sessions()
                .await
                .replace_one(doc! { "_id": &document.id }, &document)
                .upsert(true)
                .await
                .map_err(|source| {
                    if is_duplicate_key(&source) {
                        StorageError::Conflict {
                            message: format!(
                                "join code `{}` is already held by a live session",
                                document.join_code
                            ),
                        }
                    } else {
                        StorageError::unavailable("saving session".into(), source)
                    }
                })?;
            Ok(())
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameSession>>> {
        let store = self.clone();
        Box::pin(async move {
            let found = store
                .sessions()
                .await
                .find_one(doc! { "_id": id.to_string() })
                .await
                .map_err(|source| StorageError::unavailable("finding session".into(), source))?;
            Ok(found.map(|document| document.session))
        })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSession>>> {
        let store = self.clone();
        Box::pin(async move {
            let found = store
                .sessions()
                .await
                .find_one(doc! { "join_code": code, "live": true })
                .await
                .map_err(|source| {
                    StorageError::unavailable("finding session by code".into(), source)
                })?;
            Ok(found.map(|document| document.session))
        })
    }

    fn save_participant(
        &self,
        participant: Participant,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document: ParticipantDocument = participant.into();
            store
                .participants()
                .await
                .replace_one(doc! { "_id": &document.id }, &document)
                .upsert(true)
                .await
                .map_err(|source| StorageError::unavailable("saving participant".into(), source))?;
            Ok(())
        })
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Participant>>> {
        let store = self.clone();
        Box::pin(async move {
            let found = store
                .participants()
                .await
                .find_one(doc! { "_id": id.to_string() })
                .await
                .map_err(|source| {
                    StorageError::unavailable("finding participant".into(), source)
                })?;
            Ok(found.map(|document| document.participant))
        })
    }

    fn find_participant_by_guest_token(
        &self,
        token: String,
    ) -> BoxFuture<'static, StorageResult<Option<Participant>>> {
        let store = self.clone();
        Box::pin(async move {
            let found = store
                .participants()
                .await
                .find_one(doc! { "guest_token": token })
                .await
                .map_err(|source| {
                    StorageError::unavailable("finding participant by guest token".into(), source)
                })?;
            Ok(found.map(|document| document.participant))
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<Participant>>> {
        let store = self.clone();
        Box::pin(async move {
            let cursor = store
                .participants()
                .await
                .find(doc! { "session_id": session_id.to_string() })
                .await
                .map_err(|source| {
                    StorageError::unavailable("listing participants".into(), source)
                })?;
            let documents: Vec<ParticipantDocument> = cursor.try_collect().await.map_err(
                |source| StorageError::unavailable("collecting participants".into(), source),
            )?;
            let mut list: Vec<Participant> = documents
                .into_iter()
                .map(|document| document.participant)
                .collect();
            list.sort_by_key(|p| p.joined_at);
            Ok(list)
        })
    }

    fn insert_answer(&self, answer: AnswerRecord) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let document: AnswerDocument = answer.into();
            match store.answers().await.insert_one(&document).await {
                Ok(_) => Ok(true),
                Err(err) if is_duplicate_key(&err) => Ok(false),
                Err(source) => Err(StorageError::unavailable(
                    "inserting answer".into(),
                    source,
                )),
            }
        })
    }

    fn find_answer(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AnswerRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let found = store
                .answers()
                .await
                .find_one(doc! { "_id": answer_key(session_id, participant_id, question_id) })
                .await
                .map_err(|source| StorageError::unavailable("finding answer".into(), source))?;
            Ok(found.map(|document| document.answer))
        })
    }

    fn list_answers(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let cursor = store
                .answers()
                .await
                .find(doc! { "session_id": session_id.to_string() })
                .await
                .map_err(|source| StorageError::unavailable("listing answers".into(), source))?;
            let documents: Vec<AnswerDocument> = cursor
                .try_collect()
                .await
                .map_err(|source| StorageError::unavailable("collecting answers".into(), source))?;
            Ok(documents.into_iter().map(|document| document.answer).collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .database()
                .await
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(|source| StorageError::unavailable("pinging MongoDB".into(), source))?;
            Ok(())
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let (client, database) =
                establish_connection(&store.inner.uri, &store.inner.database_name).await?;
            let mut guard = store.inner.state.write().await;
            guard.client = client;
            guard.database = database;
            Ok(())
        })
    }
}

async fn establish_connection(
    uri: &str,
    database_name: &str,
) -> StorageResult<(Client, Database)> {
    let options = ClientOptions::parse(uri)
        .await
        .map_err(|source| StorageError::unavailable("parsing MongoDB URI".into(), source))?;
    let client = Client::with_options(options)
        .map_err(|source| StorageError::unavailable("building MongoDB client".into(), source))?;
    let database = client.database(database_name);
    Ok((client, database))
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == 11000
    )
}
