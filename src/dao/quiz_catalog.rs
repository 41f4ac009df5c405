use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::storage::StorageResult;
use crate::state::question::Question;

/// A quiz as published by the authoring subsystem, consumed read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDefinition {
    /// Stable identifier of the quiz.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Whether the quiz may be hosted. Unpublished quizzes cannot start sessions.
    pub published: bool,
    /// Questions in authored order.
    pub questions: Vec<Question>,
}

/// Registered account as exposed by the identity subsystem. Participants
/// joining without one are anonymous guests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    /// Stable identifier of the account.
    pub id: Uuid,
    /// Display name shown alongside the participant's nickname.
    pub display_name: String,
}

/// Read-only gateway to the quiz authoring and identity subsystems, plus the
/// statistics callbacks the engine fires at game start and end.
pub trait QuizCatalog: Send + Sync {
    /// Look up a quiz with its ordered question list.
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizDefinition>>>;
    /// Resolve a registered account for a non-anonymous join.
    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserRef>>>;
    /// Notify the authoring subsystem that a session of this quiz started.
    fn record_play_started(&self, quiz_id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    /// Notify the authoring subsystem that a session finished, carrying the
    /// session's average score for the quiz-level rolling average.
    fn record_completion(
        &self,
        quiz_id: Uuid,
        average_score: f64,
    ) -> BoxFuture<'static, StorageResult<()>>;
}

/// In-process catalog backed by a concurrent map.
///
/// Serves single-binary deployments (quizzes loaded from a JSON file at
/// startup) and the service-layer tests.
#[derive(Clone, Default)]
pub struct StaticQuizCatalog {
    inner: Arc<CatalogInner>,
}

#[derive(Default)]
struct CatalogInner {
    quizzes: DashMap<Uuid, QuizDefinition>,
    users: DashMap<Uuid, UserRef>,
    play_stats: DashMap<Uuid, PlayStats>,
}

#[derive(Debug, Clone, Copy, Default)]
struct PlayStats {
    plays: u64,
    completions: u64,
    average_score: f64,
}

impl StaticQuizCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog pre-populated with the given quizzes.
    pub fn with_quizzes(quizzes: impl IntoIterator<Item = QuizDefinition>) -> Self {
        let catalog = Self::new();
        for quiz in quizzes {
            catalog.inner.quizzes.insert(quiz.id, quiz);
        }
        catalog
    }

    /// Register or replace a quiz.
    pub fn insert(&self, quiz: QuizDefinition) {
        self.inner.quizzes.insert(quiz.id, quiz);
    }

    /// Register or replace a user account.
    pub fn insert_user(&self, user: UserRef) {
        self.inner.users.insert(user.id, user);
    }

    /// Number of sessions started for a quiz. Used by tests and diagnostics.
    pub fn play_count(&self, quiz_id: Uuid) -> u64 {
        self.inner
            .play_stats
            .get(&quiz_id)
            .map(|stats| stats.plays)
            .unwrap_or(0)
    }

    /// Number of sessions completed for a quiz.
    pub fn completion_count(&self, quiz_id: Uuid) -> u64 {
        self.inner
            .play_stats
            .get(&quiz_id)
            .map(|stats| stats.completions)
            .unwrap_or(0)
    }
}

impl QuizCatalog for StaticQuizCatalog {
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizDefinition>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.quizzes.get(&id).map(|entry| entry.clone())) })
    }

    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserRef>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.users.get(&id).map(|entry| entry.clone())) })
    }

    fn record_play_started(&self, quiz_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.play_stats.entry(quiz_id).or_default().plays += 1;
            Ok(())
        })
    }

    fn record_completion(
        &self,
        quiz_id: Uuid,
        average_score: f64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut stats = inner.play_stats.entry(quiz_id).or_default();
            stats.completions += 1;
            // Rolling mean over completed sessions.
            let n = stats.completions as f64;
            stats.average_score = stats.average_score + (average_score - stats.average_score) / n;
            Ok(())
        })
    }
}
