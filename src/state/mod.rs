/// Question model consumed from the authoring subsystem.
pub mod question;
/// Session, participant, and answer aggregates.
pub mod session;
mod sse;
/// Session and participant status machines.
pub mod status;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    dao::{
        cache::TtlCache,
        quiz_catalog::QuizCatalog,
        session_store::{SessionStore, timeout::TimeoutStore},
    },
    dto::leaderboard::LeaderboardEntry,
    error::ServiceError,
    state::session::{GameSession, Participant},
};

pub use self::sse::EventHub;

/// Cheaply clonable handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Projection caches absorbing read fan-out during live play.
///
/// Every cache here is derived and disposable; losing an entry costs a
/// recompute against the store, never correctness.
pub struct ProjectionCaches {
    /// Session aggregates keyed by id.
    pub sessions: TtlCache<Uuid, GameSession>,
    /// Join-code to session-id mapping for live sessions.
    pub session_codes: TtlCache<String, Uuid>,
    /// Ranked standings keyed by session id.
    pub leaderboards: TtlCache<Uuid, Vec<LeaderboardEntry>>,
    /// Participant lists keyed by session id.
    pub participant_lists: TtlCache<Uuid, Vec<Participant>>,
}

impl ProjectionCaches {
    fn new(config: &EngineConfig) -> Self {
        Self {
            sessions: TtlCache::new(config.session_ttl),
            session_codes: TtlCache::new(config.session_ttl),
            leaderboards: TtlCache::new(config.leaderboard_ttl),
            participant_lists: TtlCache::new(config.participants_ttl),
        }
    }

    /// Drop every projection derived from the given session.
    pub fn invalidate_session(&self, session_id: Uuid) {
        self.sessions.invalidate(&session_id);
        self.leaderboards.invalidate(&session_id);
        self.participant_lists.invalidate(&session_id);
    }
}

/// Central application state storing the store handle, caches, broadcast hub,
/// and the per-session concurrency guards.
pub struct AppState {
    store: RwLock<Option<Arc<dyn SessionStore>>>,
    catalog: Arc<dyn QuizCatalog>,
    caches: ProjectionCaches,
    events: EventHub,
    config: EngineConfig,
    degraded: watch::Sender<bool>,
    session_gates: DashMap<Uuid, Arc<Mutex<()>>>,
    deadline_tasks: DashMap<Uuid, AbortHandle>,
    submission_guards: DashMap<(Uuid, Uuid), ()>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: EngineConfig, catalog: Arc<dyn QuizCatalog>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            catalog,
            caches: ProjectionCaches::new(&config),
            events: EventHub::new(64),
            config,
            degraded: degraded_tx,
            session_gates: DashMap::new(),
            deadline_tasks: DashMap::new(),
            submission_guards: DashMap::new(),
        })
    }

    /// Engine configuration frozen at startup.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Gateway to the quiz authoring subsystem.
    pub fn catalog(&self) -> &Arc<dyn QuizCatalog> {
        &self.catalog
    }

    /// Projection caches.
    pub fn caches(&self) -> &ProjectionCaches {
        &self.caches
    }

    /// Broadcast hub for the session event stream.
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the session store or fail with the degraded-mode error.
    pub async fn require_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    ///
    /// The store is wrapped so every operation is bounded by the configured
    /// I/O deadline; a stalled backend errors out instead of hanging the
    /// deadline timers that share it.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        let bounded: Arc<dyn SessionStore> =
            Arc::new(TimeoutStore::new(store, self.config.store_timeout));
        {
            let mut guard = self.store.write().await;
            *guard = Some(bounded);
        }
        self.update_degraded(false);
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Mutex serializing lifecycle mutations of one session.
    ///
    /// Deferred timer tasks and request handlers both take this gate before
    /// mutating, so a deadline firing against a host action cannot interleave.
    pub fn session_gate(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.session_gates
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lifecycle gate of a session that reached a terminal status.
    ///
    /// Tasks already holding the gate's `Arc` finish their critical section
    /// on the old mutex; any later caller gets a fresh gate and bounces off
    /// the terminal status check.
    pub fn release_session_gate(&self, session_id: Uuid) {
        self.session_gates.remove(&session_id);
    }

    /// Register the armed deadline task of a session, cancelling any previous
    /// one so at most one deadline per session is ever pending.
    pub fn arm_deadline(&self, session_id: Uuid, handle: AbortHandle) {
        if let Some(previous) = self.deadline_tasks.insert(session_id, handle) {
            previous.abort();
        }
    }

    /// Cancel and forget a session's pending deadline, if any.
    pub fn disarm_deadline(&self, session_id: Uuid) {
        if let Some((_, handle)) = self.deadline_tasks.remove(&session_id) {
            handle.abort();
        }
    }

    /// Acquire the fail-fast submission token for (session, participant).
    ///
    /// Returns `None` when another submission by the same participant is
    /// already in flight. The token is released when the guard drops.
    pub fn try_submission_guard(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> Option<SubmissionGuard<'_>> {
        let key = (session_id, participant_id);
        match self.submission_guards.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Some(SubmissionGuard {
                    guards: &self.submission_guards,
                    key,
                })
            }
        }
    }

    /// Read a session through the projection cache, falling back to the store.
    pub async fn load_session(&self, id: Uuid) -> Result<GameSession, ServiceError> {
        if let Some(session) = self.caches.sessions.get(&id) {
            return Ok(session);
        }
        let store = self.require_store().await?;
        let session = store
            .find_session(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("session `{id}` not found")))?;
        self.caches.sessions.put(id, session.clone());
        Ok(session)
    }

    /// Read a live session by join code, through the code-mapping cache.
    pub async fn load_session_by_code(&self, code: &str) -> Result<GameSession, ServiceError> {
        if let Some(id) = self.caches.session_codes.get(&code.to_owned()) {
            if let Ok(session) = self.load_session(id).await {
                if session.join_code == code && !session.status.is_terminal() {
                    return Ok(session);
                }
            }
            self.caches.session_codes.invalidate(&code.to_owned());
        }
        let store = self.require_store().await?;
        let session = store
            .find_session_by_code(code.to_owned())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no session with code `{code}`")))?;
        self.caches.session_codes.put(code.to_owned(), session.id);
        self.caches.sessions.put(session.id, session.clone());
        Ok(session)
    }

    /// Write a session through to the store and refresh its cached projection.
    pub async fn persist_session(&self, session: &GameSession) -> Result<(), ServiceError> {
        let store = self.require_store().await?;
        store.save_session(session.clone()).await?;
        self.caches.sessions.put(session.id, session.clone());
        if session.status.is_terminal() {
            self.caches.session_codes.invalidate(&session.join_code);
        } else {
            self.caches
                .session_codes
                .put(session.join_code.clone(), session.id);
        }
        Ok(())
    }

    /// Read a session's participant list through the projection cache.
    pub async fn load_participants(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<Participant>, ServiceError> {
        if let Some(list) = self.caches.participant_lists.get(&session_id) {
            return Ok(list);
        }
        let store = self.require_store().await?;
        let list = store.list_participants(session_id).await?;
        self.caches.participant_lists.put(session_id, list.clone());
        Ok(list)
    }

    /// Write a participant through to the store and drop stale projections.
    pub async fn persist_participant(&self, participant: &Participant) -> Result<(), ServiceError> {
        let store = self.require_store().await?;
        store.save_participant(participant.clone()).await?;
        self.caches
            .participant_lists
            .invalidate(&participant.session_id);
        Ok(())
    }
}

/// RAII token held for the duration of one answer submission.
pub struct SubmissionGuard<'a> {
    guards: &'a DashMap<(Uuid, Uuid), ()>,
    key: (Uuid, Uuid),
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        self.guards.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::quiz_catalog::StaticQuizCatalog;

    #[tokio::test]
    async fn submission_guard_is_exclusive_and_released_on_drop() {
        let state = AppState::new(
            EngineConfig::default(),
            Arc::new(StaticQuizCatalog::new()),
        );
        let session = Uuid::new_v4();
        let participant = Uuid::new_v4();

        let guard = state.try_submission_guard(session, participant);
        assert!(guard.is_some());
        assert!(state.try_submission_guard(session, participant).is_none());

        drop(guard);
        assert!(state.try_submission_guard(session, participant).is_some());
    }

    #[tokio::test]
    async fn state_starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(
            EngineConfig::default(),
            Arc::new(StaticQuizCatalog::new()),
        );
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.require_store().await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test]
    async fn released_gates_do_not_accumulate() {
        let state = AppState::new(
            EngineConfig::default(),
            Arc::new(StaticQuizCatalog::new()),
        );
        let session_id = Uuid::new_v4();

        let gate = state.session_gate(session_id);
        drop(gate.lock().await);
        assert_eq!(state.session_gates.len(), 1);

        state.release_session_gate(session_id);
        assert!(state.session_gates.is_empty());

        // A straggler holding the old Arc still locks safely.
        drop(gate.lock().await);
    }

    #[tokio::test]
    async fn degraded_watcher_follows_store_install_and_clear() {
        use crate::dao::session_store::memory::MemorySessionStore;

        let state = AppState::new(
            EngineConfig::default(),
            Arc::new(StaticQuizCatalog::new()),
        );
        let watcher = state.degraded_watcher();
        assert!(*watcher.borrow());

        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        assert!(!*watcher.borrow());
        assert!(state.require_store().await.is_ok());

        state.clear_session_store().await;
        assert!(*watcher.borrow());
        assert!(state.is_degraded().await);
    }
}
