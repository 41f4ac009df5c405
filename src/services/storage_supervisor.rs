use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{session_store::SessionStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Reconnect to the storage backend and keep the shared state in degraded mode when it is unavailable.
///
/// While the backend is unreachable the store slot is cleared, so
/// storage-touching requests answer 503 instead of queueing against a dead
/// connection.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn SessionStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_session_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    match store.health_check().await {
                        Ok(()) => sleep(HEALTH_POLL_INTERVAL).await,
                        Err(_) => {
                            if !supervise_reconnect(&state, store.as_ref()).await {
                                break;
                            }
                            state.set_session_store(store.clone()).await;
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Drive the capped reconnect loop after a failed health check.
///
/// Clears the store slot on the first failed attempt and returns whether the
/// backend came back within the attempt budget.
async fn supervise_reconnect(state: &SharedState, store: &dyn SessionStore) -> bool {
    let mut attempt = 0;
    let mut reconnect_delay = INITIAL_DELAY;

    while attempt < MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!("storage reconnection succeeded after health check failure");
                return true;
            }
            Err(reconnect_err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %reconnect_err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.clear_session_store().await;
                } else {
                    warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                }
                attempt += 1;
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }

    warn!("exhausted storage reconnect attempts; staying in degraded mode");
    false
}
