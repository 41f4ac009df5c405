//! Quizstorm binary entrypoint wiring REST, SSE, and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::EngineConfig;
use dao::quiz_catalog::{QuizDefinition, StaticQuizCatalog};
use dao::session_store::memory::MemorySessionStore;
use state::{AppState, SharedState};

/// Environment variable pointing at a JSON file of quiz definitions.
const QUIZZES_PATH_ENV: &str = "QUIZSTORM_QUIZZES_PATH";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let engine_config = EngineConfig::load();
    let catalog = Arc::new(load_catalog());
    let app_state = AppState::new(engine_config, catalog);

    init_store(&app_state).await;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the session store backend, preferring MongoDB when available.
///
/// The MongoDB connection is supervised in the background so the server can
/// start (in degraded mode) before storage is reachable.
async fn init_store(state: &SharedState) {
    #[cfg(feature = "mongo-store")]
    {
        use dao::session_store::{SessionStore, mongodb::MongoSessionStore};

        let memory_requested =
            env::var("QUIZSTORM_STORE").is_ok_and(|value| value == "memory");
        if !memory_requested {
            let uri =
                env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
            let db_name = env::var("MONGO_DB").unwrap_or_else(|_| "quizstorm".into());
            tokio::spawn(services::storage_supervisor::run(
                state.clone(),
                move || {
                    let uri = uri.clone();
                    let db_name = db_name.clone();
                    async move {
                        let store = MongoSessionStore::connect(&uri, &db_name).await?;
                        Ok(Arc::new(store) as Arc<dyn SessionStore>)
                    }
                },
            ));
            return;
        }
    }

    info!("using in-memory session store");
    state
        .set_session_store(Arc::new(MemorySessionStore::new()))
        .await;
}

/// Load the quiz catalog from disk when a path is configured.
fn load_catalog() -> StaticQuizCatalog {
    let Some(path) = env::var_os(QUIZZES_PATH_ENV) else {
        info!("no quiz file configured; starting with an empty catalog");
        return StaticQuizCatalog::new();
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<Vec<QuizDefinition>>(&contents) {
            Ok(quizzes) => {
                info!(count = quizzes.len(), "loaded quiz catalog");
                StaticQuizCatalog::with_quizzes(quizzes)
            }
            Err(err) => {
                warn!(error = %err, "failed to parse quiz file; starting empty");
                StaticQuizCatalog::new()
            }
        },
        Err(err) => {
            warn!(error = %err, "failed to read quiz file; starting empty");
            StaticQuizCatalog::new()
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
