//! Engine configuration loading: countdown, pacing, and cache TTL knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/engine.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZSTORM_CONFIG_PATH";

const DEFAULT_COUNTDOWN_SECS: u64 = 5;
const DEFAULT_SESSION_TTL_SECS: u64 = 300;
const DEFAULT_LEADERBOARD_TTL_SECS: u64 = 5;
const DEFAULT_PARTICIPANTS_TTL_SECS: u64 = 60;
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Grace delay between the host pressing start and the first question.
    pub countdown: Duration,
    /// When set, the question clock advances to the next question on its own
    /// after each deadline instead of waiting for the host.
    pub auto_advance: bool,
    /// TTL for cached session aggregates.
    pub session_ttl: Duration,
    /// TTL for cached leaderboard projections during live play.
    pub leaderboard_ttl: Duration,
    /// TTL for cached participant-list projections.
    pub participants_ttl: Duration,
    /// Upper bound on any single store operation, so a slow backend cannot
    /// stall question-deadline timers.
    pub store_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(DEFAULT_COUNTDOWN_SECS),
            auto_advance: false,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            leaderboard_ttl: Duration::from_secs(DEFAULT_LEADERBOARD_TTL_SECS),
            participants_ttl: Duration::from_secs(DEFAULT_PARTICIPANTS_TTL_SECS),
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), ?config, "loaded engine config");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

/// JSON representation of the configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    countdown_secs: Option<u64>,
    auto_advance: Option<bool>,
    session_ttl_secs: Option<u64>,
    leaderboard_ttl_secs: Option<u64>,
    participants_ttl_secs: Option<u64>,
    store_timeout_secs: Option<u64>,
}

impl From<RawConfig> for EngineConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = EngineConfig::default();
        Self {
            countdown: raw
                .countdown_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.countdown),
            auto_advance: raw.auto_advance.unwrap_or(defaults.auto_advance),
            session_ttl: raw
                .session_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            leaderboard_ttl: raw
                .leaderboard_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.leaderboard_ttl),
            participants_ttl: raw
                .participants_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.participants_ttl),
            store_timeout: raw
                .store_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.store_timeout),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
