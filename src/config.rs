//! Application-level configuration loading: scheduler cadence, store timeouts and backend selection.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SESSION_TIMER_CONFIG_PATH";

/// Which persistence backend the server should connect to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// MongoDB with the partial unique index on active timers.
    Mongo,
    /// Process-local store; timers do not survive a restart.
    Memory,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Cadence of the scheduler sweep.
    pub tick_interval: Duration,
    /// Emit a `timer-update` broadcast every N sweeps.
    pub update_every_ticks: u64,
    /// Upper bound for any single store call.
    pub store_timeout: Duration,
    /// Capacity of each committee room broadcast channel.
    pub room_capacity: usize,
    /// Longest duration accepted on create, in seconds.
    pub max_duration_secs: u64,
    /// Roles recorded on timers created without an explicit `controllableBy`.
    pub default_controllable_by: Vec<String>,
    pub store_backend: StoreBackend,
    pub mongo_uri: String,
    pub mongo_db: Option<String>,
    pub port: u16,
}

impl AppConfig {
    /// Load the application configuration from disk, then apply environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded timer configuration");
                    raw.into()
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
        };

        config.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(uri) = env::var("MONGO_URI") {
            self.mongo_uri = uri;
        }
        if let Ok(db) = env::var("MONGO_DB") {
            self.mongo_db = Some(db);
        }
        if let Some(port) = env::var("PORT")
            .or_else(|_| env::var("SERVER_PORT"))
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
        {
            self.port = port;
        }
        match env::var("TIMER_STORE").as_deref() {
            Ok("memory") => self.store_backend = StoreBackend::Memory,
            Ok("mongo") => self.store_backend = StoreBackend::Mongo,
            Ok(other) => warn!(value = other, "ignoring unknown TIMER_STORE value"),
            Err(_) => {}
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    tick_interval_ms: u64,
    update_every_ticks: u64,
    store_timeout_ms: u64,
    room_capacity: usize,
    max_duration_secs: u64,
    default_controllable_by: Vec<String>,
    store: StoreBackend,
    mongo_uri: String,
    mongo_db: Option<String>,
    port: u16,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            update_every_ticks: 5,
            store_timeout_ms: 2_000,
            room_capacity: 64,
            max_duration_secs: 24 * 60 * 60,
            default_controllable_by: vec!["chair".into(), "admin".into()],
            store: StoreBackend::Mongo,
            mongo_uri: "mongodb://localhost:27017".into(),
            mongo_db: None,
            port: 8080,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(value.tick_interval_ms.max(1)),
            update_every_ticks: value.update_every_ticks.max(1),
            store_timeout: Duration::from_millis(value.store_timeout_ms.max(1)),
            room_capacity: value.room_capacity.max(1),
            max_duration_secs: value.max_duration_secs.max(1),
            default_controllable_by: value.default_controllable_by,
            store_backend: value.store,
            mongo_uri: value.mongo_uri,
            mongo_db: value.mongo_db,
            port: value.port,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "tickIntervalMs": 250, "store": "memory" }"#).unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.update_every_ticks, 5);
        assert_eq!(config.store_timeout, Duration::from_secs(2));
    }

    #[test]
    fn zero_values_are_clamped() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "tickIntervalMs": 0, "updateEveryTicks": 0 }"#).unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.tick_interval, Duration::from_millis(1));
        assert_eq!(config.update_every_ticks, 1);
    }
}
