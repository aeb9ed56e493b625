//! Reaching the timer database.

use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};
use crate::config::AppConfig;

const DEFAULT_DATABASE_NAME: &str = "session_timer";
const APP_NAME: &str = "session-timer-back";
/// Pings per connection; the storage supervisor retries past that.
const PING_ATTEMPTS: u32 = 3;

/// Where the timers live and how long any round trip may take.
#[derive(Clone)]
pub struct TimerDbTarget {
    options: ClientOptions,
    database_name: String,
    round_trip: Duration,
}

impl TimerDbTarget {
    /// Resolve the MongoDB URI and database from the application config.
    ///
    /// Server selection is bounded by the store timeout, so a dead server
    /// fails a call as fast as the engine gives up on it.
    pub async fn from_app_config(config: &AppConfig) -> MongoResult<Self> {
        let mut options = ClientOptions::parse(&config.mongo_uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: config.mongo_uri.clone(),
                source,
            })?;
        options.server_selection_timeout = Some(config.store_timeout);
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());

        Ok(Self {
            options,
            database_name: config
                .mongo_db
                .clone()
                .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_owned()),
            round_trip: config.store_timeout,
        })
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Build a client and wait for the database to answer a ping.
    pub async fn open(&self) -> MongoResult<(Client, Database)> {
        let client = Client::with_options(self.options.clone())
            .map_err(|source| MongoDaoError::ClientConstruction { source })?;
        let database = client.database(&self.database_name);

        let mut attempt = 1;
        loop {
            let Err(source) = database.run_command(doc! { "ping": 1 }).await else {
                return Ok((client, database));
            };
            if attempt == PING_ATTEMPTS {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source,
                });
            }
            debug!(
                attempt,
                database = %self.database_name,
                error = %source,
                "timer database did not answer; retrying"
            );
            sleep(self.round_trip * 2u32.pow(attempt - 1)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn target_follows_the_app_config() {
        let config = AppConfig {
            mongo_uri: "mongodb://localhost:27017".into(),
            mongo_db: None,
            store_timeout: Duration::from_millis(750),
            ..AppConfig::default()
        };

        let target = TimerDbTarget::from_app_config(&config).await.unwrap();
        assert_eq!(target.database_name(), DEFAULT_DATABASE_NAME);
        assert_eq!(
            target.options.server_selection_timeout,
            Some(Duration::from_millis(750))
        );
        assert_eq!(target.options.app_name.as_deref(), Some(APP_NAME));
    }

    #[tokio::test]
    async fn malformed_uri_is_rejected() {
        let config = AppConfig {
            mongo_uri: "not-a-uri".into(),
            ..AppConfig::default()
        };

        assert!(matches!(
            TimerDbTarget::from_app_config(&config).await,
            Err(MongoDaoError::InvalidUri { .. })
        ));
    }
}
