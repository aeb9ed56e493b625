use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("active slot `{timer_type}` of committee `{committee_id}` is taken")]
    SlotTaken {
        committee_id: String,
        timer_type: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save timer `{id}`")]
    SaveTimer {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("timer `{id}` does not exist")]
    MissingTimer { id: Uuid },
    #[error("failed to load timer `{id}`")]
    LoadTimer {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list timers")]
    ListTimers {
        #[source]
        source: MongoError,
    },
    #[error("stored timer document `{id}` has a malformed identifier")]
    CorruptDocument {
        id: String,
        #[source]
        source: uuid::Error,
    },
}
