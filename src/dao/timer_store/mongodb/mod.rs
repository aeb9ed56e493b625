mod connection;
mod error;
mod models;
pub mod store;

pub use connection::TimerDbTarget;
pub use error::MongoDaoError;
pub use store::MongoTimerStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::SlotTaken {
                committee_id,
                timer_type,
                ..
            } => StorageError::conflict(committee_id, timer_type),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
