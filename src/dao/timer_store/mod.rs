pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{TimerEntity, TimerFilter};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use memory::MemoryTimerStore;

/// Abstraction over the persistence layer for timers.
///
/// Implementations must enforce the `(committee_id, timer_type)` uniqueness
/// slot atomically: inserting or replacing a record whose status is
/// non-terminal fails with [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict)
/// when another non-terminal record already holds that slot.
pub trait TimerStore: Send + Sync {
    fn insert_timer(&self, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn replace_timer(&self, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_timer(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TimerEntity>>>;
    fn list_timers(&self, filter: TimerFilter)
    -> BoxFuture<'static, StorageResult<Vec<TimerEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
