use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{TimerEntity, TimerFilter},
    storage::{StorageError, StorageResult},
    timer_store::TimerStore,
};

#[derive(Debug, thiserror::Error)]
enum MemoryStoreError {
    #[error("injected in-memory store failure")]
    Injected,
    #[error("timer `{0}` already exists")]
    Duplicate(Uuid),
    #[error("timer `{0}` does not exist")]
    Missing(Uuid),
}

/// Process-local timer store.
///
/// The slot check and the write happen under one lock, which gives the same
/// atomicity the MongoDB partial unique index provides.
#[derive(Clone, Default)]
pub struct MemoryTimerStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    timers: Mutex<HashMap<Uuid, TimerEntity>>,
    failing_writes: AtomicUsize,
}

impl MemoryTimerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with [`StorageError::Unavailable`].
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.failing_writes.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> StorageResult<()> {
        let consumed = self
            .inner
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        match consumed {
            Ok(_) => Err(StorageError::unavailable(
                "in-memory write failed".into(),
                MemoryStoreError::Injected,
            )),
            Err(_) => Ok(()),
        }
    }

    fn write(&self, timer: TimerEntity, must_exist: bool) -> StorageResult<()> {
        self.take_injected_failure()?;

        let mut timers = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match (must_exist, timers.contains_key(&timer.id)) {
            (true, false) => {
                let source = MemoryStoreError::Missing(timer.id);
                return Err(StorageError::unavailable(source.to_string(), source));
            }
            (false, true) => {
                let source = MemoryStoreError::Duplicate(timer.id);
                return Err(StorageError::unavailable(source.to_string(), source));
            }
            _ => {}
        }

        if timer.is_active() {
            let occupied = timers.values().any(|other| {
                other.id != timer.id
                    && other.is_active()
                    && other.committee_id == timer.committee_id
                    && other.timer_type == timer.timer_type
            });
            if occupied {
                return Err(StorageError::conflict(
                    timer.committee_id,
                    timer.timer_type.as_str(),
                ));
            }
        }

        timers.insert(timer.id, timer);
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<Uuid, TimerEntity>) -> T) -> T {
        let timers = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&timers)
    }
}

impl TimerStore for MemoryTimerStore {
    fn insert_timer(&self, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.write(timer, false);
        Box::pin(async move { result })
    }

    fn replace_timer(&self, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.write(timer, true);
        Box::pin(async move { result })
    }

    fn find_timer(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TimerEntity>>> {
        let found = self.read(|timers| timers.get(&id).cloned());
        Box::pin(async move { Ok(found) })
    }

    fn list_timers(
        &self,
        filter: TimerFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<TimerEntity>>> {
        let mut found: Vec<TimerEntity> = self.read(|timers| {
            timers
                .values()
                .filter(|timer| filter.matches(timer))
                .cloned()
                .collect()
        });
        found.sort_by_key(|timer| (timer.created_at, timer.id));
        Box::pin(async move { Ok(found) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, time::SystemTime};

    use super::*;
    use crate::dao::models::{TimerStatus, TimerType};

    fn timer(committee: &str, kind: TimerType, status: TimerStatus) -> TimerEntity {
        let now = SystemTime::now();
        TimerEntity {
            id: Uuid::new_v4(),
            committee_id: committee.into(),
            session_id: "session-1".into(),
            timer_type: kind,
            name: kind.default_label().into(),
            total_duration: 60,
            remaining_time: 60,
            count_down: true,
            status,
            started_at: None,
            paused_at: None,
            completed_at: None,
            total_paused_ms: 0,
            pause_history: Vec::new(),
            extensions: Vec::new(),
            warning_times: Vec::new(),
            fired_warnings: BTreeSet::new(),
            controllable_by: Vec::new(),
            priority: 0,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn second_active_timer_in_slot_conflicts() {
        let store = MemoryTimerStore::new();
        store
            .insert_timer(timer("c1", TimerType::Speaker, TimerStatus::Running))
            .await
            .unwrap();

        let err = store
            .insert_timer(timer("c1", TimerType::Speaker, TimerStatus::Created))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        // Other committees and other types are independent.
        store
            .insert_timer(timer("c2", TimerType::Speaker, TimerStatus::Running))
            .await
            .unwrap();
        store
            .insert_timer(timer("c1", TimerType::Caucus, TimerStatus::Running))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn terminal_timer_frees_the_slot() {
        let store = MemoryTimerStore::new();
        let mut first = timer("c1", TimerType::Speaker, TimerStatus::Running);
        store.insert_timer(first.clone()).await.unwrap();

        first.status = TimerStatus::Completed;
        store.replace_timer(first).await.unwrap();

        store
            .insert_timer(timer("c1", TimerType::Speaker, TimerStatus::Created))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryTimerStore::new();
        store.fail_next_writes(1);
        let entity = timer("c1", TimerType::Session, TimerStatus::Created);

        assert!(matches!(
            store.insert_timer(entity.clone()).await,
            Err(StorageError::Unavailable { .. })
        ));
        store.insert_timer(entity.clone()).await.unwrap();
        assert_eq!(store.find_timer(entity.id).await.unwrap(), Some(entity));
    }

    #[tokio::test]
    async fn list_filters_by_committee_and_status() {
        let store = MemoryTimerStore::new();
        store
            .insert_timer(timer("c1", TimerType::Session, TimerStatus::Running))
            .await
            .unwrap();
        store
            .insert_timer(timer("c1", TimerType::Speaker, TimerStatus::Cancelled))
            .await
            .unwrap();
        store
            .insert_timer(timer("c2", TimerType::Session, TimerStatus::Running))
            .await
            .unwrap();

        let filter = TimerFilter {
            committee_id: Some("c1".into()),
            statuses: vec![TimerStatus::Running],
            ..TimerFilter::default()
        };
        let found = store.list_timers(filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].timer_type, TimerType::Session);
    }
}
