pub mod arithmetic;
pub mod clock;
pub mod rooms;
pub mod state_machine;

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, watch};
use tokio::time::timeout;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{storage::StorageResult, timer_store::TimerStore},
    error::ServiceError,
    services::scheduler::Scheduler,
};

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::rooms::RoomHub;

pub type SharedState = Arc<AppState>;

/// Exclusive hold on one timer.
///
/// On drop the gate leaves the map unless another caller still holds a
/// handle to it, so ids that are named once do not pile up.
pub struct TimerGate<'a> {
    gates: &'a DashMap<Uuid, Arc<Mutex<()>>>,
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TimerGate<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.gates
            .remove_if(&self.id, |_, gate| Arc::strong_count(gate) == 1);
    }
}

/// Central application state: store handle, broadcast rooms, scheduler registry and
/// the per-timer gates that serialize control operations.
pub struct AppState {
    timer_store: RwLock<Option<Arc<dyn TimerStore>>>,
    degraded: watch::Sender<bool>,
    rooms: RoomHub,
    scheduler: Scheduler,
    gates: DashMap<Uuid, Arc<Mutex<()>>>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
}

impl AppState {
    /// Construct the state on the wall clock.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Construct the state with an explicit time source.
    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            timer_store: RwLock::new(None),
            degraded: degraded_tx,
            rooms: RoomHub::new(config.room_capacity),
            scheduler: Scheduler::new(),
            gates: DashMap::new(),
            clock,
            config,
        })
    }

    /// Obtain a handle to the current timer store, if one is installed.
    pub async fn timer_store(&self) -> Option<Arc<dyn TimerStore>> {
        let guard = self.timer_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new timer store implementation and leave degraded mode.
    pub async fn install_timer_store(&self, store: Arc<dyn TimerStore>) {
        {
            let mut guard = self.timer_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current timer store and enter degraded mode.
    pub async fn clear_timer_store(&self) {
        {
            let mut guard = self.timer_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag, notifying watchers only when it changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Committee broadcast rooms.
    pub fn rooms(&self) -> &RoomHub {
        &self.rooms
    }

    /// Registry of timers the sweep is responsible for.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current instant according to the configured clock.
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Acquire the gate serializing every mutation of one timer.
    pub async fn lock_timer(&self, id: Uuid) -> TimerGate<'_> {
        let gate = self
            .gates
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        TimerGate {
            gates: &self.gates,
            id,
            guard: Some(gate.lock_owned().await),
        }
    }

    /// Gates currently held or waited on.
    pub(crate) fn open_gates(&self) -> usize {
        self.gates.len()
    }

    /// Run one store call bounded by the configured store timeout.
    pub async fn with_store<T, F>(&self, call: F) -> Result<T, ServiceError>
    where
        F: FnOnce(Arc<dyn TimerStore>) -> BoxFuture<'static, StorageResult<T>>,
    {
        let store = self.require_store().await?;
        match timeout(self.config.store_timeout, call(store)).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => Err(ServiceError::Timeout),
        }
    }

    async fn require_store(&self) -> Result<Arc<dyn TimerStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.timer_store().await.ok_or(ServiceError::Degraded)
    }
}
