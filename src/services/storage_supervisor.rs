//! Background supervision of the timer store connection.
//!
//! The service stays in degraded mode while no healthy store is available.
//! Every time a store becomes usable again the scheduler registry is rebuilt
//! from it, so running timers keep their true elapsed time across outages.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{storage::StorageError, timer_store::TimerStore},
    services::recovery,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Exponential backoff between connection attempts.
struct Backoff {
    delay: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            delay: INITIAL_DELAY,
        }
    }

    async fn wait(&mut self) {
        sleep(self.delay).await;
        self.delay = (self.delay * 2).min(MAX_DELAY);
    }

    fn reset(&mut self) {
        self.delay = INITIAL_DELAY;
    }
}

/// Install a store and rebuild the scheduler registry from it.
pub async fn install(state: &SharedState, store: Arc<dyn TimerStore>) {
    state.install_timer_store(store).await;
    resync(state).await;
}

/// Request a recovery pass and run it right away; the scheduler retries it
/// on later sweeps until it completes.
async fn resync(state: &SharedState) {
    state.scheduler().request_recovery();
    recovery::run_pending(state).await;
}

/// Connect to the storage backend, then keep it healthy for as long as the process runs.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn TimerStore>, StorageError>> + Send,
{
    let mut backoff = Backoff::new();

    loop {
        match connect().await {
            Ok(store) => {
                install(&state, store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                backoff.reset();

                supervise(&state, store.as_ref()).await;
                warn!("exhausted storage reconnect attempts; dropping the store");
                state.clear_timer_store().await;
            }
            Err(err) => warn!(error = %err, "storage connection attempt failed"),
        }
        backoff.wait().await;
    }
}

/// Poll the store's health until it cannot be brought back.
async fn supervise(state: &SharedState, store: &dyn TimerStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {}
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                if !reconnect(state, store).await {
                    return;
                }
            }
        }

        if state.is_degraded() {
            info!("storage healthy again; leaving degraded mode");
            state.update_degraded(false);
            resync(state).await;
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

/// Try to re-establish the store's connection; degraded mode starts after the first failure.
async fn reconnect(state: &SharedState, store: &dyn TimerStore) -> bool {
    let mut backoff = Backoff::new();

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "storage reconnect failed; entering degraded mode");
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                backoff.wait().await;
            }
        }
    }

    false
}
