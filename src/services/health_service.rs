use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the timer store and report whether the backend is degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    if let Err(err) = state.with_store(|store| store.health_check()).await {
        warn!(error = %err, "storage health check failed");
    }

    let scheduled = state.scheduler().len();
    if state.is_degraded() {
        HealthResponse::degraded(scheduled)
    } else {
        HealthResponse::ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::timer_store::MemoryTimerStore, state::AppState};

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, "degraded");

        state
            .install_timer_store(Arc::new(MemoryTimerStore::new()))
            .await;
        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.scheduled_timers, 0);
    }
}
