use tracing::{error, info, warn};

use crate::{
    dao::models::{TimerFilter, TimerStatus},
    error::ServiceError,
    state::{SharedState, arithmetic},
};

/// Outcome of one recovery pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Running timers handed to the scheduler.
    pub registered: usize,
    /// Listed timers that could not be re-read and were left for a later pass.
    pub skipped: usize,
    /// Timers whose refreshed `remaining_time` could not be written back.
    pub persist_failures: usize,
}

impl RecoveryReport {
    /// Every listed running timer was looked at.
    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }
}

/// Rebuild the scheduler registry from persisted running timers.
///
/// Remaining time is recomputed from the stored `started_at` and pause totals;
/// those fields are never re-based. Paused timers are frozen by construction
/// and are left alone. A timer that cannot be re-read is skipped and counted,
/// the others are still registered.
pub async fn recover(state: &SharedState) -> Result<RecoveryReport, ServiceError> {
    let running = state
        .with_store(|store| store.list_timers(TimerFilter::with_statuses(&[TimerStatus::Running])))
        .await?;

    let mut report = RecoveryReport::default();
    for listed in running {
        let id = listed.id;
        let _gate = state.lock_timer(id).await;

        // A control call may have moved the timer since it was listed.
        let mut timer = match state.with_store(move |store| store.find_timer(id)).await {
            Ok(Some(timer)) => timer,
            Ok(None) => continue,
            Err(err) => {
                report.skipped += 1;
                warn!(timer_id = %id, error = %err, "failed to re-read timer during recovery");
                continue;
            }
        };
        if timer.status != TimerStatus::Running {
            state.scheduler().deregister(id);
            continue;
        }

        timer.remaining_time = arithmetic::remaining_secs(&timer, state.now());
        if let Err(err) = state
            .with_store(|store| store.replace_timer(timer.clone()))
            .await
        {
            report.persist_failures += 1;
            warn!(timer_id = %id, error = %err, "failed to persist recovered remaining time");
        }

        state.scheduler().track(&timer);
        report.registered += 1;
    }

    info!(
        registered = report.registered,
        skipped = report.skipped,
        persist_failures = report.persist_failures,
        "timer recovery finished"
    );
    Ok(report)
}

/// Run a requested recovery pass.
///
/// An incomplete pass or a transient failure leaves the request in place, so
/// the next sweep tries again.
pub async fn run_pending(state: &SharedState) -> Option<RecoveryReport> {
    if !state.scheduler().take_recovery_request() {
        return None;
    }

    match recover(state).await {
        Ok(report) => {
            if !report.is_complete() {
                warn!(skipped = report.skipped, "timer recovery incomplete; retrying next sweep");
                state.scheduler().request_recovery();
            }
            Some(report)
        }
        Err(err) if err.is_transient() => {
            warn!(error = %err, "timer recovery failed; retrying next sweep");
            state.scheduler().request_recovery();
            None
        }
        Err(err) => {
            error!(error = %err, "timer recovery failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::timer_store::MemoryTimerStore,
        state::AppState,
    };

    #[tokio::test]
    async fn nothing_runs_without_a_request() {
        let state = AppState::new(AppConfig::default());
        state
            .install_timer_store(Arc::new(MemoryTimerStore::new()))
            .await;

        assert_eq!(run_pending(&state).await, None);

        state.scheduler().request_recovery();
        assert_eq!(run_pending(&state).await, Some(RecoveryReport::default()));
        assert!(!state.scheduler().recovery_pending());
    }

    #[tokio::test]
    async fn transient_failure_keeps_the_request() {
        // Degraded until a store is installed.
        let state = AppState::new(AppConfig::default());
        state.scheduler().request_recovery();

        assert_eq!(run_pending(&state).await, None);
        assert!(state.scheduler().recovery_pending());
    }
}
