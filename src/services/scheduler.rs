//! Single shared sweep keeping running timers current.
//!
//! The scheduler owns an in-memory index of running timers. It holds only a
//! reference to each (id, committee and type); every sweep re-reads the
//! authoritative record from the store and re-evaluates it from absolute
//! timestamps, so nothing is counted per tick.

use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::SystemTime,
};

use dashmap::DashMap;
use futures::future::join_all;
use tokio::{
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{TimerEntity, TimerStatus, TimerType},
    error::ServiceError,
    services::{
        recovery,
        timer_events::{self, EVENT_TIMER_EXPIRED},
    },
    state::{
        SharedState, arithmetic,
        state_machine::{self, TimerCommand},
    },
};

/// Index entry of a running timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTimer {
    pub committee_id: String,
    pub timer_type: TimerType,
}

/// Registry of running timers plus the sweep counter.
#[derive(Default)]
pub struct Scheduler {
    registry: DashMap<Uuid, ScheduledTimer>,
    sweeps: AtomicU64,
    recovery_pending: AtomicBool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the registry in line with a freshly persisted record: running
    /// timers are registered, anything else is dropped.
    pub fn track(&self, timer: &TimerEntity) {
        if timer.status == TimerStatus::Running {
            self.registry.insert(
                timer.id,
                ScheduledTimer {
                    committee_id: timer.committee_id.clone(),
                    timer_type: timer.timer_type,
                },
            );
        } else {
            self.registry.remove(&timer.id);
        }
    }

    /// Stop sweeping a timer. Returns whether it was registered.
    pub fn deregister(&self, id: Uuid) -> bool {
        self.registry.remove(&id).is_some()
    }

    pub fn is_registered(&self, id: Uuid) -> bool {
        self.registry.contains_key(&id)
    }

    pub fn lookup(&self, id: Uuid) -> Option<ScheduledTimer> {
        self.registry.get(&id).map(|entry| entry.value().clone())
    }

    pub fn registered_ids(&self) -> Vec<Uuid> {
        self.registry.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Ask for the registry to be rebuilt from the store before the next sweep.
    pub fn request_recovery(&self) {
        self.recovery_pending.store(true, Ordering::SeqCst);
    }

    pub fn recovery_pending(&self) -> bool {
        self.recovery_pending.load(Ordering::SeqCst)
    }

    /// Clear a pending recovery request, returning whether one was set.
    pub(crate) fn take_recovery_request(&self) -> bool {
        self.recovery_pending.swap(false, Ordering::SeqCst)
    }

    fn next_sweep(&self) -> u64 {
        self.sweeps.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// What one sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Timers looked at.
    pub evaluated: usize,
    pub expired: usize,
    /// Warning events broadcast.
    pub warnings: usize,
    /// `timer-update` events broadcast.
    pub updates: usize,
    /// Timers whose processing failed and will be retried next sweep.
    pub failures: usize,
}

#[derive(Debug, Default)]
struct TimerOutcome {
    expired: bool,
    warnings: usize,
    updated: bool,
}

/// Drive [`sweep`] at the configured cadence until `shutdown` flips to `true`.
pub async fn run(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(state.config().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        tick_ms = state.config().tick_interval.as_millis() as u64,
        update_every_ticks = state.config().update_every_ticks,
        "timer scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sweep(&state).await;
                if report.failures > 0 {
                    warn!(failures = report.failures, evaluated = report.evaluated, "sweep finished with failures");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("timer scheduler stopped");
}

/// Re-evaluate every registered timer once.
///
/// A pending recovery runs first, so timers an incomplete recovery missed are
/// picked up by a later sweep. Timers are processed concurrently and
/// independently: a failure on one is logged and counted, and the timer is
/// simply looked at again next sweep with a fresh `now`.
pub async fn sweep(state: &SharedState) -> SweepReport {
    let sweep_index = state.scheduler().next_sweep();
    let emit_updates = sweep_index % state.config().update_every_ticks == 0;
    let mut report = SweepReport::default();

    if state.is_degraded() {
        debug!(sweep_index, "skipping sweep in degraded mode");
        return report;
    }

    recovery::run_pending(state).await;
    let ids = state.scheduler().registered_ids();
    let outcomes = join_all(
        ids.iter()
            .map(|id| sweep_timer(state, *id, emit_updates)),
    )
    .await;

    for (id, outcome) in ids.into_iter().zip(outcomes) {
        report.evaluated += 1;
        match outcome {
            Ok(outcome) => {
                report.expired += usize::from(outcome.expired);
                report.warnings += outcome.warnings;
                report.updates += usize::from(outcome.updated);
            }
            Err(err) => {
                report.failures += 1;
                if err.is_transient() {
                    warn!(timer_id = %id, error = %err, "failed to sweep timer; retrying next tick");
                } else {
                    error!(timer_id = %id, error = %err, "failed to sweep timer");
                }
            }
        }
    }

    report
}

async fn sweep_timer(
    state: &SharedState,
    id: Uuid,
    emit_update: bool,
) -> Result<TimerOutcome, ServiceError> {
    let _gate = state.lock_timer(id).await;
    // Deregistered while we waited on the gate.
    let Some(entry) = state.scheduler().lookup(id) else {
        return Ok(TimerOutcome::default());
    };

    let Some(mut timer) = state.with_store(move |store| store.find_timer(id)).await? else {
        warn!(
            timer_id = %id,
            committee_id = %entry.committee_id,
            timer_type = %entry.timer_type,
            "registered timer vanished from the store"
        );
        state.scheduler().deregister(id);
        return Ok(TimerOutcome::default());
    };
    if timer.status != TimerStatus::Running {
        state.scheduler().track(&timer);
        return Ok(TimerOutcome::default());
    }

    let now = state.now();
    if arithmetic::is_expired(&timer, now) {
        expire(state, &mut timer, now).await?;
        return Ok(TimerOutcome {
            expired: true,
            ..TimerOutcome::default()
        });
    }

    let remaining = arithmetic::remaining_secs(&timer, now);
    let pending = arithmetic::pending_warnings(&timer, remaining);
    if !pending.is_empty() {
        for threshold in &pending {
            state_machine::mark_warning_fired(&mut timer, *threshold, remaining, now);
        }
        // Persist the fired set first: a failed write leaves the warnings
        // pending for the next sweep, so none is lost or sent twice.
        state
            .with_store(|store| store.replace_timer(timer.clone()))
            .await?;
        for threshold in &pending {
            info!(timer_id = %id, threshold, remaining, "timer warning threshold crossed");
            timer_events::broadcast_warning(state, &timer, *threshold, remaining, now);
        }
    }

    if emit_update {
        timer_events::broadcast_update(state, &timer, now);
    }

    Ok(TimerOutcome {
        expired: false,
        warnings: pending.len(),
        updated: emit_update,
    })
}

async fn expire(
    state: &SharedState,
    timer: &mut TimerEntity,
    now: SystemTime,
) -> Result<(), ServiceError> {
    state_machine::apply(timer, TimerCommand::Expire, now, None)?;
    state
        .with_store(|store| store.replace_timer(timer.clone()))
        .await?;

    state.scheduler().deregister(timer.id);
    info!(
        timer_id = %timer.id,
        committee_id = %timer.committee_id,
        timer_type = %timer.timer_type,
        "timer expired"
    );
    timer_events::broadcast_notice(state, EVENT_TIMER_EXPIRED, timer, now);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, time::Duration};

    use super::*;

    fn running(id: Uuid) -> TimerEntity {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        TimerEntity {
            id,
            committee_id: "c1".into(),
            session_id: "s1".into(),
            timer_type: TimerType::Caucus,
            name: "Caucus".into(),
            total_duration: 60,
            remaining_time: 60,
            count_down: true,
            status: TimerStatus::Running,
            started_at: Some(now),
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

    #[test]
    fn track_registers_only_running_timers() {
        let scheduler = Scheduler::new();
        let id = Uuid::new_v4();
        let mut timer = running(id);

        scheduler.track(&timer);
        assert!(scheduler.is_registered(id));

        timer.status = TimerStatus::Paused;
        scheduler.track(&timer);
        assert!(!scheduler.is_registered(id));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn registry_keeps_only_a_reference() {
        let scheduler = Scheduler::new();
        let id = Uuid::new_v4();
        let timer = running(id);
        scheduler.track(&timer);
        scheduler.track(&timer);

        assert_eq!(scheduler.len(), 1);
        assert_eq!(
            scheduler.lookup(id),
            Some(ScheduledTimer {
                committee_id: "c1".into(),
                timer_type: TimerType::Caucus,
            })
        );
    }

    #[test]
    fn sweep_counter_starts_at_one() {
        let scheduler = Scheduler::new();
        assert_eq!(scheduler.next_sweep(), 1);
        assert_eq!(scheduler.next_sweep(), 2);
    }
}
