//! Control operations on timers.
//!
//! Every mutation runs under the timer's gate: load from the store, apply the
//! state machine, persist, then sync the scheduler registry and broadcast. The
//! `(committee, type)` slot is enforced by the store itself, so concurrent
//! creates race on the insert and the loser gets a conflict.

use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ACTIVE_STATUSES, TimerEntity, TimerFilter},
    dto::timer::{
        CancelTimerRequest, CreateTimerRequest, ExtendTimerRequest, TimerEventView, TimerView,
    },
    error::ServiceError,
    services::timer_events::{
        self, EVENT_TIMER_COMPLETED, EVENT_TIMER_CREATED, EVENT_TIMER_PAUSED,
        EVENT_TIMER_RESUMED, EVENT_TIMER_STARTED,
    },
    state::{
        SharedState,
        state_machine::{self, Applied, NewTimer, TimerCommand},
    },
};

/// Create a timer, optionally starting it in the same write.
pub async fn create_timer(
    state: &SharedState,
    request: CreateTimerRequest,
    actor: Option<&str>,
) -> Result<TimerView, ServiceError> {
    request.validate()?;
    let max_duration = state.config().max_duration_secs;
    if request.total_duration > max_duration {
        return Err(ServiceError::InvalidInput(format!(
            "totalDuration must not exceed {max_duration} seconds"
        )));
    }

    let now = state.now();
    let new_timer = NewTimer {
        name: request
            .name
            .unwrap_or_else(|| request.timer_type.default_label().to_owned()),
        committee_id: request.committee_id,
        session_id: request.session_id,
        timer_type: request.timer_type,
        total_duration: request.total_duration,
        count_down: request.count_down,
        warning_times: request.warning_times,
        controllable_by: request
            .controllable_by
            .unwrap_or_else(|| state.config().default_controllable_by.clone()),
        priority: request.priority,
    };

    let mut timer = state_machine::create(new_timer, now, actor);
    let _gate = state.lock_timer(timer.id).await;
    if request.auto_start {
        state_machine::apply(&mut timer, TimerCommand::Start, now, actor)?;
    }

    state
        .with_store(|store| store.insert_timer(timer.clone()))
        .await?;
    state.scheduler().track(&timer);

    info!(
        timer_id = %timer.id,
        committee_id = %timer.committee_id,
        timer_type = %timer.timer_type,
        auto_start = request.auto_start,
        "timer created"
    );
    timer_events::broadcast_notice(state, EVENT_TIMER_CREATED, &timer, now);
    if request.auto_start {
        timer_events::broadcast_notice(state, EVENT_TIMER_STARTED, &timer, now);
    }

    Ok(TimerView::at(&timer, now))
}

/// Begin counting a `created` timer.
pub async fn start_timer(
    state: &SharedState,
    id: Uuid,
    actor: Option<&str>,
) -> Result<TimerView, ServiceError> {
    let (timer, applied, now) = transition(state, id, TimerCommand::Start, actor).await?;
    if applied == Applied::Changed {
        timer_events::broadcast_notice(state, EVENT_TIMER_STARTED, &timer, now);
    }
    Ok(TimerView::at(&timer, now))
}

/// Freeze a running timer.
pub async fn pause_timer(
    state: &SharedState,
    id: Uuid,
    actor: Option<&str>,
) -> Result<TimerView, ServiceError> {
    let (timer, applied, now) = transition(state, id, TimerCommand::Pause, actor).await?;
    if applied == Applied::Changed {
        timer_events::broadcast_remaining(state, EVENT_TIMER_PAUSED, &timer, now);
    }
    Ok(TimerView::at(&timer, now))
}

/// Continue a paused timer from where it stopped.
pub async fn resume_timer(
    state: &SharedState,
    id: Uuid,
    actor: Option<&str>,
) -> Result<TimerView, ServiceError> {
    let (timer, applied, now) = transition(state, id, TimerCommand::Resume, actor).await?;
    if applied == Applied::Changed {
        timer_events::broadcast_remaining(state, EVENT_TIMER_RESUMED, &timer, now);
    }
    Ok(TimerView::at(&timer, now))
}

/// Add time to a running or paused timer.
pub async fn extend_timer(
    state: &SharedState,
    id: Uuid,
    request: ExtendTimerRequest,
    actor: Option<&str>,
) -> Result<TimerView, ServiceError> {
    request.validate()?;
    let ExtendTimerRequest {
        additional_seconds,
        reason,
        granted_by,
    } = request;

    let command = TimerCommand::Extend {
        additional_seconds,
        reason: reason.clone(),
        granted_by,
    };
    let (timer, applied, now) = transition(state, id, command, actor).await?;
    if applied == Applied::Changed {
        timer_events::broadcast_extended(state, &timer, additional_seconds, reason, now);
    }
    Ok(TimerView::at(&timer, now))
}

/// Stop a timer by hand. Completing a finished timer returns it unchanged.
pub async fn complete_timer(
    state: &SharedState,
    id: Uuid,
    actor: Option<&str>,
) -> Result<TimerView, ServiceError> {
    let (timer, applied, now) = transition(state, id, TimerCommand::Complete, actor).await?;
    if applied == Applied::Changed {
        timer_events::broadcast_notice(state, EVENT_TIMER_COMPLETED, &timer, now);
    }
    Ok(TimerView::at(&timer, now))
}

/// Abandon a timer. Cancelling a finished timer returns it unchanged.
pub async fn cancel_timer(
    state: &SharedState,
    id: Uuid,
    request: CancelTimerRequest,
    actor: Option<&str>,
) -> Result<TimerView, ServiceError> {
    request.validate()?;
    let reason = request.reason;
    let command = TimerCommand::Cancel {
        reason: reason.clone(),
    };
    let (timer, applied, now) = transition(state, id, command, actor).await?;
    if applied == Applied::Changed {
        timer_events::broadcast_cancelled(state, &timer, reason, now);
    }
    Ok(TimerView::at(&timer, now))
}

/// Current view of a timer, recomputed at call time.
pub async fn get_timer(state: &SharedState, id: Uuid) -> Result<TimerView, ServiceError> {
    let timer = load_timer(state, id).await?;
    Ok(TimerView::at(&timer, state.now()))
}

/// Audit log of a timer, oldest first.
pub async fn timer_events(
    state: &SharedState,
    id: Uuid,
) -> Result<Vec<TimerEventView>, ServiceError> {
    let timer = load_timer(state, id).await?;
    Ok(timer.events.iter().map(TimerEventView::from).collect())
}

/// Non-terminal timers of a committee, highest priority first.
pub async fn list_committee_timers(
    state: &SharedState,
    committee_id: &str,
) -> Result<Vec<TimerView>, ServiceError> {
    let filter = TimerFilter {
        committee_id: Some(committee_id.to_owned()),
        ..TimerFilter::with_statuses(&ACTIVE_STATUSES)
    };
    list_active(state, filter).await
}

/// Non-terminal timers of a session, highest priority first.
pub async fn list_session_timers(
    state: &SharedState,
    session_id: &str,
) -> Result<Vec<TimerView>, ServiceError> {
    let filter = TimerFilter {
        session_id: Some(session_id.to_owned()),
        ..TimerFilter::with_statuses(&ACTIVE_STATUSES)
    };
    list_active(state, filter).await
}

async fn list_active(
    state: &SharedState,
    filter: TimerFilter,
) -> Result<Vec<TimerView>, ServiceError> {
    let mut timers = state
        .with_store(|store| store.list_timers(filter))
        .await?;
    // Stable, so equal priorities keep the store's creation order.
    timers.sort_by(|a, b| b.priority.cmp(&a.priority));

    let now = state.now();
    Ok(timers
        .iter()
        .map(|timer| TimerView::at(timer, now))
        .collect())
}

async fn load_timer(state: &SharedState, id: Uuid) -> Result<TimerEntity, ServiceError> {
    state
        .with_store(move |store| store.find_timer(id))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("timer `{id}` not found")))
}

/// Apply one command under the timer's gate and persist the result.
///
/// When this returns, the scheduler registry already reflects the new status:
/// a completed or cancelled timer gets no further sweep.
async fn transition(
    state: &SharedState,
    id: Uuid,
    command: TimerCommand,
    actor: Option<&str>,
) -> Result<(TimerEntity, Applied, SystemTime), ServiceError> {
    let _gate = state.lock_timer(id).await;
    let mut timer = load_timer(state, id).await?;
    let command_name = command.name();
    let extends = matches!(command, TimerCommand::Extend { .. });

    let now = state.now();
    let applied = state_machine::apply(&mut timer, command, now, actor)?;
    let max_duration = state.config().max_duration_secs;
    if extends && timer.total_duration > max_duration {
        return Err(ServiceError::InvalidInput(format!(
            "extension would push totalDuration past {max_duration} seconds"
        )));
    }
    if applied == Applied::Changed {
        state
            .with_store(|store| store.replace_timer(timer.clone()))
            .await?;
        info!(
            timer_id = %id,
            committee_id = %timer.committee_id,
            command = command_name,
            status = timer.status.as_str(),
            "timer updated"
        );
    }

    state.scheduler().track(&timer);
    Ok((timer, applied, now))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::TimerType, timer_store::MemoryTimerStore},
        state::AppState,
    };

    async fn state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_timer_store(Arc::new(MemoryTimerStore::new()))
            .await;
        state
    }

    fn speaker(committee: &str) -> CreateTimerRequest {
        CreateTimerRequest {
            committee_id: committee.into(),
            session_id: "s1".into(),
            timer_type: TimerType::Speaker,
            name: None,
            total_duration: 60,
            count_down: true,
            warning_times: Vec::new(),
            controllable_by: None,
            priority: 0,
            auto_start: true,
        }
    }

    #[tokio::test]
    async fn unknown_ids_leave_no_gate_behind() {
        let state = state().await;
        for _ in 0..1_000 {
            let err = pause_timer(&state, Uuid::new_v4(), None).await.unwrap_err();
            assert!(matches!(err, ServiceError::NotFound(_)));
        }
        assert_eq!(state.open_gates(), 0);
    }

    #[tokio::test]
    async fn rejected_creates_leave_no_gate_behind() {
        let state = state().await;
        let id = create_timer(&state, speaker("c1"), None).await.unwrap().id;
        for _ in 0..10 {
            let err = create_timer(&state, speaker("c1"), None).await.unwrap_err();
            assert!(matches!(err, ServiceError::Conflict(_)));
        }
        pause_timer(&state, id, None).await.unwrap();
        cancel_timer(&state, id, CancelTimerRequest::default(), None)
            .await
            .unwrap();
        assert_eq!(state.open_gates(), 0);
    }
}
