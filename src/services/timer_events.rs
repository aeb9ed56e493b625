use std::time::SystemTime;

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    dao::models::TimerEntity,
    dto::{
        sse::{
            ServerEvent, TimerCancelledEvent, TimerExtendedEvent, TimerNotice,
            TimerRemainingEvent, TimerUpdateEvent, TimerWarningEvent,
        },
        timer::TimerView,
    },
    state::{SharedState, arithmetic},
};

pub const EVENT_TIMER_CREATED: &str = "timer-created";
pub const EVENT_TIMER_STARTED: &str = "timer-started";
pub const EVENT_TIMER_PAUSED: &str = "timer-paused";
pub const EVENT_TIMER_RESUMED: &str = "timer-resumed";
pub const EVENT_TIMER_EXTENDED: &str = "timer-extended";
pub const EVENT_TIMER_COMPLETED: &str = "timer-completed";
pub const EVENT_TIMER_CANCELLED: &str = "timer-cancelled";
pub const EVENT_TIMER_EXPIRED: &str = "timer-expired";
pub const EVENT_TIMER_WARNING: &str = "timer-warning";
pub const EVENT_TIMER_UPDATE: &str = "timer-update";

/// Broadcast a lifecycle event whose payload is only the timer view.
pub fn broadcast_notice(state: &SharedState, event: &str, timer: &TimerEntity, now: SystemTime) {
    let payload = TimerNotice {
        timer: TimerView::at(timer, now),
    };
    send_room_event(state, &timer.committee_id, event, &payload);
}

/// Broadcast `timer-paused` or `timer-resumed` with the frozen remaining time.
pub fn broadcast_remaining(state: &SharedState, event: &str, timer: &TimerEntity, now: SystemTime) {
    let view = TimerView::at(timer, now);
    let payload = TimerRemainingEvent {
        remaining_time: view.remaining_time,
        timer: view,
    };
    send_room_event(state, &timer.committee_id, event, &payload);
}

/// Broadcast that time was added to a timer.
pub fn broadcast_extended(
    state: &SharedState,
    timer: &TimerEntity,
    added_time: u64,
    reason: Option<String>,
    now: SystemTime,
) {
    let payload = TimerExtendedEvent {
        timer: TimerView::at(timer, now),
        added_time,
        new_total_duration: timer.total_duration,
        reason,
    };
    send_room_event(state, &timer.committee_id, EVENT_TIMER_EXTENDED, &payload);
}

/// Broadcast that a timer was abandoned.
pub fn broadcast_cancelled(
    state: &SharedState,
    timer: &TimerEntity,
    reason: Option<String>,
    now: SystemTime,
) {
    let payload = TimerCancelledEvent {
        timer: TimerView::at(timer, now),
        reason,
    };
    send_room_event(state, &timer.committee_id, EVENT_TIMER_CANCELLED, &payload);
}

/// Broadcast a crossed warning threshold.
pub fn broadcast_warning(
    state: &SharedState,
    timer: &TimerEntity,
    threshold: u64,
    remaining_time: u64,
    now: SystemTime,
) {
    let payload = TimerWarningEvent {
        timer: TimerView::at(timer, now),
        threshold,
        remaining_time,
    };
    send_room_event(state, &timer.committee_id, EVENT_TIMER_WARNING, &payload);
}

/// Broadcast the periodic display refresh of a running timer.
pub fn broadcast_update(state: &SharedState, timer: &TimerEntity, now: SystemTime) {
    let remaining_time = arithmetic::remaining_secs(timer, now);
    let payload = TimerUpdateEvent {
        timer_id: timer.id,
        timer_type: timer.timer_type,
        remaining_time,
        display_time: arithmetic::display_time(remaining_time),
        progress_percentage: arithmetic::progress_percentage(timer, now),
    };
    send_room_event(state, &timer.committee_id, EVENT_TIMER_UPDATE, &payload);
}

fn send_room_event(state: &SharedState, committee_id: &str, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => {
            let delivered = state.rooms().publish(committee_id, message);
            debug!(committee_id, event, delivered, "room event published");
        }
        Err(err) => warn!(committee_id, event, error = %err, "failed to serialize room event"),
    }
}
