use std::{collections::BTreeSet, time::SystemTime};

use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::models::{
        ExtensionRecord, PauseRecord, TimerEntity, TimerEventKind, TimerEventRecord, TimerStatus,
        TimerType,
    },
    state::arithmetic,
};

/// Commands that move a timer through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCommand {
    /// Begin counting from `created`.
    Start,
    /// Freeze a running timer.
    Pause,
    /// Continue a paused timer.
    Resume,
    /// Add time to a running or paused timer.
    Extend {
        additional_seconds: u64,
        reason: Option<String>,
        granted_by: Option<String>,
    },
    /// Manual stop by an operator.
    Complete,
    /// Abandon the timer.
    Cancel { reason: Option<String> },
    /// A countdown reached zero during a sweep.
    Expire,
}

impl TimerCommand {
    /// Short verb used in error messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            TimerCommand::Start => "start",
            TimerCommand::Pause => "pause",
            TimerCommand::Resume => "resume",
            TimerCommand::Extend { .. } => "extend",
            TimerCommand::Complete => "complete",
            TimerCommand::Cancel { .. } => "cancel",
            TimerCommand::Expire => "expire",
        }
    }
}

/// Error returned when a command is not legal from the timer's status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {command} a timer that is {}", .from.as_str())]
pub struct InvalidTransition {
    /// Status the timer was in when the command arrived.
    pub from: TimerStatus,
    /// Name of the rejected command.
    pub command: &'static str,
}

/// Result of a legal command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Fields were mutated and an audit event appended.
    Changed,
    /// The timer had already finished; duplicate stop requests are tolerated.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    To(TimerStatus),
    Stay,
    AlreadyFinished,
}

/// Decide the next status for `command` without touching the timer.
fn compute_transition(
    from: TimerStatus,
    command: &TimerCommand,
) -> Result<Transition, InvalidTransition> {
    let next = match (from, command) {
        (TimerStatus::Created, TimerCommand::Start) => Transition::To(TimerStatus::Running),
        (TimerStatus::Running, TimerCommand::Pause) => Transition::To(TimerStatus::Paused),
        (TimerStatus::Paused, TimerCommand::Resume) => Transition::To(TimerStatus::Running),
        (TimerStatus::Running | TimerStatus::Paused, TimerCommand::Extend { .. }) => {
            Transition::Stay
        }
        (TimerStatus::Running | TimerStatus::Paused, TimerCommand::Complete) => {
            Transition::To(TimerStatus::Completed)
        }
        (_, TimerCommand::Cancel { .. }) if !from.is_terminal() => {
            Transition::To(TimerStatus::Cancelled)
        }
        (TimerStatus::Running, TimerCommand::Expire) => Transition::To(TimerStatus::Expired),
        (
            from,
            TimerCommand::Complete | TimerCommand::Cancel { .. } | TimerCommand::Expire,
        ) if from.is_terminal() => Transition::AlreadyFinished,
        (from, command) => {
            return Err(InvalidTransition {
                from,
                command: command.name(),
            });
        }
    };

    Ok(next)
}

/// Everything needed to build a new timer record.
#[derive(Debug, Clone)]
pub struct NewTimer {
    pub committee_id: String,
    pub session_id: String,
    pub timer_type: TimerType,
    pub name: String,
    pub total_duration: u64,
    pub count_down: bool,
    pub warning_times: Vec<u64>,
    pub controllable_by: Vec<String>,
    pub priority: i32,
}

/// Build a fresh record in `created` status with its creation audit entry.
pub fn create(new_timer: NewTimer, now: SystemTime, actor: Option<&str>) -> TimerEntity {
    let remaining_time = if new_timer.count_down {
        new_timer.total_duration
    } else {
        0
    };

    let mut timer = TimerEntity {
        id: Uuid::new_v4(),
        committee_id: new_timer.committee_id,
        session_id: new_timer.session_id,
        timer_type: new_timer.timer_type,
        name: new_timer.name,
        total_duration: new_timer.total_duration,
        remaining_time,
        count_down: new_timer.count_down,
        status: TimerStatus::Created,
        started_at: None,
        paused_at: None,
        completed_at: None,
        total_paused_ms: 0,
        pause_history: Vec::new(),
        extensions: Vec::new(),
        warning_times: arithmetic::normalize_warning_times(new_timer.warning_times),
        fired_warnings: BTreeSet::new(),
        controllable_by: new_timer.controllable_by,
        priority: new_timer.priority,
        events: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let details = json!({
        "totalDuration": timer.total_duration,
        "countDown": timer.count_down,
    });
    record_event(&mut timer, TimerEventKind::Created, now, actor, details);
    timer
}

/// Apply `command` to `timer` at `now`, mutating its persisted fields.
pub fn apply(
    timer: &mut TimerEntity,
    command: TimerCommand,
    now: SystemTime,
    actor: Option<&str>,
) -> Result<Applied, InvalidTransition> {
    let next = match compute_transition(timer.status, &command)? {
        Transition::AlreadyFinished => return Ok(Applied::Unchanged),
        Transition::Stay => timer.status,
        Transition::To(status) => status,
    };

    match command {
        TimerCommand::Start => {
            timer.started_at = Some(now);
            timer.status = next;
            timer.remaining_time = arithmetic::remaining_secs(timer, now);
            record_event(timer, TimerEventKind::Started, now, actor, json!({}));
        }
        TimerCommand::Pause => {
            timer.paused_at = Some(now);
            timer.status = next;
            timer.remaining_time = arithmetic::remaining_secs(timer, now);
            let details = json!({ "remainingTime": timer.remaining_time });
            record_event(timer, TimerEventKind::Paused, now, actor, details);
        }
        TimerCommand::Resume => {
            let pause_ms = close_open_pause(timer, now);
            timer.status = next;
            timer.remaining_time = arithmetic::remaining_secs(timer, now);
            let details = json!({
                "pauseDurationMs": pause_ms,
                "remainingTime": timer.remaining_time,
            });
            record_event(timer, TimerEventKind::Resumed, now, actor, details);
        }
        TimerCommand::Extend {
            additional_seconds,
            reason,
            granted_by,
        } => {
            timer.total_duration = timer.total_duration.saturating_add(additional_seconds);
            timer.remaining_time = arithmetic::remaining_secs(timer, now);
            let details = json!({
                "addedSeconds": additional_seconds,
                "newTotalDuration": timer.total_duration,
                "reason": reason.clone(),
            });
            timer.extensions.push(ExtensionRecord {
                added_seconds: additional_seconds,
                new_total_duration: timer.total_duration,
                reason,
                granted_by: granted_by.or_else(|| actor.map(str::to_owned)),
                granted_at: now,
            });
            record_event(timer, TimerEventKind::Extended, now, actor, details);
        }
        TimerCommand::Complete => {
            close_open_pause(timer, now);
            finish(timer, next, now, 0);
            record_event(timer, TimerEventKind::Completed, now, actor, json!({}));
        }
        TimerCommand::Cancel { reason } => {
            close_open_pause(timer, now);
            let frozen = if timer.status == TimerStatus::Created {
                timer.remaining_time
            } else {
                arithmetic::remaining_secs(timer, now)
            };
            finish(timer, next, now, frozen);
            record_event(
                timer,
                TimerEventKind::Cancelled,
                now,
                actor,
                json!({ "reason": reason }),
            );
        }
        TimerCommand::Expire => {
            finish(timer, next, now, 0);
            record_event(timer, TimerEventKind::Expired, now, actor, json!({}));
        }
    }

    Ok(Applied::Changed)
}

/// Record that `threshold` fired while `remaining` seconds were left.
///
/// Returns `false` when the threshold had already fired.
pub fn mark_warning_fired(
    timer: &mut TimerEntity,
    threshold: u64,
    remaining: u64,
    now: SystemTime,
) -> bool {
    if !timer.fired_warnings.insert(threshold) {
        return false;
    }
    timer.remaining_time = remaining;
    let details = json!({ "threshold": threshold, "remainingTime": remaining });
    record_event(timer, TimerEventKind::Warning, now, None, details);
    true
}

/// Fold an open pause into the history, returning its length in milliseconds.
fn close_open_pause(timer: &mut TimerEntity, now: SystemTime) -> u64 {
    let Some(paused_at) = timer.paused_at.take() else {
        return 0;
    };
    let duration_ms = arithmetic::millis_between(now, paused_at);
    timer.total_paused_ms = timer.total_paused_ms.saturating_add(duration_ms);
    timer.pause_history.push(PauseRecord {
        paused_at,
        resumed_at: now,
        duration_ms,
    });
    duration_ms
}

fn finish(timer: &mut TimerEntity, status: TimerStatus, now: SystemTime, remaining: u64) {
    timer.status = status;
    timer.remaining_time = remaining;
    timer.completed_at = Some(now);
    timer.paused_at = None;
}

fn record_event(
    timer: &mut TimerEntity,
    kind: TimerEventKind,
    now: SystemTime,
    actor: Option<&str>,
    details: serde_json::Value,
) {
    timer.updated_at = now;
    timer.events.push(TimerEventRecord {
        kind,
        timestamp: now,
        triggered_by: actor.map(str::to_owned),
        details,
    });
}
