//! Request and response shapes of the timer control surface.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    dao::models::{
        ExtensionRecord, PauseRecord, TimerEntity, TimerEventKind, TimerEventRecord, TimerStatus,
        TimerType,
    },
    dto::format_system_time,
    state::arithmetic,
};

const MAX_NAME_LENGTH: u64 = 120;
const MAX_REASON_LENGTH: u64 = 500;

fn default_count_down() -> bool {
    true
}

/// Payload used to create a timer in a committee.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_thresholds_within_duration"))]
pub struct CreateTimerRequest {
    #[validate(length(min = 1))]
    pub committee_id: String,
    #[validate(length(min = 1))]
    pub session_id: String,
    pub timer_type: TimerType,
    /// Display label; defaults to the timer type label.
    #[serde(default)]
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub name: Option<String>,
    /// Duration in seconds.
    #[validate(range(min = 1))]
    pub total_duration: u64,
    #[serde(default = "default_count_down")]
    pub count_down: bool,
    /// Remaining-time thresholds, in seconds, that trigger a `timer-warning`.
    #[serde(default)]
    #[validate(custom(function = "validate_warning_times"))]
    pub warning_times: Vec<u64>,
    /// Roles allowed to drive the timer; recorded as-is.
    #[serde(default)]
    pub controllable_by: Option<Vec<String>>,
    #[serde(default)]
    pub priority: i32,
    /// Start the timer right after creating it.
    #[serde(default)]
    pub auto_start: bool,
}

fn validate_warning_times(thresholds: &Vec<u64>) -> Result<(), ValidationError> {
    if thresholds.contains(&0) {
        let mut err = ValidationError::new("warning_time_zero");
        err.message = Some("Warning thresholds must be at least one second".into());
        return Err(err);
    }
    Ok(())
}

fn validate_thresholds_within_duration(request: &CreateTimerRequest) -> Result<(), ValidationError> {
    if !request.count_down && !request.warning_times.is_empty() {
        let mut err = ValidationError::new("warning_times_count_up");
        err.message = Some("Count-up timers do not support warning thresholds".into());
        return Err(err);
    }
    if let Some(threshold) = request
        .warning_times
        .iter()
        .find(|threshold| **threshold >= request.total_duration)
    {
        let mut err = ValidationError::new("warning_time_too_large");
        err.message = Some(
            format!(
                "Warning threshold {threshold}s must be shorter than the {}s duration",
                request.total_duration
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Request to add time to a running or paused timer.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExtendTimerRequest {
    #[validate(range(min = 1))]
    pub additional_seconds: u64,
    #[serde(default)]
    #[validate(length(max = MAX_REASON_LENGTH))]
    pub reason: Option<String>,
    #[serde(default)]
    pub granted_by: Option<String>,
}

/// Request to cancel a timer.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
pub struct CancelTimerRequest {
    #[serde(default)]
    #[validate(length(max = MAX_REASON_LENGTH))]
    pub reason: Option<String>,
}

/// Closed pause interval as exposed to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PauseView {
    pub paused_at: String,
    pub resumed_at: String,
    /// Whole seconds spent paused.
    pub duration: u64,
    pub duration_ms: u64,
}

impl From<&PauseRecord> for PauseView {
    fn from(record: &PauseRecord) -> Self {
        Self {
            paused_at: format_system_time(record.paused_at),
            resumed_at: format_system_time(record.resumed_at),
            duration: record.duration_ms / 1_000,
            duration_ms: record.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionView {
    pub added_seconds: u64,
    pub new_total_duration: u64,
    pub reason: Option<String>,
    pub granted_by: Option<String>,
    pub granted_at: String,
}

impl From<&ExtensionRecord> for ExtensionView {
    fn from(record: &ExtensionRecord) -> Self {
        Self {
            added_seconds: record.added_seconds,
            new_total_duration: record.new_total_duration,
            reason: record.reason.clone(),
            granted_by: record.granted_by.clone(),
            granted_at: format_system_time(record.granted_at),
        }
    }
}

/// Audit log entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerEventView {
    pub kind: TimerEventKind,
    pub timestamp: String,
    pub triggered_by: Option<String>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
}

impl From<&TimerEventRecord> for TimerEventView {
    fn from(record: &TimerEventRecord) -> Self {
        Self {
            kind: record.kind,
            timestamp: format_system_time(record.timestamp),
            triggered_by: record.triggered_by.clone(),
            details: record.details.clone(),
        }
    }
}

/// Authoritative view of a timer, recomputed at the instant it is built.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub id: Uuid,
    pub committee_id: String,
    pub session_id: String,
    pub timer_type: TimerType,
    pub name: String,
    pub status: TimerStatus,
    pub total_duration: u64,
    /// Seconds left for a countdown, seconds elapsed for a count-up.
    pub remaining_time: u64,
    pub display_time: String,
    pub progress_percentage: f64,
    pub count_down: bool,
    pub warning_times: Vec<u64>,
    pub fired_warnings: Vec<u64>,
    pub controllable_by: Vec<String>,
    pub priority: i32,
    pub started_at: Option<String>,
    pub paused_at: Option<String>,
    pub completed_at: Option<String>,
    /// Whole seconds spent in closed pauses.
    pub total_paused_time: u64,
    pub pause_history: Vec<PauseView>,
    pub extensions: Vec<ExtensionView>,
    pub created_at: String,
    pub updated_at: String,
}

impl TimerView {
    /// Project a record, computing time-dependent fields at `now`.
    pub fn at(timer: &TimerEntity, now: SystemTime) -> Self {
        let remaining_time = arithmetic::remaining_secs(timer, now);
        Self {
            id: timer.id,
            committee_id: timer.committee_id.clone(),
            session_id: timer.session_id.clone(),
            timer_type: timer.timer_type,
            name: timer.name.clone(),
            status: timer.status,
            total_duration: timer.total_duration,
            remaining_time,
            display_time: arithmetic::display_time(remaining_time),
            progress_percentage: arithmetic::progress_percentage(timer, now),
            count_down: timer.count_down,
            warning_times: timer.warning_times.clone(),
            fired_warnings: timer.fired_warnings.iter().rev().copied().collect(),
            controllable_by: timer.controllable_by.clone(),
            priority: timer.priority,
            started_at: timer.started_at.map(format_system_time),
            paused_at: timer.paused_at.map(format_system_time),
            completed_at: timer.completed_at.map(format_system_time),
            total_paused_time: timer.total_paused_ms / 1_000,
            pause_history: timer.pause_history.iter().map(PauseView::from).collect(),
            extensions: timer.extensions.iter().map(ExtensionView::from).collect(),
            created_at: format_system_time(timer.created_at),
            updated_at: format_system_time(timer.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateTimerRequest {
        serde_json::from_str(
            r#"{
                "committeeId": "c1",
                "sessionId": "s1",
                "timerType": "speaker",
                "totalDuration": 60,
                "warningTimes": [30, 10]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn create_request_defaults() {
        let request = request();
        assert!(request.count_down);
        assert!(!request.auto_start);
        assert_eq!(request.priority, 0);
        assert!(request.name.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn zero_duration_is_rejected() {
        let mut request = request();
        request.total_duration = 0;
        request.warning_times.clear();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("total_duration"));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let mut request = request();
        request.warning_times = vec![10, 0];
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("warning_times"));
    }

    #[test]
    fn thresholds_must_fit_in_the_duration() {
        let mut request = request();
        request.warning_times = vec![60];
        assert!(request.validate().is_err());

        request.warning_times = vec![59];
        assert!(request.validate().is_ok());
    }

    #[test]
    fn count_up_timers_take_no_thresholds() {
        let mut request = request();
        request.count_down = false;
        assert!(request.validate().is_err());

        request.warning_times.clear();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn unknown_timer_type_fails_to_parse() {
        let result = serde_json::from_str::<CreateTimerRequest>(
            r#"{"committeeId":"c1","sessionId":"s1","timerType":"lunch","totalDuration":60}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn extend_requires_positive_seconds() {
        let request = ExtendTimerRequest {
            additional_seconds: 0,
            reason: None,
            granted_by: None,
        };
        assert!(request.validate().is_err());
    }
}
