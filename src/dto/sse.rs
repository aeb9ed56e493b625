use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{dao::models::TimerType, dto::timer::TimerView};

#[derive(Clone, Debug)]
/// Dispatched payload carried across committee rooms.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event from an already encoded data field.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Initial metadata sent to an SSE client when it joins a committee room.
pub struct Handshake {
    /// Committee whose room the client joined.
    pub committee_id: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Payload of `timer-created`, `timer-started`, `timer-completed` and `timer-expired`.
pub struct TimerNotice {
    pub timer: TimerView,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Payload of `timer-paused` and `timer-resumed`.
pub struct TimerRemainingEvent {
    pub timer: TimerView,
    pub remaining_time: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast when time is added to a timer.
pub struct TimerExtendedEvent {
    pub timer: TimerView,
    pub added_time: u64,
    pub new_total_duration: u64,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a timer is abandoned.
pub struct TimerCancelledEvent {
    pub timer: TimerView,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast once per threshold when a countdown crosses it.
pub struct TimerWarningEvent {
    pub timer: TimerView,
    pub threshold: u64,
    pub remaining_time: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Periodic refresh for displays, sent at a lower cadence than the sweep.
pub struct TimerUpdateEvent {
    pub timer_id: Uuid,
    pub timer_type: TimerType,
    pub remaining_time: u64,
    pub display_time: String,
    pub progress_percentage: f64,
}
