use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Running timers currently swept by the scheduler.
    pub scheduled_timers: usize,
}

impl HealthResponse {
    /// The timer store is reachable.
    pub fn ok(scheduled_timers: usize) -> Self {
        Self {
            status: "ok".to_string(),
            scheduled_timers,
        }
    }

    /// The backend is running without a timer store.
    pub fn degraded(scheduled_timers: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            scheduled_timers,
        }
    }
}
