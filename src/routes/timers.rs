use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::timer::{
        CancelTimerRequest, CreateTimerRequest, ExtendTimerRequest, TimerEventView, TimerView,
    },
    error::AppError,
    services::timer_service,
    state::SharedState,
};

const ACTOR_HEADER: &str = "x-actor";

/// Timer control and query endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/timers", post(create_timer))
        .route("/timers/{id}", get(get_timer))
        .route("/timers/{id}/events", get(get_timer_events))
        .route("/timers/{id}/start", post(start_timer))
        .route("/timers/{id}/pause", post(pause_timer))
        .route("/timers/{id}/resume", post(resume_timer))
        .route("/timers/{id}/extend", post(extend_timer))
        .route("/timers/{id}/complete", post(complete_timer))
        .route("/timers/{id}/cancel", post(cancel_timer))
        .route(
            "/committees/{committee_id}/timers",
            get(list_committee_timers),
        )
        .route("/sessions/{session_id}/timers", get(list_session_timers))
}

/// Acting user, recorded in the audit log when present.
fn actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Create a timer for a committee.
#[utoipa::path(
    post,
    path = "/timers",
    tag = "timers",
    params(("X-Actor" = Option<String>, Header, description = "User performing the action")),
    request_body = CreateTimerRequest,
    responses(
        (status = 200, description = "Timer created", body = TimerView),
        (status = 400, description = "Invalid duration or thresholds"),
        (status = 409, description = "An active timer of this type already exists"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_timer(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTimerRequest>,
) -> Result<Json<TimerView>, AppError> {
    let actor = actor(&headers);
    let timer = timer_service::create_timer(&state, payload, actor.as_deref()).await?;
    Ok(Json(timer))
}

/// Retrieve a timer with its time recomputed now.
#[utoipa::path(
    get,
    path = "/timers/{id}",
    tag = "timers",
    params(("id" = Uuid, Path, description = "Timer identifier")),
    responses(
        (status = 200, description = "Timer", body = TimerView),
        (status = 404, description = "Unknown timer")
    )
)]
pub async fn get_timer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TimerView>, AppError> {
    Ok(Json(timer_service::get_timer(&state, id).await?))
}

/// Audit log of a timer.
#[utoipa::path(
    get,
    path = "/timers/{id}/events",
    tag = "timers",
    params(("id" = Uuid, Path, description = "Timer identifier")),
    responses(
        (status = 200, description = "Audit events, oldest first", body = [TimerEventView]),
        (status = 404, description = "Unknown timer")
    )
)]
pub async fn get_timer_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TimerEventView>>, AppError> {
    Ok(Json(timer_service::timer_events(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/timers/{id}/start",
    tag = "timers",
    params(
        ("id" = Uuid, Path, description = "Timer identifier"),
        ("X-Actor" = Option<String>, Header, description = "User performing the action")
    ),
    responses(
        (status = 200, description = "Timer started", body = TimerView),
        (status = 404, description = "Unknown timer"),
        (status = 409, description = "Timer is not in `created` status")
    )
)]
/// Start a created timer.
pub async fn start_timer(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<TimerView>, AppError> {
    let actor = actor(&headers);
    Ok(Json(
        timer_service::start_timer(&state, id, actor.as_deref()).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/timers/{id}/pause",
    tag = "timers",
    params(
        ("id" = Uuid, Path, description = "Timer identifier"),
        ("X-Actor" = Option<String>, Header, description = "User performing the action")
    ),
    responses(
        (status = 200, description = "Timer paused", body = TimerView),
        (status = 404, description = "Unknown timer"),
        (status = 409, description = "Timer is not running")
    )
)]
/// Pause a running timer.
pub async fn pause_timer(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<TimerView>, AppError> {
    let actor = actor(&headers);
    Ok(Json(
        timer_service::pause_timer(&state, id, actor.as_deref()).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/timers/{id}/resume",
    tag = "timers",
    params(
        ("id" = Uuid, Path, description = "Timer identifier"),
        ("X-Actor" = Option<String>, Header, description = "User performing the action")
    ),
    responses(
        (status = 200, description = "Timer resumed", body = TimerView),
        (status = 404, description = "Unknown timer"),
        (status = 409, description = "Timer is not paused")
    )
)]
/// Resume a paused timer.
pub async fn resume_timer(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<TimerView>, AppError> {
    let actor = actor(&headers);
    Ok(Json(
        timer_service::resume_timer(&state, id, actor.as_deref()).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/timers/{id}/extend",
    tag = "timers",
    params(
        ("id" = Uuid, Path, description = "Timer identifier"),
        ("X-Actor" = Option<String>, Header, description = "User performing the action")
    ),
    request_body = ExtendTimerRequest,
    responses(
        (status = 200, description = "Time added", body = TimerView),
        (status = 400, description = "Invalid extension"),
        (status = 404, description = "Unknown timer"),
        (status = 409, description = "Timer is neither running nor paused")
    )
)]
/// Add time to a running or paused timer.
pub async fn extend_timer(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ExtendTimerRequest>,
) -> Result<Json<TimerView>, AppError> {
    let actor = actor(&headers);
    Ok(Json(
        timer_service::extend_timer(&state, id, payload, actor.as_deref()).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/timers/{id}/complete",
    tag = "timers",
    params(
        ("id" = Uuid, Path, description = "Timer identifier"),
        ("X-Actor" = Option<String>, Header, description = "User performing the action")
    ),
    responses(
        (status = 200, description = "Timer completed, or already finished", body = TimerView),
        (status = 404, description = "Unknown timer"),
        (status = 409, description = "Timer was never started")
    )
)]
/// Stop a timer by hand.
pub async fn complete_timer(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<TimerView>, AppError> {
    let actor = actor(&headers);
    Ok(Json(
        timer_service::complete_timer(&state, id, actor.as_deref()).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/timers/{id}/cancel",
    tag = "timers",
    params(
        ("id" = Uuid, Path, description = "Timer identifier"),
        ("X-Actor" = Option<String>, Header, description = "User performing the action")
    ),
    request_body(content = CancelTimerRequest, description = "Optional cancellation reason"),
    responses(
        (status = 200, description = "Timer cancelled, or already finished", body = TimerView),
        (status = 404, description = "Unknown timer")
    )
)]
/// Abandon a timer.
pub async fn cancel_timer(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelTimerRequest>>,
) -> Result<Json<TimerView>, AppError> {
    let actor = actor(&headers);
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    Ok(Json(
        timer_service::cancel_timer(&state, id, request, actor.as_deref()).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/committees/{committee_id}/timers",
    tag = "timers",
    params(("committee_id" = String, Path, description = "Committee identifier")),
    responses((status = 200, description = "Non-terminal timers of the committee", body = [TimerView]))
)]
/// List the active timers of a committee.
pub async fn list_committee_timers(
    State(state): State<SharedState>,
    Path(committee_id): Path<String>,
) -> Result<Json<Vec<TimerView>>, AppError> {
    Ok(Json(
        timer_service::list_committee_timers(&state, &committee_id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/sessions/{session_id}/timers",
    tag = "timers",
    params(("session_id" = String, Path, description = "Session identifier")),
    responses((status = 200, description = "Non-terminal timers of the session", body = [TimerView]))
)]
/// List the active timers of a session.
pub async fn list_session_timers(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<TimerView>>, AppError> {
    Ok(Json(
        timer_service::list_session_timers(&state, &session_id).await?,
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn actor_header_is_trimmed_and_optional() {
        let mut headers = HeaderMap::new();
        assert_eq!(actor(&headers), None);

        headers.insert(ACTOR_HEADER, HeaderValue::from_static("  chair-1 "));
        assert_eq!(actor(&headers).as_deref(), Some("chair-1"));

        headers.insert(ACTOR_HEADER, HeaderValue::from_static("   "));
        assert_eq!(actor(&headers), None);
    }
}
