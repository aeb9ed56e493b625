use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the session timer backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::committee_stream,
        crate::routes::timers::create_timer,
        crate::routes::timers::get_timer,
        crate::routes::timers::get_timer_events,
        crate::routes::timers::start_timer,
        crate::routes::timers::pause_timer,
        crate::routes::timers::resume_timer,
        crate::routes::timers::extend_timer,
        crate::routes::timers::complete_timer,
        crate::routes::timers::cancel_timer,
        crate::routes::timers::list_committee_timers,
        crate::routes::timers::list_session_timers,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::timer::CreateTimerRequest,
            crate::dto::timer::ExtendTimerRequest,
            crate::dto::timer::CancelTimerRequest,
            crate::dto::timer::TimerView,
            crate::dto::timer::TimerEventView,
            crate::dto::timer::PauseView,
            crate::dto::timer::ExtensionView,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::TimerNotice,
            crate::dto::sse::TimerRemainingEvent,
            crate::dto::sse::TimerExtendedEvent,
            crate::dto::sse::TimerCancelledEvent,
            crate::dto::sse::TimerWarningEvent,
            crate::dto::sse::TimerUpdateEvent,
            crate::dao::models::TimerType,
            crate::dao::models::TimerStatus,
            crate::dao::models::TimerEventKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "timers", description = "Timer control and queries"),
    )
)]
pub struct ApiDoc;
