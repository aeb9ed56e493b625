/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Scheduler registry rebuild after a restart or reconnect.
pub mod recovery;
/// Single shared sweep over running timers.
pub mod scheduler;
/// Server-Sent Events streaming of committee rooms.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Room event payloads for timer lifecycle changes.
pub mod timer_events;
/// Timer control operations.
pub mod timer_service;
