use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/committees/{committee_id}",
    tag = "sse",
    params(("committee_id" = String, Path, description = "Committee whose timer room to join")),
    responses((status = 200, description = "Committee timer events", content_type = "text/event-stream", body = String))
)]
/// Stream every timer event of one committee.
pub async fn committee_stream(
    State(state): State<SharedState>,
    Path(committee_id): Path<String>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe_committee(&state, &committee_id);
    info!(
        committee_id = %committee_id,
        subscribers = state.rooms().subscriber_count(&committee_id),
        "New committee SSE connection"
    );
    sse_service::to_sse_stream(state, committee_id, receiver)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/committees/{committee_id}", get(committee_stream))
}
