use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/events",
    responses((status = 200, description = "Session event stream", content_type = "text/event-stream", body = String))
)]
/// Stream realtime session events to connected clients.
pub async fn event_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe(&state);
    info!("New session event stream connection");
    sse_service::broadcast_info(state.events(), "event stream connected");
    sse_service::to_sse_stream(receiver)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/events", get(event_stream))
}
