//! Event stream handler (Server-Sent Events)

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use tokio_stream::{Stream, StreamExt};

use crate::models::GeoDispatchRecord;
use crate::relay::AppState;

/// Open a push stream; one `data:` frame per dispatched record
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.broker.subscribe();
    let stream = subscription
        .into_stream()
        .filter_map(|record| record_to_event(&record).map(Ok));

    Sse::new(stream).keep_alive(default_keep_alive())
}

fn record_to_event(record: &GeoDispatchRecord) -> Option<Event> {
    serde_json::to_string(record)
        .map(|data| Event::default().data(data))
        .map_err(|err| {
            tracing::warn!("failed to serialize dispatch record: {err}");
            err
        })
        .ok()
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
