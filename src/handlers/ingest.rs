//! Ingest handler

use axum::{extract::State, Json};
use validator::Validate;

use crate::error::AppResult;
use crate::models::{GeoDispatchRecord, IngestAck};
use crate::relay::AppState;

/// Enqueue a batch of dispatch records for subscribers
pub async fn ingest(
    State(state): State<AppState>,
    Json(records): Json<Vec<GeoDispatchRecord>>,
) -> AppResult<Json<IngestAck>> {
    for record in &records {
        record.validate()?;
    }

    let accepted = state.broker.ingest(&records)?;
    tracing::debug!(accepted, subscribers = state.broker.subscriber_count(), "Ingested records");

    Ok(Json(IngestAck::accepted(accepted)))
}
