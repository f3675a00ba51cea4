//! Health check handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::relay::{AppState, DispatchMode};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy`, or `closing` once the broker stops accepting records
    pub status: String,
    pub version: String,
    pub mode: DispatchMode,
    pub subscribers: usize,
    pub timestamp: i64,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.broker.is_closed() { "closing" } else { "healthy" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: state.broker.mode(),
        subscribers: state.broker.subscriber_count(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}
