//! Relay statistics handler

use axum::{extract::State, Json};

use crate::models::RelayStats;
use crate::relay::AppState;

pub async fn stats(State(state): State<AppState>) -> Json<RelayStats> {
    Json(state.broker.stats())
}
