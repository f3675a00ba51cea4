//! Relay request/response types

use serde::{Deserialize, Serialize};

/// Acknowledgement returned by `POST /ingest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestAck {
    pub ok: bool,
    #[serde(rename = "n")]
    pub accepted_count: usize,
}

impl IngestAck {
    pub fn accepted(count: usize) -> Self {
        Self {
            ok: true,
            accepted_count: count,
        }
    }
}

/// `GET /stats` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayStats {
    pub mode: String,
    pub subscribers: usize,
    pub pending: usize,
    pub ingested: u64,
    pub dropped: u64,
}
