//! Record sinks - where the watcher forwards dispatch records

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ForwardError;
use crate::models::{GeoDispatchRecord, IngestAck};
use crate::relay::Broker;

/// Downstream consumer of dispatch records
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Deliver `records` in order, returning how many were accepted
    async fn forward(&self, records: &[GeoDispatchRecord]) -> Result<usize, ForwardError>;
}

/// Posts records to a relay's ingest endpoint
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    url: String,
    http_client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ForwardError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            http_client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RecordSink for HttpForwarder {
    async fn forward(&self, records: &[GeoDispatchRecord]) -> Result<usize, ForwardError> {
        let response = self.http_client.post(&self.url).json(records).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForwardError::Rejected(format!("{status}: {body}")));
        }

        let ack: IngestAck = response.json().await?;
        Ok(ack.accepted_count)
    }
}

/// Feeds an in-process broker directly, skipping HTTP
#[derive(Debug, Clone)]
pub struct BrokerSink {
    broker: Arc<Broker>,
}

impl BrokerSink {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl RecordSink for BrokerSink {
    async fn forward(&self, records: &[GeoDispatchRecord]) -> Result<usize, ForwardError> {
        Ok(self.broker.ingest(records)?)
    }
}
