//! Lineage emission (§4.4 step 11): a best-effort event fired after a stream
//! lands, describing what was written and how it scored. Sink failures are
//! advisory (§7 `ErrorKind::Advisory`) — logged, never propagated.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Default wall-clock budget for a lineage POST before it is abandoned.
pub const DEFAULT_LINEAGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct LineageEvent {
    pub source: String,
    pub stream: String,
    pub run_id: Uuid,
    pub record_count: u64,
    pub quality_score: Option<f64>,
    pub pii_detection_count: u64,
    pub layers_written: Vec<String>,
}

/// Where a lineage event goes. Implementations are free to drop it on the
/// floor (`NullLineageSink`) or ship it over HTTP (`HttpLineageSink`); the
/// orchestrator never inspects which.
#[async_trait]
pub trait LineageSink: Send + Sync {
    async fn emit(&self, event: &LineageEvent) -> anyhow::Result<()>;
}

/// Discards every event. Used when no lineage endpoint is configured.
pub struct NullLineageSink;

#[async_trait]
impl LineageSink for NullLineageSink {
    async fn emit(&self, _event: &LineageEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// POSTs the event as JSON to a configured HTTP endpoint, with a short
/// timeout so a slow or dead sink never holds up the run it is describing.
pub struct HttpLineageSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLineageSink {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_LINEAGE_TIMEOUT)
            .build()?;
        Ok(HttpLineageSink { client, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl LineageSink for HttpLineageSink {
    async fn emit(&self, event: &LineageEvent) -> anyhow::Result<()> {
        let response = self.client.post(&self.endpoint).json(event).send().await?;
        response.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> LineageEvent {
        LineageEvent {
            source: "src-1".into(),
            stream: "users".into(),
            run_id: Uuid::nil(),
            record_count: 10,
            quality_score: Some(92.5),
            pii_detection_count: 1,
            layers_written: vec!["raw".into(), "validated".into()],
        }
    }

    #[tokio::test]
    async fn null_sink_always_succeeds() {
        let sink = NullLineageSink;
        assert!(sink.emit(&sample_event()).await.is_ok());
    }

    #[tokio::test]
    async fn http_sink_fails_fast_against_an_unroutable_endpoint() {
        let sink = HttpLineageSink::new("http://127.0.0.1:1").unwrap();
        let result = sink.emit(&sample_event()).await;
        assert!(result.is_err());
    }
}
