//! `elt sync run` — a single sync against the orchestrator directly,
//! bypassing the scheduler's job bookkeeping entirely. Useful for manual
//! one-off runs and for exercising a connector without touching the job
//! history tables.

use crate::registry::ConnectorRegistry;
use anyhow::Result;
use elt_core::{ConfiguredCatalog, ConfiguredStream, SyncMode};
use elt_orchestrator::lineage::LineageSink;
use elt_orchestrator::summary::SyncStatus;
use elt_orchestrator::{execute_full_sync, SyncDeps, SyncRequest};
use elt_profiler::{DefaultQualityValidator, RegexPiiDetector};
use sqlx::PgPool;
use std::sync::Arc;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    registry: &ConnectorRegistry,
    pool: PgPool,
    state_store: Arc<dyn elt_db::state_store::StateStore>,
    lineage: Arc<dyn LineageSink>,
    source_id: &str,
    source_name: &str,
    streams: Vec<String>,
    sync_mode: SyncMode,
    defaults: crate::exec::ExecDefaults,
) -> Result<()> {
    let connector = registry.resolve(source_id)?;

    let catalog = ConfiguredCatalog {
        streams: streams
            .into_iter()
            .map(|stream| ConfiguredStream {
                stream,
                sync_mode,
                destination_sync_mode: defaults.destination_sync_mode,
                cursor_field: None,
                primary_key: defaults.natural_key.clone().map(|k| vec![k]),
            })
            .collect(),
    };

    let req = SyncRequest {
        source_id: source_id.to_string(),
        source_name: source_name.to_string(),
        config: serde_json::json!({}),
        catalog,
        batch_size: defaults.batch_size,
        connector_timeout: defaults.connector_timeout,
    };
    let deps = SyncDeps {
        connector,
        pool,
        state_store,
        pii_detector: Arc::new(RegexPiiDetector),
        quality_validator: Arc::new(DefaultQualityValidator::default()),
        lineage,
    };

    let summary = execute_full_sync(&req, &deps).await;
    println!("run_id={}", summary.run_id);
    println!("status={:?}", summary.status);
    for stream in &summary.streams {
        println!(
            "  stream={} records_read={} validated={} business={} dedup={} quality_score={}",
            stream.stream,
            stream.records_read,
            stream.validated_written.written,
            stream.business_written.written,
            stream.dedup_written.as_ref().map(|c| c.written.to_string()).unwrap_or_else(|| "-".to_string()),
            stream.quality_score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
        );
    }
    if let Some(error) = &summary.error {
        println!("error={error}");
    }
    if summary.status == SyncStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}
