//! Bridges the Scheduler's [`ExecutorFn`] seam to the Sync Orchestrator.
//! This is the one place in the workspace that depends on both crates —
//! `elt-scheduler` itself never references `elt-orchestrator` (§9, one-way
//! dependency to avoid the scheduler/orchestrator cycle).

use crate::registry::ConnectorRegistry;
use anyhow::anyhow;
use elt_core::{ConfiguredCatalog, ConfiguredStream, DestinationSyncMode, SyncJob};
use elt_orchestrator::lineage::LineageSink;
use elt_orchestrator::{execute_full_sync, SyncDeps, SyncRequest};
use elt_profiler::{DefaultQualityValidator, RegexPiiDetector};
use elt_scheduler::{ExecutorFn, JobExecutionResult};
use elt_db::state_store::StateStore;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Fixed manual-operation defaults for fields the scheduler's `SyncJob`
/// does not carry (destination mode, natural/primary key): a thin CLI has
/// no catalog discovery step of its own, so `job run`/`schedule run`
/// always project a job's streams the same way. Operators needing a
/// different destination mode per stream should call `elt-orchestrator`
/// directly from a program that has run `discover` first.
pub struct ExecDefaults {
    pub destination_sync_mode: DestinationSyncMode,
    pub natural_key: Option<String>,
    pub batch_size: usize,
    pub connector_timeout: Duration,
}

#[allow(clippy::too_many_arguments)]
pub fn build_executor(
    registry: Arc<ConnectorRegistry>,
    pool: PgPool,
    state_store: Arc<dyn StateStore>,
    lineage: Arc<dyn LineageSink>,
    defaults: ExecDefaults,
) -> ExecutorFn {
    Arc::new(move |job: SyncJob| {
        let registry = registry.clone();
        let pool = pool.clone();
        let state_store = state_store.clone();
        let lineage = lineage.clone();
        let destination_sync_mode = defaults.destination_sync_mode;
        let natural_key = defaults.natural_key.clone();
        let batch_size = defaults.batch_size;
        let connector_timeout = defaults.connector_timeout;

        Box::pin(async move {
            let connector = registry.resolve(&job.source_id)?;

            let catalog = ConfiguredCatalog {
                streams: job
                    .streams
                    .iter()
                    .map(|stream| ConfiguredStream {
                        stream: stream.clone(),
                        sync_mode: job.sync_mode,
                        destination_sync_mode,
                        cursor_field: None,
                        primary_key: natural_key.clone().map(|k| vec![k]),
                    })
                    .collect(),
            };

            let req = SyncRequest {
                source_id: job.source_id.clone(),
                source_name: job.source_name.clone(),
                config: serde_json::json!({}),
                catalog,
                batch_size,
                connector_timeout,
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
            match summary.status {
                elt_orchestrator::summary::SyncStatus::Succeeded => Ok(JobExecutionResult {
                    records_synced: summary.total_records_synced() as i64,
                    metadata: serde_json::to_value(&summary.streams).unwrap_or_default(),
                }),
                elt_orchestrator::summary::SyncStatus::Failed => {
                    Err(anyhow!(summary.error.unwrap_or_else(|| "sync failed".to_string())))
                }
            }
        })
    })
}
