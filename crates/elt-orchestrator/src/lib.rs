//! The Sync Orchestrator (§4.4): runs one source's configured catalog
//! through every message-protocol boundary — connector execution, PII and
//! quality profiling, medallion writes, cursor extraction, lineage, and
//! state persistence — end to end.

pub mod cursor;
pub mod lineage;
pub mod summary;

use crate::lineage::{LineageEvent, LineageSink};
use crate::summary::{StreamSyncResult, SyncSummary};
use anyhow::Result;
use elt_connectors::executor::{collect_with_timeout, Connector};
use elt_core::model::{new_run_id, ConfiguredCatalog, ConfiguredStream, DestinationSyncMode, Record, SourceState, SyncMode};
use elt_core::profiler::{PiiDetector, PiiReport, QualityReport, QualityValidator};
use elt_db::state_store::{StateStore, StreamUpdate};
use elt_schemas::value::{fields_from_json_map, Fields, TabularView};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// The fixed inputs for one run (§4.2 "Contract"): which source, which
/// streams, and how to reach the connector that will read them.
pub struct SyncRequest {
    pub source_id: String,
    pub source_name: String,
    pub config: serde_json::Value,
    pub catalog: ConfiguredCatalog,
    pub batch_size: usize,
    pub connector_timeout: Duration,
}

/// Collaborators injected per run, kept as trait objects so tests can swap
/// a scripted connector, an in-memory state store, or a null lineage sink
/// in for the production implementations (§9 "Plugin-style connectors").
pub struct SyncDeps {
    pub connector: Arc<dyn Connector>,
    pub pool: PgPool,
    pub state_store: Arc<dyn StateStore>,
    pub pii_detector: Arc<dyn PiiDetector>,
    pub quality_validator: Arc<dyn QualityValidator>,
    pub lineage: Arc<dyn LineageSink>,
}

/// Runs the full sync pipeline for `req.source_id` against every stream in
/// `req.catalog` (§4.4). Steps 4 (connector execution), 8 (raw land), 9
/// (destination land), and 10 (cursor extraction) are must-succeed: the
/// first failure among them aborts the run with `status = failed`, and the
/// streams landed so far are still reported. Steps 6 (PII detection), 7
/// (quality validation), and 11 (lineage emission) are advisory: a failure
/// there is captured on the stream result and the run proceeds.
pub async fn execute_full_sync(req: &SyncRequest, deps: &SyncDeps) -> SyncSummary {
    let run_id = new_run_id();

    let prior_state = match load_or_create_state(req, deps).await {
        Ok(state) => state,
        Err(err) => return SyncSummary::failed(run_id, &req.source_id, err.to_string(), Vec::new()),
    };
    let prior_state_json = build_prior_state_json(&prior_state);

    // Steps 3/4: execute the connector to completion, preserving whatever it
    // already yielded if the run times out.
    let message_stream = match deps.connector.read(&req.config, &req.catalog, Some(&prior_state_json)).await {
        Ok(stream) => stream,
        Err(err) => {
            return SyncSummary::failed(run_id, &req.source_id, format!("connector read failed: {err}"), Vec::new());
        }
    };
    let execution = collect_with_timeout(message_stream, req.connector_timeout).await;
    if !execution.success {
        let error = execution.error.unwrap_or_else(|| "connector execution failed".to_string());
        return SyncSummary::failed(run_id, &req.source_id, error, Vec::new());
    }

    let last_state = execution.messages.iter().rev().find_map(|m| m.as_state());
    let records_by_stream = group_records_by_stream(&execution.messages);

    let mut results = Vec::new();
    for configured in &req.catalog.streams {
        let empty: Vec<Record> = Vec::new();
        let records = records_by_stream.get(&configured.stream).unwrap_or(&empty);

        let mut result = match land_stream(req, deps, configured, run_id, records).await {
            Ok(result) => result,
            Err(err) => {
                return SyncSummary::failed(run_id, &req.source_id, err.to_string(), results);
            }
        };

        // Step 10: cursor extraction, must-succeed for incremental streams.
        let cursor = cursor::extract_cursor(last_state, records.last());
        match (cursor, configured.sync_mode) {
            (Some((field, value)), _) => {
                result.cursor_field = Some(field);
                result.cursor_value = Some(value);
            }
            (None, SyncMode::Incremental) => {
                let error = format!("incremental stream '{}' yielded no cursor", configured.stream);
                results.push(result);
                return SyncSummary::failed(run_id, &req.source_id, error, results);
            }
            (None, SyncMode::FullRefresh) => {}
        }

        // Step 12: persist replication state for this stream.
        let update = StreamUpdate {
            cursor_field: result.cursor_field.clone(),
            cursor_value: result.cursor_value.clone(),
            sync_mode: Some(configured.sync_mode),
            records_synced_delta: records.len() as i64,
            metadata: None,
        };
        if let Err(err) = deps.state_store.update_stream(&req.source_id, &configured.stream, update).await {
            let error = format!("state persist failed for stream '{}': {err}", configured.stream);
            results.push(result);
            return SyncSummary::failed(run_id, &req.source_id, error, results);
        }

        // Step 11: lineage emission, advisory.
        emit_lineage(deps, &req.source_id, run_id, &mut result).await;
        results.push(result);
    }

    SyncSummary::succeeded(run_id, &req.source_id, results)
}

async fn load_or_create_state(req: &SyncRequest, deps: &SyncDeps) -> Result<SourceState> {
    let stream_names: Vec<String> = req.catalog.streams.iter().map(|s| s.stream.clone()).collect();
    if let Some(state) = deps.state_store.get(&req.source_id).await? {
        return Ok(state);
    }
    deps.state_store.create(&req.source_name, &req.source_id, &stream_names).await
}

fn build_prior_state_json(state: &SourceState) -> serde_json::Value {
    let mut streams = serde_json::Map::new();
    for (name, stream_state) in &state.streams {
        streams.insert(
            name.clone(),
            serde_json::json!({
                "cursor_field": stream_state.cursor_field,
                "cursor_value": stream_state.cursor_value,
            }),
        );
    }
    serde_json::json!({ "streams": streams, "global": state.global_state })
}

fn group_records_by_stream(messages: &[elt_protocol::Message]) -> BTreeMap<String, Vec<Record>> {
    let mut by_stream: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for message in messages {
        if let Some(payload) = message.as_record() {
            let record = Record {
                stream: payload.stream.clone(),
                namespace: payload.namespace.clone(),
                data: fields_from_json_map(payload.data.clone()),
                emitted_at: payload.emitted_at,
            };
            by_stream.entry(payload.stream.clone()).or_default().push(record);
        }
    }
    by_stream
}

/// Steps 6-9 for one stream: profile the batch (advisory), then write it to
/// raw, validated, and business (all three must-succeed, unconditionally,
/// per §4.4 steps 8-9 — `destination_sync_mode` never picks one layer over
/// another). `AppendDedup` additionally opts the stream into a deduplicated
/// write on top of that mandatory pair; it is a separate Medallion Writer
/// capability (§4.3), not a replacement destination.
async fn land_stream(
    req: &SyncRequest,
    deps: &SyncDeps,
    configured: &ConfiguredStream,
    run_id: Uuid,
    records: &[Record],
) -> Result<StreamSyncResult> {
    let stream = &configured.stream;
    let field_rows: Vec<Fields> = records.iter().map(|r| r.data.clone()).collect();
    let view = TabularView::from_records(&field_rows);

    let (pii_report, pii_error) = run_pii_detection(deps, &view);
    let (quality_report, quality_error) = run_quality_validation(deps, &view);
    let quality_score = quality_report.as_ref().map(|r| r.overall_score);

    elt_db::raw_land(&deps.pool, &req.source_id, stream, run_id, &field_rows, req.batch_size)
        .await
        .map_err(|err| anyhow::anyhow!("raw land failed for stream '{stream}': {err}"))?;

    let layers = land_layers(req, deps, configured, run_id, &view, quality_score).await?;

    let mut advisory_errors = Vec::new();
    if let Some(err) = pii_error {
        advisory_errors.push(("pii_detection".to_string(), err));
    }
    if let Some(err) = quality_error {
        advisory_errors.push(("quality_validation".to_string(), err));
    }

    Ok(StreamSyncResult {
        stream: stream.clone(),
        records_read: records.len() as u64,
        validated_written: layers.validated,
        business_written: layers.business,
        dedup_written: layers.dedup,
        pii_detection_count: pii_report.map(|r| r.total_detections).unwrap_or(0),
        quality_score,
        cursor_field: None,
        cursor_value: None,
        advisory_errors,
    })
}

/// The layers one stream lands on every sync: validated and business are
/// unconditional (§4.4 steps 8-9); dedup is an additive opt-in (§4.3).
struct LandedLayers {
    validated: elt_db::WriteCounts,
    business: elt_db::WriteCounts,
    dedup: Option<elt_db::WriteCounts>,
}

async fn land_layers(
    req: &SyncRequest,
    deps: &SyncDeps,
    configured: &ConfiguredStream,
    run_id: Uuid,
    view: &TabularView,
    quality_score: Option<f64>,
) -> Result<LandedLayers> {
    let stream = &configured.stream;

    // Step 8: validated land, must-succeed.
    let metadata = elt_db::validated::ValidatedMetadata {
        run_id,
        pii_checked: true,
        quality_score: quality_score.unwrap_or(100.0),
    };
    let validated = elt_db::validated_land(&deps.pool, &req.source_id, stream, view, metadata, req.batch_size)
        .await
        .map_err(|err| anyhow::anyhow!("validated land failed for stream '{stream}': {err}"))?;

    // Step 9: business land (SCD2), must-succeed.
    let natural_key = configured.primary_key.as_ref().and_then(|pk| pk.first()).map(String::as_str);
    let business = elt_db::business_land(&deps.pool, &req.source_id, stream, view, natural_key, run_id)
        .await
        .map_err(|err| anyhow::anyhow!("business land failed for stream '{stream}': {err}"))?;

    // Deduplicated write (§4.3) is a separate Medallion Writer capability,
    // not an alternate destination: a stream opts into it on top of the
    // mandatory validated+business pair via `AppendDedup`.
    let dedup = if configured.destination_sync_mode == DestinationSyncMode::AppendDedup {
        let key_columns = configured
            .primary_key
            .clone()
            .filter(|pk| !pk.is_empty())
            .or_else(|| view.columns.first().cloned().map(|c| vec![c]))
            .ok_or_else(|| anyhow::anyhow!("stream '{stream}' has no columns to key a dedup write on"))?;
        let upsert = elt_db::upsert_write(&deps.pool, &req.source_id, stream, view, &key_columns, run_id)
            .await
            .map_err(|err| anyhow::anyhow!("dedup upsert failed for stream '{stream}': {err}"))?;
        Some(elt_db::WriteCounts { written: upsert.processed, failed: 0 })
    } else {
        None
    };

    Ok(LandedLayers { validated, business, dedup })
}

fn run_pii_detection(deps: &SyncDeps, view: &TabularView) -> (Option<PiiReport>, Option<String>) {
    let detector = deps.pii_detector.clone();
    match catch_unwind(AssertUnwindSafe(|| detector.detect(view))) {
        Ok(report) => (Some(report), None),
        Err(_) => (None, Some("pii detector panicked".to_string())),
    }
}

fn run_quality_validation(deps: &SyncDeps, view: &TabularView) -> (Option<QualityReport>, Option<String>) {
    let validator = deps.quality_validator.clone();
    match catch_unwind(AssertUnwindSafe(|| validator.validate(view))) {
        Ok(report) => (Some(report), None),
        Err(_) => (None, Some("quality validator panicked".to_string())),
    }
}

async fn emit_lineage(deps: &SyncDeps, source_id: &str, run_id: Uuid, result: &mut StreamSyncResult) {
    let mut layers_written = vec!["raw".to_string(), "validated".to_string(), "business".to_string()];
    if result.dedup_written.is_some() {
        layers_written.push("deduped".to_string());
    }
    let event = LineageEvent {
        source: source_id.to_string(),
        stream: result.stream.clone(),
        run_id,
        record_count: result.validated_written.written,
        quality_score: result.quality_score,
        pii_detection_count: result.pii_detection_count,
        layers_written,
    };
    if let Err(err) = deps.lineage.emit(&event).await {
        tracing::warn!(stream = %result.stream, error = %err, "lineage emission failed");
        result.advisory_errors.push(("lineage".to_string(), err.to_string()));
    }
}
