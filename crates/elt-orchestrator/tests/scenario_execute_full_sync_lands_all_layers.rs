//! `execute_full_sync` end to end (§4.4, §8 "Concrete scenario 1 — One
//! incremental sync" and "Concrete scenario 2 — Incremental resync with one
//! change"): a scripted connector stands in for the subprocess/in-process
//! boundary, a real Postgres pool backs the medallion writes and state
//! store, so the fixed 12-step pipeline runs against its actual
//! collaborators rather than mocks.
//!
//! DB-backed, skipped if `DATABASE_URL` is not set.

use elt_connectors::in_process::testing::ScriptedSource;
use elt_connectors::in_process::InProcessConnector;
use elt_core::model::{ConfiguredCatalog, ConfiguredStream, DestinationSyncMode, SyncMode};
use elt_core::table_name::{qualified_table_name, Layer};
use elt_db::ident::quote_qualified;
use elt_db::state_store::PgStateStore;
use elt_orchestrator::lineage::NullLineageSink;
use elt_orchestrator::summary::SyncStatus;
use elt_orchestrator::{execute_full_sync, SyncDeps, SyncRequest};
use elt_profiler::pii::RegexPiiDetector;
use elt_profiler::quality::DefaultQualityValidator;
use elt_protocol::{LogLevel, LogPayload, Message, RecordPayload};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn record(id: i64, updated_at: &str) -> Message {
    let mut data = serde_json::Map::new();
    data.insert("id".to_string(), serde_json::json!(id));
    data.insert("updated_at".to_string(), serde_json::json!(updated_at));
    Message::Record(RecordPayload { stream: "orders".to_string(), data, emitted_at: 0, namespace: None })
}

fn catalog() -> ConfiguredCatalog {
    ConfiguredCatalog {
        streams: vec![ConfiguredStream {
            stream: "orders".to_string(),
            sync_mode: SyncMode::Incremental,
            destination_sync_mode: DestinationSyncMode::Append,
            cursor_field: Some("updated_at".to_string()),
            primary_key: Some(vec!["id".to_string()]),
        }],
    }
}

async fn build_deps(pool: sqlx::PgPool, messages: Vec<Message>) -> anyhow::Result<SyncDeps> {
    let state_store = PgStateStore::connect(pool.clone()).await?;
    let source = ScriptedSource { id: "scripted-orders".to_string(), messages };
    Ok(SyncDeps {
        connector: Arc::new(InProcessConnector::new(source)),
        pool,
        state_store: Arc::new(state_store),
        pii_detector: Arc::new(RegexPiiDetector),
        quality_validator: Arc::new(DefaultQualityValidator::default()),
        lineage: Arc::new(NullLineageSink),
    })
}

async fn row_count(pool: &sqlx::PgPool, source_id: &str, layer: Layer) -> anyhow::Result<i64> {
    let (schema, table) = qualified_table_name(source_id, "orders", layer);
    let qualified = quote_qualified(&schema, &table);
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT count(*) FROM {qualified}")).fetch_one(pool).await?;
    Ok(count)
}

#[tokio::test]
async fn one_incremental_sync_lands_every_record_on_every_mandatory_layer() -> anyhow::Result<()> {
    let url = match std::env::var(elt_db::ENV_DATABASE_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await?;
    let source_id = format!("scenario-sync-{}", Uuid::new_v4().simple());

    let messages = vec![
        Message::Log(LogPayload { level: LogLevel::Info, message: "starting".to_string() }),
        record(1, "2026-01-13T10:00:00Z"),
        record(2, "2026-01-13T10:01:00Z"),
        record(3, "2026-01-13T10:02:00Z"),
    ];
    let deps = build_deps(pool.clone(), messages).await?;
    let req = SyncRequest {
        source_id: source_id.clone(),
        source_name: "orders-src".to_string(),
        config: serde_json::json!({}),
        catalog: catalog(),
        batch_size: 1000,
        connector_timeout: Duration::from_secs(10),
    };

    let summary = execute_full_sync(&req, &deps).await;
    assert_eq!(summary.status, SyncStatus::Succeeded, "run failed: {:?}", summary.error);
    assert_eq!(summary.total_records_synced(), 3);

    let stream = &summary.streams[0];
    assert_eq!(stream.validated_written.written, 3);
    assert_eq!(stream.business_written.written, 3);
    assert_eq!(
        stream.cursor_value,
        Some(elt_core::model::CursorValue::String("2026-01-13T10:02:00Z".to_string()))
    );

    assert_eq!(row_count(&pool, &source_id, Layer::Raw).await?, 3);
    assert_eq!(row_count(&pool, &source_id, Layer::Validated).await?, 3);
    assert_eq!(row_count(&pool, &source_id, Layer::Business).await?, 3);

    let state = deps.state_store.get(&source_id).await?.expect("state persisted");
    let stream_state = &state.streams["orders"];
    assert_eq!(stream_state.records_synced, 3);
    assert_eq!(
        stream_state.cursor_value,
        Some(elt_core::model::CursorValue::String("2026-01-13T10:02:00Z".to_string()))
    );

    Ok(())
}

#[tokio::test]
async fn incremental_resync_with_one_change_adds_a_business_version_without_duplicating_rows() -> anyhow::Result<()> {
    let url = match std::env::var(elt_db::ENV_DATABASE_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await?;
    let source_id = format!("scenario-resync-{}", Uuid::new_v4().simple());

    let first_deps = build_deps(
        pool.clone(),
        vec![record(1, "2026-01-13T10:00:00Z"), record(2, "2026-01-13T10:01:00Z")],
    )
    .await?;
    let req = SyncRequest {
        source_id: source_id.clone(),
        source_name: "orders-src".to_string(),
        config: serde_json::json!({}),
        catalog: catalog(),
        batch_size: 1000,
        connector_timeout: Duration::from_secs(10),
    };
    let first_summary = execute_full_sync(&req, &first_deps).await;
    assert_eq!(first_summary.status, SyncStatus::Succeeded, "first run failed: {:?}", first_summary.error);

    // Second sync: record 1 resynced unchanged, record 2 resynced with a
    // newer `updated_at` (the one column the SCD2 key ignores: natural key
    // is `id`, so this must close the old business version, not insert a
    // second physical row alongside it).
    let second_deps = build_deps(
        pool.clone(),
        vec![record(1, "2026-01-13T10:00:00Z"), record(2, "2026-01-13T10:05:00Z")],
    )
    .await?;
    let second_summary = execute_full_sync(&req, &second_deps).await;
    assert_eq!(second_summary.status, SyncStatus::Succeeded, "second run failed: {:?}", second_summary.error);
    assert_eq!(second_summary.total_records_synced(), 2);

    assert_eq!(row_count(&pool, &source_id, Layer::Raw).await?, 4, "raw land never dedups by natural key");

    let (schema, table) = qualified_table_name(&source_id, "orders", Layer::Business);
    let qualified = quote_qualified(&schema, &table);
    let (current_count,): (i64,) =
        sqlx::query_as(&format!("SELECT count(*) FROM {qualified} WHERE is_current = true")).fetch_one(&pool).await?;
    assert_eq!(current_count, 2, "exactly one current business row per natural key");

    let (total_versions,): (i64,) = sqlx::query_as(&format!("SELECT count(*) FROM {qualified}")).fetch_one(&pool).await?;
    assert_eq!(total_versions, 3, "unchanged key-1 resync adds no version; changed key-2 resync adds one");

    Ok(())
}
