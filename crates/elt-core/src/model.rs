use elt_schemas::value::Fields;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Sync mode a stream is read under (§3, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    FullRefresh,
    Incremental,
}

/// How a destination should apply records for a configured stream (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationSyncMode {
    Append,
    Overwrite,
    AppendDedup,
}

/// A configured external system (§3 "Source").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub source_id: String,
    pub connector_name: String,
    pub config: HashMap<String, serde_json::Value>,
    pub streams: Vec<Stream>,
}

/// A named logical entity within a source (§3 "Stream").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub name: String,
    /// JSON-Schema-like field definition, kept opaque here (the connector
    /// owns its shape; the validated-layer schema inference reads actual
    /// record values rather than this definition).
    pub json_schema: serde_json::Value,
    pub supported_sync_modes: Vec<SyncMode>,
    pub source_defined_cursor: Option<String>,
    pub primary_key: Option<Vec<String>>,
}

/// A single selected stream within a configured catalog (§4.2
/// `configured_catalog`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiguredStream {
    pub stream: String,
    pub sync_mode: SyncMode,
    pub destination_sync_mode: DestinationSyncMode,
    pub cursor_field: Option<String>,
    pub primary_key: Option<Vec<String>>,
}

/// The subset of a source's catalog selected for one execution.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfiguredCatalog {
    pub streams: Vec<ConfiguredStream>,
}

/// A single extracted row (§3 "Record"). Records are immutable wire
/// values: once built, nothing downstream mutates a `Record` in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub stream: String,
    pub namespace: Option<String>,
    pub data: Fields,
    pub emitted_at: i64,
}

/// An opaque cursor scalar (§3 "Cursor"): a string, integer, or ISO
/// timestamp. Kept as a tagged enum rather than bare `serde_json::Value` so
/// "strictly advances" comparisons (the StreamState invariant) have a
/// defined ordering per variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CursorValue {
    String(String),
    Int(i64),
    Timestamp(chrono::DateTime<chrono::Utc>),
}

impl CursorValue {
    /// True if `self` represents progress beyond `prior` under the same
    /// variant. Cross-variant comparisons are never "advancing" — a cursor
    /// changing shape is a state error the caller should surface, not
    /// silently accept (§7 StateError).
    pub fn advances_over(&self, prior: &CursorValue) -> bool {
        match (self, prior) {
            (CursorValue::String(a), CursorValue::String(b)) => a > b,
            (CursorValue::Int(a), CursorValue::Int(b)) => a > b,
            (CursorValue::Timestamp(a), CursorValue::Timestamp(b)) => a > b,
            _ => false,
        }
    }
}

/// Per `(source, stream)` replication state (§3 "StreamState").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamState {
    pub cursor_field: Option<String>,
    pub cursor_value: Option<CursorValue>,
    pub sync_mode: SyncMode,
    pub last_synced_at: Option<chrono::DateTime<chrono::Utc>>,
    pub records_synced: i64,
    pub metadata: serde_json::Value,
}

impl StreamState {
    pub fn new(sync_mode: SyncMode) -> Self {
        StreamState {
            cursor_field: None,
            cursor_value: None,
            sync_mode,
            last_synced_at: None,
            records_synced: 0,
            metadata: serde_json::json!({}),
        }
    }
}

/// Full per-source replication state (§3 "SourceState"). `version`
/// increments on every mutation so late writers are detectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceState {
    pub source_name: String,
    pub source_id: String,
    pub streams: HashMap<String, StreamState>,
    pub global_state: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub version: i64,
}

impl SourceState {
    pub fn new(source_name: impl Into<String>, source_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        SourceState {
            source_name: source_name.into(),
            source_id: source_id.into(),
            streams: HashMap::new(),
            global_state: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

/// Mint a fresh run id (§3 "RunId"): a UUID stamped on every row written
/// during one sync, across all three layers.
pub fn new_run_id() -> Uuid {
    Uuid::new_v4()
}
