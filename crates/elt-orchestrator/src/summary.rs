//! The result shape `execute_full_sync` returns (§4.4, §7 failure semantics).

use elt_core::model::CursorValue;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Succeeded,
    Failed,
}

/// Per-stream outcome, including whatever advisory steps ran alongside the
/// must-succeed write path.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSyncResult {
    pub stream: String,
    pub records_read: u64,
    /// Step 8 (§4.4): must-succeed, unconditional for every stream.
    pub validated_written: elt_db::WriteCounts,
    /// Step 9 (§4.4): must-succeed, unconditional for every stream.
    pub business_written: elt_db::WriteCounts,
    /// Set only when the stream opted into deduplicated write (§4.3):
    /// additive on top of validated+business, never a substitute for them.
    pub dedup_written: Option<elt_db::WriteCounts>,
    pub pii_detection_count: u64,
    pub quality_score: Option<f64>,
    pub cursor_field: Option<String>,
    pub cursor_value: Option<CursorValue>,
    /// Advisory failures captured rather than propagated (§7 `ErrorKind::Advisory`):
    /// keys are the step name (`pii_detection`, `quality_validation`, `lineage`).
    pub advisory_errors: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub run_id: Uuid,
    pub source_id: String,
    pub status: SyncStatus,
    pub streams: Vec<StreamSyncResult>,
    /// Set when `status == Failed`: the must-succeed step and error that
    /// aborted the run.
    pub error: Option<String>,
}

impl SyncSummary {
    pub fn failed(run_id: Uuid, source_id: impl Into<String>, error: impl Into<String>, streams: Vec<StreamSyncResult>) -> Self {
        SyncSummary {
            run_id,
            source_id: source_id.into(),
            status: SyncStatus::Failed,
            streams,
            error: Some(error.into()),
        }
    }

    pub fn succeeded(run_id: Uuid, source_id: impl Into<String>, streams: Vec<StreamSyncResult>) -> Self {
        SyncSummary {
            run_id,
            source_id: source_id.into(),
            status: SyncStatus::Succeeded,
            streams,
            error: None,
        }
    }

    pub fn total_records_synced(&self) -> u64 {
        self.streams.iter().map(|s| s.records_read).sum()
    }
}
