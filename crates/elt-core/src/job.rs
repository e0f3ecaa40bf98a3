use crate::model::SyncMode;
use serde::{Deserialize, Serialize};

/// `SyncJob` status state machine (§3): `pending -> running ->
/// {completed|failed|cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// One scheduler-owned unit of work (§3 "SyncJob").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub job_id: String,
    pub source_id: String,
    pub source_name: String,
    pub streams: Vec<String>,
    pub sync_mode: SyncMode,
    pub status: JobStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub records_synced: i64,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
}

impl SyncJob {
    pub fn new(
        job_id: impl Into<String>,
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        streams: Vec<String>,
        sync_mode: SyncMode,
    ) -> Self {
        SyncJob {
            job_id: job_id.into(),
            source_id: source_id.into(),
            source_name: source_name.into(),
            streams,
            sync_mode,
            status: JobStatus::Pending,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            records_synced: 0,
            error: None,
            metadata: serde_json::json!({}),
        }
    }
}

/// A cron-scheduled job template, owning zero-or-more historical
/// [`SyncJob`]s (§3 "Schedule").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub schedule_id: String,
    pub source_id: String,
    pub source_name: String,
    pub streams: Vec<String>,
    pub sync_mode: SyncMode,
    pub cron_expression: String,
    pub enabled: bool,
    pub last_run_at: Option<chrono::DateTime<chrono::Utc>>,
    pub next_run_at: Option<chrono::DateTime<chrono::Utc>>,
    pub run_count: i64,
}

impl Schedule {
    pub fn new(
        schedule_id: impl Into<String>,
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        streams: Vec<String>,
        sync_mode: SyncMode,
        cron_expression: impl Into<String>,
    ) -> Self {
        Schedule {
            schedule_id: schedule_id.into(),
            source_id: source_id.into(),
            source_name: source_name.into(),
            streams,
            sync_mode,
            cron_expression: cron_expression.into(),
            enabled: true,
            last_run_at: None,
            next_run_at: None,
            run_count: 0,
        }
    }
}
