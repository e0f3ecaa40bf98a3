//! Durable job history (§4.7 "History persistence", §6 "Scheduled-runs
//! table shape"): every terminal job transition is appended as a row,
//! independent of the in-memory job history the scheduler also keeps.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elt_core::{JobStatus, SyncJob};
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

fn duration_seconds(job: &SyncJob) -> Option<f64> {
    let started = job.started_at?;
    let ended = job.completed_at.unwrap_or_else(Utc::now);
    Some((ended - started).num_milliseconds() as f64 / 1000.0)
}

/// Where completed/failed/cancelled jobs are durably recorded (§4.7, §6).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record(&self, job: &SyncJob) -> Result<()>;
    async fn history(&self, source_id: Option<&str>, limit: i64) -> Result<Vec<SyncJob>>;
}

/// Postgres-backed `scheduled_runs` table. Created lazily on first write
/// (§4.7 "Table is created on first write"), not at construction time.
pub struct PgHistoryStore {
    pool: PgPool,
    ensured: AtomicBool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        PgHistoryStore { pool, ensured: AtomicBool::new(false) }
    }

    async fn ensure_table(&self) -> Result<()> {
        if self.ensured.load(Ordering::Acquire) {
            return Ok(());
        }
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_runs (
                id UUID PRIMARY KEY,
                job_id TEXT NOT NULL,
                connector_id TEXT NOT NULL,
                source_name TEXT,
                streams TEXT[] NOT NULL,
                sync_mode TEXT NOT NULL,
                status TEXT NOT NULL,
                records_processed INTEGER DEFAULT 0,
                started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                duration_seconds NUMERIC,
                error_message TEXT,
                metadata JSON NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create scheduled_runs table failed")?;
        self.ensured.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn record(&self, job: &SyncJob) -> Result<()> {
        self.ensure_table().await?;
        let sync_mode = match job.sync_mode {
            elt_core::SyncMode::FullRefresh => "full_refresh",
            elt_core::SyncMode::Incremental => "incremental",
        };
        sqlx::query(
            r#"
            INSERT INTO scheduled_runs
                (id, job_id, connector_id, source_name, streams, sync_mode, status,
                 records_processed, started_at, completed_at, duration_seconds,
                 error_message, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&job.job_id)
        .bind(&job.source_id)
        .bind(&job.source_name)
        .bind(&job.streams)
        .bind(sync_mode)
        .bind(status_label(job.status))
        .bind(job.records_synced as i32)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(duration_seconds(job))
        .bind(&job.error)
        .bind(&job.metadata)
        .execute(&self.pool)
        .await
        .context("scheduled_runs insert failed")?;
        Ok(())
    }

    async fn history(&self, source_id: Option<&str>, limit: i64) -> Result<Vec<SyncJob>> {
        self.ensure_table().await?;
        let rows: Vec<(String, String, Option<String>, Vec<String>, String, String, i32, Option<DateTime<Utc>>, Option<DateTime<Utc>>, Option<String>, serde_json::Value, DateTime<Utc>)> = if let Some(source_id) = source_id {
            sqlx::query_as(
                r#"SELECT job_id, connector_id, source_name, streams, sync_mode, status,
                          records_processed, started_at, completed_at, error_message, metadata, created_at
                   FROM scheduled_runs WHERE connector_id = $1 ORDER BY created_at DESC LIMIT $2"#,
            )
            .bind(source_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as(
                r#"SELECT job_id, connector_id, source_name, streams, sync_mode, status,
                          records_processed, started_at, completed_at, error_message, metadata, created_at
                   FROM scheduled_runs ORDER BY created_at DESC LIMIT $1"#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .context("scheduled_runs query failed")?;

        Ok(rows
            .into_iter()
            .map(|(job_id, source_id, source_name, streams, sync_mode, status, records, started, completed, error, metadata, created_at)| {
                let sync_mode = if sync_mode == "incremental" { elt_core::SyncMode::Incremental } else { elt_core::SyncMode::FullRefresh };
                let status = match status.as_str() {
                    "running" => JobStatus::Running,
                    "completed" => JobStatus::Completed,
                    "failed" => JobStatus::Failed,
                    "cancelled" => JobStatus::Cancelled,
                    _ => JobStatus::Pending,
                };
                let mut job = SyncJob::new(job_id, source_id, source_name.unwrap_or_default(), streams, sync_mode);
                job.status = status;
                job.records_synced = records as i64;
                job.started_at = started;
                job.completed_at = completed;
                job.error = error;
                job.metadata = metadata;
                job.created_at = created_at;
                job
            })
            .collect())
    }
}

/// In-memory history store for tests and for deployments that run without
/// a database; the in-memory job history the scheduler already keeps
/// covers the common case, so this mainly exists to exercise the
/// `HistoryStore` seam without a live Postgres instance.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    rows: Arc<RwLock<Vec<SyncJob>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn record(&self, job: &SyncJob) -> Result<()> {
        self.rows.write().await.push(job.clone());
        Ok(())
    }

    async fn history(&self, source_id: Option<&str>, limit: i64) -> Result<Vec<SyncJob>> {
        let rows = self.rows.read().await;
        let mut matching: Vec<SyncJob> = rows
            .iter()
            .filter(|j| source_id.map_or(true, |s| j.source_id == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elt_core::SyncMode;

    fn sample_job(id: &str, source: &str) -> SyncJob {
        let mut job = SyncJob::new(id, source, "Source", vec!["users".to_string()], SyncMode::FullRefresh);
        job.status = JobStatus::Completed;
        job.records_synced = 7;
        job
    }

    #[tokio::test]
    async fn in_memory_store_filters_by_source_and_honors_limit() {
        let store = InMemoryHistoryStore::new();
        store.record(&sample_job("j1", "a")).await.unwrap();
        store.record(&sample_job("j2", "b")).await.unwrap();
        store.record(&sample_job("j3", "a")).await.unwrap();

        let all = store.history(None, 10).await.unwrap();
        assert_eq!(all.len(), 3);

        let only_a = store.history(Some("a"), 10).await.unwrap();
        assert_eq!(only_a.len(), 2);

        let limited = store.history(None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}
