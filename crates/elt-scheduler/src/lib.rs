//! The Scheduler (§4.7): job queue, concurrency bound, cron schedules, and
//! history persistence. Resolves the scheduler/orchestrator cyclic-dependency
//! risk (§9) with a one-way dependency — the scheduler accepts an
//! `ExecutorFn` and never references the orchestrator crate; `elt-cli`
//! wires `elt_orchestrator::execute_full_sync` in as that function.

pub mod callback;
pub mod cron_schedule;
pub mod history;

pub use callback::{CallbackEvent, JobCallback};
pub use history::{HistoryStore, InMemoryHistoryStore, PgHistoryStore};

use crate::callback::CallbackRegistry;
use anyhow::{anyhow, Result};
use chrono::Utc;
use elt_core::{JobStatus, Schedule, SyncJob, SyncMode};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};
use uuid::Uuid;

/// How many terminal jobs the in-memory history keeps, mirroring the
/// original's "keep only last 100 jobs in history".
const HISTORY_CAP: usize = 100;

/// The outcome an `ExecutorFn` reports for one job (§4.7 "aggregates
/// per-stream results"). The scheduler does not know what "stream" means;
/// it only records the total and whatever metadata the executor chooses
/// to surface (e.g. per-stream advisory errors).
#[derive(Debug, Clone, Default)]
pub struct JobExecutionResult {
    pub records_synced: i64,
    pub metadata: serde_json::Value,
}

/// Any callable that can run a [`SyncJob`] to completion (§9). The default
/// production wiring is one call to `execute_full_sync` per configured
/// stream in the job; tests substitute scripted stand-ins.
pub type ExecutorFn = Arc<
    dyn Fn(SyncJob) -> Pin<Box<dyn Future<Output = Result<JobExecutionResult>> + Send>> + Send + Sync,
>;

/// `run_job`/`run_scheduled_sync` rejection when the concurrency bound is
/// at capacity (§4.7 "rejects with capacity_exceeded").
pub const CAPACITY_EXCEEDED: &str = "capacity_exceeded";

#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_records_synced: i64,
    pub active_schedules: usize,
    pub total_schedules: usize,
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub source_id: Option<String>,
    pub status: Option<JobStatus>,
}

struct Inner {
    max_concurrent_jobs: usize,
    default_executor: ExecutorFn,
    jobs: RwLock<HashMap<String, SyncJob>>,
    schedules: RwLock<HashMap<String, Schedule>>,
    job_history: RwLock<VecDeque<SyncJob>>,
    running: Mutex<HashSet<String>>,
    cancel_signals: Mutex<HashMap<String, Arc<Notify>>>,
    callbacks: RwLock<CallbackRegistry>,
    history_store: Option<Arc<dyn HistoryStore>>,
}

/// The Scheduler (§4.7). Cheaply `Clone`-able — every field lives behind
/// an `Arc` so a handle can be shared across the Tokio tasks driving
/// concurrent jobs and any cron-tick loop that calls `run_scheduled_sync`.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(max_concurrent_jobs: usize, default_executor: ExecutorFn) -> Self {
        Self::build(max_concurrent_jobs, default_executor, None)
    }

    pub fn with_history_store(max_concurrent_jobs: usize, default_executor: ExecutorFn, history_store: Arc<dyn HistoryStore>) -> Self {
        Self::build(max_concurrent_jobs, default_executor, Some(history_store))
    }

    fn build(max_concurrent_jobs: usize, default_executor: ExecutorFn, history_store: Option<Arc<dyn HistoryStore>>) -> Self {
        Scheduler {
            inner: Arc::new(Inner {
                max_concurrent_jobs,
                default_executor,
                jobs: RwLock::new(HashMap::new()),
                schedules: RwLock::new(HashMap::new()),
                job_history: RwLock::new(VecDeque::new()),
                running: Mutex::new(HashSet::new()),
                cancel_signals: Mutex::new(HashMap::new()),
                callbacks: RwLock::new(CallbackRegistry::new()),
                history_store,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Job lifecycle
    // ------------------------------------------------------------------

    pub async fn create_job(&self, source_id: &str, source_name: &str, streams: Vec<String>, sync_mode: SyncMode) -> SyncJob {
        let job_id = format!("sync_{}", &Uuid::new_v4().simple().to_string()[..12]);
        let job = SyncJob::new(job_id, source_id, source_name, streams, sync_mode);
        self.inner.jobs.write().await.insert(job.job_id.clone(), job.clone());
        tracing::info!(job_id = %job.job_id, source_id, "created sync job");
        job
    }

    /// Runs `job_id` (§4.7 "Execution"). `executor_fn` overrides the
    /// scheduler's default for this call only. Fails with
    /// [`CAPACITY_EXCEEDED`] without mutating job status if the
    /// concurrency bound is already at `max_concurrent_jobs` (§8
    /// "Concurrency bound": a rejected `run_job` leaves job status unchanged).
    pub async fn run_job(&self, job_id: &str, executor_fn: Option<ExecutorFn>) -> Result<SyncJob> {
        let job = self
            .inner
            .jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| anyhow!("job {job_id} not found"))?;

        if job.status == JobStatus::Running {
            return Err(anyhow!("job {job_id} is already running"));
        }
        if job.status.is_terminal() {
            return Err(anyhow!("job {job_id} already reached a terminal state"));
        }

        let notify = Arc::new(Notify::new());
        {
            let mut running = self.inner.running.lock().await;
            if running.len() >= self.inner.max_concurrent_jobs {
                return Err(anyhow!("{CAPACITY_EXCEEDED}: {} jobs already running (max {})", running.len(), self.inner.max_concurrent_jobs));
            }
            running.insert(job_id.to_string());
            self.inner.cancel_signals.lock().await.insert(job_id.to_string(), notify.clone());
        }

        let mut job = job;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        self.write_job(&job).await;
        self.inner.callbacks.read().await.fire_start(&job);

        let executor = executor_fn.unwrap_or_else(|| self.inner.default_executor.clone());
        let exec_future = executor(job.clone());

        tokio::select! {
            biased;
            _ = notify.notified() => {
                // cancel_job already flipped status to Cancelled; nothing
                // further to record here beyond bookkeeping.
            }
            outcome = exec_future => {
                match outcome {
                    Ok(result) => {
                        job.status = JobStatus::Completed;
                        job.records_synced = result.records_synced;
                        job.metadata = result.metadata;
                        job.completed_at = Some(Utc::now());
                        self.write_job(&job).await;
                        self.inner.callbacks.read().await.fire_complete(&job);
                    }
                    Err(err) => {
                        job.status = JobStatus::Failed;
                        job.error = Some(err.to_string());
                        job.completed_at = Some(Utc::now());
                        job.metadata = merge_error_type(job.metadata.clone(), &err);
                        self.write_job(&job).await;
                        self.inner.callbacks.read().await.fire_fail(&job);
                    }
                }
            }
        }

        self.inner.running.lock().await.remove(job_id);
        self.inner.cancel_signals.lock().await.remove(job_id);

        // Re-read: a concurrent cancel_job may have updated status while we
        // were awaiting the executor.
        let final_job = self.inner.jobs.read().await.get(job_id).cloned().unwrap_or(job);
        self.push_history(final_job.clone()).await;
        Ok(final_job)
    }

    /// Cancels a `pending` or `running` job (§4.7, §5 "Cancellation"). No
    /// cursor commit occurs: the executor future is simply dropped at its
    /// next suspension point by `run_job`'s `select!`, so any pending
    /// commit step never executes.
    pub async fn cancel_job(&self, job_id: &str) -> bool {
        let mut jobs = self.inner.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else { return false };
        if job.status.is_terminal() {
            return false;
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        drop(jobs);

        self.inner.running.lock().await.remove(job_id);
        if let Some(notify) = self.inner.cancel_signals.lock().await.get(job_id) {
            notify.notify_one();
        }
        tracing::info!(job_id, "cancelled sync job");
        true
    }

    pub async fn get_job(&self, job_id: &str) -> Option<SyncJob> {
        self.inner.jobs.read().await.get(job_id).cloned()
    }

    pub async fn list_jobs(&self, filter: Option<JobFilter>, limit: Option<usize>) -> Vec<SyncJob> {
        let jobs = self.inner.jobs.read().await;
        let mut matching: Vec<SyncJob> = jobs
            .values()
            .filter(|j| match &filter {
                None => true,
                Some(f) => {
                    f.source_id.as_deref().map_or(true, |s| j.source_id == s)
                        && f.status.map_or(true, |s| j.status == s)
                }
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        matching
    }

    pub async fn get_running_jobs(&self) -> Vec<SyncJob> {
        self.list_jobs(Some(JobFilter { source_id: None, status: Some(JobStatus::Running) }), None).await
    }

    /// In-memory terminal-job history, capped at [`HISTORY_CAP`] (§4.7
    /// "get_history"). Durable persistence — when a [`HistoryStore`] is
    /// configured — is a separate write-through, not this read path.
    pub async fn get_history(&self, source_id: Option<&str>, limit: usize) -> Vec<SyncJob> {
        let history = self.inner.job_history.read().await;
        let mut matching: Vec<SyncJob> = history
            .iter()
            .filter(|j| source_id.map_or(true, |s| j.source_id == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        matching
    }

    async fn write_job(&self, job: &SyncJob) {
        self.inner.jobs.write().await.insert(job.job_id.clone(), job.clone());
    }

    async fn push_history(&self, job: SyncJob) {
        {
            let mut history = self.inner.job_history.write().await;
            history.push_back(job.clone());
            while history.len() > HISTORY_CAP {
                history.pop_front();
            }
        }
        if let Some(store) = &self.inner.history_store {
            if let Err(err) = store.record(&job).await {
                tracing::warn!(job_id = %job.job_id, error = %err, "history store write failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Schedules
    // ------------------------------------------------------------------

    pub async fn create_schedule(
        &self,
        source_id: &str,
        source_name: &str,
        streams: Vec<String>,
        sync_mode: SyncMode,
        cron_expression: &str,
    ) -> Result<Schedule> {
        if !cron_schedule::is_valid(cron_expression) {
            return Err(anyhow!("invalid cron expression: {cron_expression}"));
        }
        let schedule_id = format!("schedule_{}", &Uuid::new_v4().simple().to_string()[..8]);
        let mut schedule = Schedule::new(schedule_id.clone(), source_id, source_name, streams, sync_mode, cron_expression);
        schedule.next_run_at = cron_schedule::next_run_after(cron_expression, Utc::now());
        self.inner.schedules.write().await.insert(schedule_id, schedule.clone());
        tracing::info!(schedule_id = %schedule.schedule_id, source_id, cron_expression, "created schedule");
        Ok(schedule)
    }

    pub async fn update_schedule(
        &self,
        schedule_id: &str,
        enabled: Option<bool>,
        cron_expression: Option<&str>,
        streams: Option<Vec<String>>,
    ) -> Result<Option<Schedule>> {
        let mut schedules = self.inner.schedules.write().await;
        let Some(schedule) = schedules.get_mut(schedule_id) else { return Ok(None) };

        if let Some(enabled) = enabled {
            schedule.enabled = enabled;
        }
        if let Some(cron_expression) = cron_expression {
            if !cron_schedule::is_valid(cron_expression) {
                return Err(anyhow!("invalid cron expression: {cron_expression}"));
            }
            schedule.cron_expression = cron_expression.to_string();
            schedule.next_run_at = cron_schedule::next_run_after(cron_expression, Utc::now());
        }
        if let Some(streams) = streams {
            schedule.streams = streams;
        }
        Ok(Some(schedule.clone()))
    }

    pub async fn delete_schedule(&self, schedule_id: &str) -> bool {
        self.inner.schedules.write().await.remove(schedule_id).is_some()
    }

    pub async fn get_schedule(&self, schedule_id: &str) -> Option<Schedule> {
        self.inner.schedules.read().await.get(schedule_id).cloned()
    }

    pub async fn list_schedules(&self, source_id: Option<&str>) -> Vec<Schedule> {
        self.inner
            .schedules
            .read()
            .await
            .values()
            .filter(|s| source_id.map_or(true, |src| s.source_id == src))
            .cloned()
            .collect()
    }

    /// Manually trigger a schedule (§4.7). Creates a fresh job tagged
    /// `metadata.schedule_id`, runs it with the default executor, and
    /// advances `last_run_at`/`next_run_at`/`run_count` regardless of
    /// whether the run succeeded — a failing scheduled sync still occupies
    /// its slot in the cron timeline.
    pub async fn run_scheduled_sync(&self, schedule_id: &str) -> Result<Option<SyncJob>> {
        let Some(schedule) = self.get_schedule(schedule_id).await else { return Ok(None) };

        let job = self
            .create_job(&schedule.source_id, &schedule.source_name, schedule.streams.clone(), schedule.sync_mode)
            .await;
        self.tag_job_with_schedule(&job.job_id, schedule_id).await;

        let result = self.run_job(&job.job_id, None).await?;

        let mut schedules = self.inner.schedules.write().await;
        if let Some(schedule) = schedules.get_mut(schedule_id) {
            schedule.last_run_at = Some(Utc::now());
            schedule.next_run_at = cron_schedule::next_run_after(&schedule.cron_expression, Utc::now());
            schedule.run_count += 1;
        }
        Ok(Some(result))
    }

    async fn tag_job_with_schedule(&self, job_id: &str, schedule_id: &str) {
        let mut jobs = self.inner.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            job.metadata = serde_json::json!({ "schedule_id": schedule_id });
        }
    }

    // ------------------------------------------------------------------
    // Stats & callbacks
    // ------------------------------------------------------------------

    pub async fn get_stats(&self) -> SchedulerStats {
        // `jobs` retains every job ever created, terminal or not (only
        // `job_history` is capped), so it alone is the complete set —
        // chaining in `job_history` here would double-count every
        // terminal job.
        let jobs = self.inner.jobs.read().await;

        let mut stats = SchedulerStats {
            max_concurrent_jobs: self.inner.max_concurrent_jobs,
            ..Default::default()
        };
        for job in jobs.values() {
            stats.total += 1;
            match job.status {
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => {
                    stats.completed += 1;
                    stats.total_records_synced += job.records_synced;
                }
                JobStatus::Failed => stats.failed += 1,
                _ => {}
            }
        }

        let schedules = self.inner.schedules.read().await;
        stats.total_schedules = schedules.len();
        stats.active_schedules = schedules.values().filter(|s| s.enabled).count();
        stats
    }

    pub async fn register_callback(&self, event: &str, callback: JobCallback) {
        let Some(event) = CallbackEvent::parse(event) else {
            tracing::warn!(event, "ignoring registration for unknown scheduler event");
            return;
        };
        self.inner.callbacks.write().await.register(event, callback);
    }
}

fn merge_error_type(metadata: serde_json::Value, err: &anyhow::Error) -> serde_json::Value {
    let error_type = err
        .downcast_ref::<elt_core::ElError>()
        .map(|e| e.kind.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut map = match metadata {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    map.insert("error_type".to_string(), serde_json::Value::String(error_type));
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ok_executor() -> ExecutorFn {
        Arc::new(|_job| Box::pin(async move { Ok(JobExecutionResult { records_synced: 3, metadata: serde_json::json!({}) }) }))
    }

    fn failing_executor() -> ExecutorFn {
        Arc::new(|_job| Box::pin(async move { Err(anyhow!(elt_core::ElError::write("batch failed"))) }))
    }

    fn slow_executor(delay: Duration) -> ExecutorFn {
        Arc::new(move |_job| {
            let delay = delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(JobExecutionResult { records_synced: 1, metadata: serde_json::json!({}) })
            })
        })
    }

    #[tokio::test]
    async fn run_job_completes_and_records_count() {
        let scheduler = Scheduler::new(2, ok_executor());
        let job = scheduler.create_job("src-1", "Source", vec!["users".to_string()], SyncMode::FullRefresh).await;
        let result = scheduler.run_job(&job.job_id, None).await.unwrap();
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.records_synced, 3);
    }

    #[tokio::test]
    async fn run_job_records_failure_with_error_type() {
        let scheduler = Scheduler::new(2, failing_executor());
        let job = scheduler.create_job("src-1", "Source", vec!["users".to_string()], SyncMode::FullRefresh).await;
        let result = scheduler.run_job(&job.job_id, None).await.unwrap();
        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.metadata["error_type"], "WriteError");
    }

    #[tokio::test]
    async fn concurrency_bound_rejects_beyond_max_and_leaves_status_unchanged() {
        let scheduler = Scheduler::new(1, slow_executor(Duration::from_millis(200)));
        let job1 = scheduler.create_job("src-1", "Source", vec![], SyncMode::FullRefresh).await;
        let job2 = scheduler.create_job("src-1", "Source", vec![], SyncMode::FullRefresh).await;

        let sched = scheduler.clone();
        let job1_id = job1.job_id.clone();
        let handle = tokio::spawn(async move { sched.run_job(&job1_id, None).await });
        tokio::time::sleep(Duration::from_millis(30)).await;

        let rejection = scheduler.run_job(&job2.job_id, None).await;
        assert!(rejection.is_err());
        assert!(rejection.unwrap_err().to_string().contains(CAPACITY_EXCEEDED));

        let unchanged = scheduler.get_job(&job2.job_id).await.unwrap();
        assert_eq!(unchanged.status, JobStatus::Pending);

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancel_job_during_run_halts_without_completing() {
        let scheduler = Scheduler::new(2, slow_executor(Duration::from_millis(500)));
        let job = scheduler.create_job("src-1", "Source", vec![], SyncMode::FullRefresh).await;

        let sched = scheduler.clone();
        let job_id = job.job_id.clone();
        let handle = tokio::spawn(async move { sched.run_job(&job_id, None).await });
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(scheduler.cancel_job(&job.job_id).await);
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_job_on_unknown_job_returns_false() {
        let scheduler = Scheduler::new(2, ok_executor());
        assert!(!scheduler.cancel_job("missing").await);
    }

    #[tokio::test]
    async fn callbacks_fire_on_completion_and_failure() {
        let starts = Arc::new(AtomicUsize::new(0));
        let completes = Arc::new(AtomicUsize::new(0));
        let fails = Arc::new(AtomicUsize::new(0));

        let scheduler = Scheduler::new(2, ok_executor());
        {
            let starts = starts.clone();
            scheduler.register_callback("on_job_start", Arc::new(move |_| { starts.fetch_add(1, Ordering::SeqCst); })).await;
        }
        {
            let completes = completes.clone();
            scheduler.register_callback("on_job_complete", Arc::new(move |_| { completes.fetch_add(1, Ordering::SeqCst); })).await;
        }
        {
            let fails = fails.clone();
            scheduler.register_callback("on_job_fail", Arc::new(move |_| { fails.fetch_add(1, Ordering::SeqCst); })).await;
        }

        let job = scheduler.create_job("src-1", "Source", vec![], SyncMode::FullRefresh).await;
        scheduler.run_job(&job.job_id, None).await.unwrap();

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(completes.load(Ordering::SeqCst), 1);
        assert_eq!(fails.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn create_schedule_computes_next_run_at() {
        let scheduler = Scheduler::new(2, ok_executor());
        let schedule = scheduler.create_schedule("src-1", "Source", vec!["users".to_string()], SyncMode::Incremental, "0 * * * *").await.unwrap();
        assert!(schedule.next_run_at.is_some());
        assert_eq!(schedule.run_count, 0);
    }

    #[tokio::test]
    async fn create_schedule_rejects_invalid_cron() {
        let scheduler = Scheduler::new(2, ok_executor());
        let result = scheduler.create_schedule("src-1", "Source", vec![], SyncMode::Incremental, "garbage").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_scheduled_sync_tags_job_and_advances_run_count() {
        let scheduler = Scheduler::new(2, ok_executor());
        let schedule = scheduler.create_schedule("src-1", "Source", vec!["users".to_string()], SyncMode::Incremental, "0 * * * *").await.unwrap();

        let job = scheduler.run_scheduled_sync(&schedule.schedule_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let updated = scheduler.get_schedule(&schedule.schedule_id).await.unwrap();
        assert_eq!(updated.run_count, 1);
        assert!(updated.last_run_at.is_some());
    }

    #[tokio::test]
    async fn get_stats_aggregates_across_active_and_historical_jobs() {
        let scheduler = Scheduler::new(2, ok_executor());
        for _ in 0..3 {
            let job = scheduler.create_job("src-1", "Source", vec![], SyncMode::FullRefresh).await;
            scheduler.run_job(&job.job_id, None).await.unwrap();
        }
        let stats = scheduler.get_stats().await;
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.total_records_synced, 9);
        assert_eq!(stats.max_concurrent_jobs, 2);
    }

    #[tokio::test]
    async fn get_history_is_scoped_by_source_and_limit() {
        let scheduler = Scheduler::new(2, ok_executor());
        for source in ["a", "a", "b"] {
            let job = scheduler.create_job(source, "Source", vec![], SyncMode::FullRefresh).await;
            scheduler.run_job(&job.job_id, None).await.unwrap();
        }
        let history_a = scheduler.get_history(Some("a"), 10).await;
        assert_eq!(history_a.len(), 2);
        let limited = scheduler.get_history(None, 1).await;
        assert_eq!(limited.len(), 1);
    }
}
