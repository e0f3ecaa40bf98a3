//! `elt job ...` — one-off sync jobs run directly against the Scheduler,
//! bypassing cron (§4.7 "Execution").

use anyhow::{anyhow, Result};
use elt_core::{JobStatus, SyncMode};
use elt_scheduler::{JobFilter, Scheduler};

pub fn parse_sync_mode(mode: &str) -> Result<SyncMode> {
    match mode.trim().to_lowercase().as_str() {
        "full_refresh" | "full-refresh" => Ok(SyncMode::FullRefresh),
        "incremental" => Ok(SyncMode::Incremental),
        other => Err(anyhow!("invalid --mode '{other}', expected 'full_refresh' or 'incremental'")),
    }
}

fn parse_status(status: &str) -> Result<JobStatus> {
    match status.trim().to_lowercase().as_str() {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
        other => Err(anyhow!("invalid --status '{other}'")),
    }
}

pub async fn run(scheduler: &Scheduler, source_id: &str, source_name: &str, streams: Vec<String>, sync_mode: SyncMode) -> Result<()> {
    let job = scheduler.create_job(source_id, source_name, streams, sync_mode).await;
    println!("job_id={}", job.job_id);
    let result = scheduler.run_job(&job.job_id, None).await?;
    print_job(&result);
    if result.status == JobStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn cancel(scheduler: &Scheduler, job_id: &str) -> Result<()> {
    let cancelled = scheduler.cancel_job(job_id).await;
    println!("cancelled={cancelled} job_id={job_id}");
    Ok(())
}

pub async fn show(scheduler: &Scheduler, job_id: &str) -> Result<()> {
    match scheduler.get_job(job_id).await {
        Some(job) => print_job(&job),
        None => println!("no job found with id '{job_id}'"),
    }
    Ok(())
}

pub async fn list(scheduler: &Scheduler, source_id: Option<&str>, status: Option<&str>, limit: Option<usize>) -> Result<()> {
    let filter = JobFilter {
        source_id: source_id.map(str::to_string),
        status: status.map(parse_status).transpose()?,
    };
    let jobs = scheduler.list_jobs(Some(filter), limit).await;
    for job in &jobs {
        print_job(job);
    }
    Ok(())
}

pub async fn history(scheduler: &Scheduler, source_id: Option<&str>, limit: usize) -> Result<()> {
    let jobs = scheduler.get_history(source_id, limit).await;
    for job in &jobs {
        print_job(job);
    }
    Ok(())
}

pub async fn stats(scheduler: &Scheduler) -> Result<()> {
    let stats = scheduler.get_stats().await;
    println!("total={}", stats.total);
    println!("running={}", stats.running);
    println!("completed={}", stats.completed);
    println!("failed={}", stats.failed);
    println!("total_records_synced={}", stats.total_records_synced);
    println!("active_schedules={}", stats.active_schedules);
    println!("total_schedules={}", stats.total_schedules);
    println!("max_concurrent_jobs={}", stats.max_concurrent_jobs);
    Ok(())
}

fn print_job(job: &elt_core::SyncJob) {
    println!(
        "job_id={} source_id={} status={:?} streams={} records_synced={} error={}",
        job.job_id,
        job.source_id,
        job.status,
        job.streams.join(","),
        job.records_synced,
        job.error.as_deref().unwrap_or("-"),
    );
}
