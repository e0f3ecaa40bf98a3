//! `elt schedule ...` — cron-driven [`elt_core::Schedule`] management (§4.7).
//! A `schedule run` call fires the schedule immediately, outside its cron
//! timeline, but still advances `last_run_at`/`next_run_at`/`run_count`.

use anyhow::Result;
use elt_core::SyncMode;
use elt_scheduler::Scheduler;

pub async fn create(scheduler: &Scheduler, source_id: &str, source_name: &str, streams: Vec<String>, sync_mode: SyncMode, cron_expression: &str) -> Result<()> {
    let schedule = scheduler.create_schedule(source_id, source_name, streams, sync_mode, cron_expression).await?;
    print_schedule(&schedule);
    Ok(())
}

pub async fn update(scheduler: &Scheduler, schedule_id: &str, enabled: Option<bool>, cron_expression: Option<&str>, streams: Option<Vec<String>>) -> Result<()> {
    match scheduler.update_schedule(schedule_id, enabled, cron_expression, streams).await? {
        Some(schedule) => print_schedule(&schedule),
        None => println!("no schedule found with id '{schedule_id}'"),
    }
    Ok(())
}

pub async fn delete(scheduler: &Scheduler, schedule_id: &str) -> Result<()> {
    let deleted = scheduler.delete_schedule(schedule_id).await;
    println!("deleted={deleted} schedule_id={schedule_id}");
    Ok(())
}

pub async fn show(scheduler: &Scheduler, schedule_id: &str) -> Result<()> {
    match scheduler.get_schedule(schedule_id).await {
        Some(schedule) => print_schedule(&schedule),
        None => println!("no schedule found with id '{schedule_id}'"),
    }
    Ok(())
}

pub async fn list(scheduler: &Scheduler, source_id: Option<&str>) -> Result<()> {
    let schedules = scheduler.list_schedules(source_id).await;
    for schedule in &schedules {
        print_schedule(schedule);
    }
    Ok(())
}

pub async fn run(scheduler: &Scheduler, schedule_id: &str) -> Result<()> {
    match scheduler.run_scheduled_sync(schedule_id).await? {
        Some(job) => println!("job_id={} status={:?} records_synced={}", job.job_id, job.status, job.records_synced),
        None => println!("no schedule found with id '{schedule_id}'"),
    }
    Ok(())
}

fn print_schedule(schedule: &elt_core::Schedule) {
    println!(
        "schedule_id={} source_id={} cron='{}' enabled={} streams={} next_run_at={} run_count={}",
        schedule.schedule_id,
        schedule.source_id,
        schedule.cron_expression,
        schedule.enabled,
        schedule.streams.join(","),
        schedule.next_run_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
        schedule.run_count,
    );
}
