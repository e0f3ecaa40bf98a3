//! Scheduler event callbacks (§4.7, SPEC_FULL §4 "callbacks as a small
//! pub/sub table"): any number of listeners may register against a fixed
//! set of events; a listener that panics is isolated from its siblings and
//! from the job it is observing.

use elt_core::SyncJob;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// The fixed event names a callback may register against (§4.7). Spec
/// names exactly these three; `register_callback` on an unknown event name
/// is a silent no-op, mirroring the original's `if event in self._callbacks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackEvent {
    OnJobStart,
    OnJobComplete,
    OnJobFail,
}

impl CallbackEvent {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "on_job_start" => Some(CallbackEvent::OnJobStart),
            "on_job_complete" => Some(CallbackEvent::OnJobComplete),
            "on_job_fail" => Some(CallbackEvent::OnJobFail),
            _ => None,
        }
    }
}

/// A registered listener. The job is already in its terminal (or running,
/// for `on_job_start`) state by the time this fires, with `error` already
/// populated for `on_job_fail` — callbacks observe, they never mutate or
/// suppress (§7).
pub type JobCallback = Arc<dyn Fn(&SyncJob) + Send + Sync>;

#[derive(Default)]
pub struct CallbackRegistry {
    start: Vec<JobCallback>,
    complete: Vec<JobCallback>,
    fail: Vec<JobCallback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event: CallbackEvent, callback: JobCallback) {
        match event {
            CallbackEvent::OnJobStart => self.start.push(callback),
            CallbackEvent::OnJobComplete => self.complete.push(callback),
            CallbackEvent::OnJobFail => self.fail.push(callback),
        }
    }

    fn fire(listeners: &[JobCallback], job: &SyncJob) {
        for callback in listeners {
            if catch_unwind(AssertUnwindSafe(|| callback(job))).is_err() {
                tracing::warn!(job_id = %job.job_id, "scheduler callback panicked, isolating");
            }
        }
    }

    pub fn fire_start(&self, job: &SyncJob) {
        Self::fire(&self.start, job);
    }

    pub fn fire_complete(&self, job: &SyncJob) {
        Self::fire(&self.complete, job);
    }

    pub fn fire_fail(&self, job: &SyncJob) {
        Self::fire(&self.fail, job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elt_core::SyncMode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_job() -> SyncJob {
        SyncJob::new("job-1", "src-1", "Source One", vec!["users".to_string()], SyncMode::FullRefresh)
    }

    #[test]
    fn fires_all_registered_listeners_for_an_event() {
        let mut registry = CallbackRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            registry.register(CallbackEvent::OnJobComplete, Arc::new(move |_job| {
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }
        registry.fire_complete(&sample_job());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn a_panicking_listener_does_not_block_the_others() {
        let mut registry = CallbackRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(CallbackEvent::OnJobFail, Arc::new(|_job| panic!("boom")));
        {
            let calls = calls.clone();
            registry.register(CallbackEvent::OnJobFail, Arc::new(move |_job| {
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }
        registry.fire_fail(&sample_job());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_event_name_does_not_parse() {
        assert!(CallbackEvent::parse("on_job_retry").is_none());
    }
}
