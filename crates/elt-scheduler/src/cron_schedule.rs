//! Cron expression handling (§4.7 "Cron semantics"). `next_run_at` is
//! recomputed from `cron_expression` on creation, on update, and after
//! every run.

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use std::str::FromStr;

/// The `cron` crate parses six-field expressions (seconds first). Schedules
/// in this system are authored as standard five-field cron (§3 "Schedule",
/// the original's `"0 * * * *"` style) — prepend a `0` seconds field before
/// parsing, falling back to the raw expression in case a caller already
/// supplied six fields.
pub fn next_run_after(cron_expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    parse(cron_expression)?.after(&after).next()
}

fn parse(cron_expression: &str) -> Option<CronSchedule> {
    let trimmed = cron_expression.trim();
    if let Ok(schedule) = CronSchedule::from_str(trimmed) {
        return Some(schedule);
    }
    let with_seconds = format!("0 {trimmed}");
    CronSchedule::from_str(&with_seconds).ok()
}

/// Validates a cron expression without computing a run time; used to
/// reject a malformed `cron_expression` at `create_schedule`/`update_schedule`
/// time rather than silently leaving `next_run_at` unset.
pub fn is_valid(cron_expression: &str) -> bool {
    parse(cron_expression).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn five_field_hourly_expression_advances_to_the_top_of_the_next_hour() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 10, 15, 0).unwrap();
        let next = next_run_after("0 * * * *", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn invalid_expression_yields_none() {
        assert!(next_run_after("not a cron", Utc::now()).is_none());
        assert!(!is_valid("not a cron"));
    }

    #[test]
    fn daily_expression_advances_one_day() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 10, 15, 0).unwrap();
        let next = next_run_after("30 9 * * *", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap());
    }
}
