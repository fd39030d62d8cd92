use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::queue::{Job, JobQueue};

/// Default reminder horizons, in days before expiry.
pub const DEFAULT_DAYS: [u32; 2] = [30, 10];

/// Parse an `HH:MM` time of day (UTC).
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

/// Parse a comma-separated list of day counts such as `30,10`.
pub fn parse_days(raw: &str) -> Option<Vec<u32>> {
    let days = raw
        .split(',')
        .map(|d| d.trim().parse().ok())
        .collect::<Option<Vec<u32>>>()?;
    if days.is_empty() { None } else { Some(days) }
}

/// The first instant strictly after `now` whose UTC time of day is `at`.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today_at = now.date_naive().and_time(at).and_utc();
    if today_at > now {
        today_at
    } else {
        today_at + chrono::Duration::days(1)
    }
}

/// Like [`next_run_after`], but never on or before `last_run`, so a clock
/// stepping backwards cannot repeat a day's scan.
pub fn next_scheduled_run(
    now: DateTime<Utc>,
    at: NaiveTime,
    last_run: Option<NaiveDate>,
) -> DateTime<Utc> {
    let next = next_run_after(now, at);
    match last_run.and_then(|last| last.checked_add_days(Days::new(1))) {
        Some(earliest) if next.date_naive() < earliest => earliest.and_time(at).and_utc(),
        _ => next,
    }
}

/// Enqueue one expiry scan per entry of `days` every day at `at` UTC until
/// `shutdown` fires.
pub async fn run_daily(queue: JobQueue, at: NaiveTime, days: Vec<u32>, shutdown: CancellationToken) {
    let mut last_run: Option<NaiveDate> = None;
    loop {
        let now = Utc::now();
        let next = next_scheduled_run(now, at, last_run);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!("Next expiry scan at {}", next);

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        last_run = Some(next.date_naive());

        for &d in &days {
            if let Err(e) = queue.enqueue(Job::ExpiringScan(d)) {
                error!("Scheduler cannot enqueue expiry scan: {}", e);
                return;
            }
        }
    }
    info!("Expiry scheduler stopped");
}
