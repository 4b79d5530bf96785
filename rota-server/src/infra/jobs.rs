//! Periodic engine triggers.
//!
//! Each job is a plain interval loop around one engine hook. The engine
//! takes its own lock and logs persistence trouble, so a failed pass just
//! waits for the next tick.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use rota_core::AllocationEngine;

use crate::infra::config::JobsConfig;

#[derive(Debug)]
pub struct JobHandles {
    pub handles: Vec<JoinHandle<()>>,
}

impl JobHandles {
    pub fn abort_all(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Start the sweep, purge, daily reset and short-window reset loops.
pub fn spawn_jobs(engine: &AllocationEngine, jobs: &JobsConfig) -> JobHandles {
    let mut handles = Vec::with_capacity(4);

    handles.push(spawn_every(engine.clone(), jobs.sweep_interval, "sweep", |engine| async move {
        let report = engine.sweep_overdue().await;
        if report.reminded > 0 || report.escalated > 0 {
            info!(
                reminded = report.reminded,
                escalated = report.escalated,
                permanent = report.permanently_banned.len(),
                "overdue sweep"
            );
        }
    }));

    handles.push(spawn_every(engine.clone(), jobs.purge_interval, "purge", |engine| async move {
        let purged = engine.purge_stale_pending().await;
        if purged > 0 {
            info!(purged, "stale pending items purged");
        }
    }));

    let window_minutes = engine.config().quota.window_minutes;
    if window_minutes > 0 {
        let every = Duration::from_secs(window_minutes.saturating_mul(60));
        handles.push(spawn_every(engine.clone(), every, "window_reset", |engine| async move {
            let epoch = engine.reset_window_counters().await;
            debug!(epoch, "short window opened");
        }));
    }

    handles.push(spawn_daily_reset(engine.clone(), jobs.daily_reset_at));

    JobHandles { handles }
}

fn spawn_every<F, Fut>(
    engine: AllocationEngine,
    every: Duration,
    name: &'static str,
    job: F,
) -> JoinHandle<()>
where
    F: Fn(AllocationEngine) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; start one period in.
        interval.tick().await;
        info!(job = name, every_secs = every.as_secs(), "periodic job started");
        loop {
            interval.tick().await;
            job(engine.clone()).await;
        }
    })
}

fn spawn_daily_reset(engine: AllocationEngine, at: NaiveTime) -> JoinHandle<()> {
    tokio::spawn(async move {
        let offset_minutes = engine.config().logical_day.utc_offset_minutes;
        loop {
            let now = engine.now();
            let next = next_daily_run(now, offset_minutes, at);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(next = %next, "daily reset scheduled");
            tokio::time::sleep(wait).await;

            let report = engine.daily_reset().await;
            info!(
                offenses_cleared = report.offenses_cleared,
                counters_purged = report.counters_purged,
                "daily reset"
            );
        }
    })
}

/// Next instant strictly after `now` at which local wall-clock time (fixed
/// `offset_minutes` from UTC) reads `at`.
pub fn next_daily_run(now: DateTime<Utc>, offset_minutes: i32, at: NaiveTime) -> DateTime<Utc> {
    let offset = ChronoDuration::minutes(i64::from(offset_minutes));
    let local_now = now.naive_utc() + offset;

    let mut candidate = local_now.date().and_time(at);
    if candidate <= local_now {
        candidate += ChronoDuration::days(1);
    }
    (candidate - offset).and_utc()
}
