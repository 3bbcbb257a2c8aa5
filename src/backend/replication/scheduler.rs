/**
 * Backup Scheduler
 * 
 * Runs `ReplicationSync::full_backup` once after a startup delay and then on a
 * fixed interval for the life of the process. Each run is spawned on its own,
 * so a run that outlasts the interval overlaps with the next one. Full
 * backups are idempotent upserts, which makes that overlap harmless.
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::backend::replication::sync::ReplicationSync;

/// Bounds applied to the run interval. Zero would make `interval_at` panic.
const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MAX_INTERVAL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

#[derive(Debug)]
pub struct BackupScheduler {
    sync: Arc<ReplicationSync>,
    startup_delay: Duration,
}

/// Handle to a running schedule
#[derive(Debug)]
pub struct BackupHandle {
    task: JoinHandle<()>,
    runs_started: Arc<AtomicUsize>,
}

impl BackupHandle {
    /// Number of backup runs started so far
    pub fn runs_started(&self) -> usize {
        self.runs_started.load(Ordering::SeqCst)
    }

    /// Stop scheduling new runs. Runs already started finish on their own.
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl BackupScheduler {
    pub fn new(sync: Arc<ReplicationSync>, startup_delay: Duration) -> Self {
        Self { sync, startup_delay }
    }

    /// Start the schedule: one run after the startup delay, then one every `interval`.
    ///
    /// `interval` is clamped to between one second and a year.
    pub fn schedule(&self, interval: Duration) -> BackupHandle {
        let interval = clamp_interval(interval);
        let sync = Arc::clone(&self.sync);
        let startup_delay = self.startup_delay;
        let runs_started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs_started);

        tracing::info!(
            "[Backup] Scheduling full backups every {:?}, first run in {:?}",
            interval,
            startup_delay
        );

        let task = tokio::spawn(async move {
            tokio::time::sleep(startup_delay).await;
            spawn_run(&sync, &counter);

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                spawn_run(&sync, &counter);
            }
        });

        BackupHandle { task, runs_started }
    }
}

fn clamp_interval(interval: Duration) -> Duration {
    let clamped = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
    if clamped != interval {
        tracing::warn!("[Backup] Interval {:?} out of range, using {:?}", interval, clamped);
    }
    clamped
}

fn spawn_run(sync: &Arc<ReplicationSync>, counter: &Arc<AtomicUsize>) {
    let run = counter.fetch_add(1, Ordering::SeqCst) + 1;
    let sync = Arc::clone(sync);
    tokio::spawn(async move {
        tracing::info!("[Backup] Scheduled run #{} starting", run);
        if !sync.full_backup().await {
            tracing::warn!("[Backup] Scheduled run #{} did not complete cleanly", run);
        }
    });
}
