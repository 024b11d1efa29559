//! Heartbeat staleness reaper.
//!
//! Workers can die without reporting failure. The sweep fails every
//! processing job whose heartbeat went quiet, so its target is not blocked
//! forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::ReaperConfig;
use crate::db::{format_timestamp, job_repo, parse_timestamp};
use crate::jobs::{Job, JobEventKind, JobLedger};
use crate::progress::strip_previous_eta_suffix;

/// Fails processing jobs whose heartbeat is older than `stale_after` or
/// missing, at most `max_rows` per call. Returns the number of jobs failed.
///
/// Each row is failed with a conditional update, so a worker that completes
/// the job concurrently wins.
pub fn sweep_stale_jobs(ledger: &JobLedger, stale_after: Duration, max_rows: u32) -> usize {
    let now = Utc::now();
    let stale_ms = i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX);
    let cutoff = now - chrono::Duration::milliseconds(stale_ms);
    let cutoff_str = format_timestamp(cutoff);
    let now_str = format_timestamp(now);
    let error = format!("heartbeat stale for > {} seconds", stale_after.as_secs());

    let result = ledger.database().with_conn(|conn| {
        let candidates = job_repo::find_stale_processing(conn, &cutoff_str, max_rows)?;
        let mut failed = Vec::new();

        for row in candidates {
            let duration_ms = row
                .started_at
                .as_deref()
                .and_then(parse_timestamp)
                .map(|started| (now - started).num_milliseconds().max(0));
            let progress = row.progress.min(99);
            let message = row
                .message
                .as_deref()
                .map(strip_previous_eta_suffix)
                .filter(|m| !m.is_empty());

            if job_repo::fail_if_processing(
                conn,
                &row.id,
                &error,
                message.as_deref(),
                progress,
                &now_str,
                duration_ms,
            )? {
                if let Some(updated) = job_repo::find_by_id(conn, &row.id)? {
                    failed.push(Job::from_row(&updated)?);
                }
            } else {
                log::debug!("Job {} left processing before it could be reaped", row.id);
            }
        }
        Ok(failed)
    });

    match result {
        Ok(failed) => {
            for job in &failed {
                log::warn!(
                    "Reaped stale job {} for {} field '{}' (last heartbeat {:?})",
                    job.id,
                    job.target,
                    job.field_name,
                    job.heartbeat_at.map(format_timestamp)
                );
                ledger.publish(job, JobEventKind::Finished);
            }
            failed.len()
        }
        Err(e) => {
            log::error!("Stale job sweep failed: {}", e);
            0
        }
    }
}

/// Runs `sweep_stale_jobs` on a fixed interval in a background thread.
pub struct StaleJobReaper {
    ledger: JobLedger,
    config: ReaperConfig,
    shutdown: Arc<AtomicBool>,
}

impl StaleJobReaper {
    pub fn new(ledger: JobLedger, config: ReaperConfig) -> Self {
        Self {
            ledger,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the sweep loop in a background thread.
    /// The trigger receiver requests an immediate sweep.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let ledger = self.ledger.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.config.interval();
        let stale_after = self.config.stale_after();
        let max_rows = self.config.max_rows;

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to start reaper runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let mut interval_timer = tokio::time::interval(interval);
                interval_timer.tick().await; // skip immediate first tick

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        Ok(()) = trigger_rx.recv() => {
                            log::info!("Manual stale job sweep triggered");
                        },
                    }

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    let reaped = sweep_stale_jobs(&ledger, stale_after, max_rows);
                    if reaped > 0 {
                        log::info!("Stale job sweep failed {} jobs", reaped);
                    }
                }
            });
        })
    }

    /// Signals the reaper to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
