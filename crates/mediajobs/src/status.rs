//! Target-scoped job status view for UI polling.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::StatusConfig;
use crate::jobs::{Job, JobLedger, JobStatus, MediaKind, StagePlanEntry, TargetRef};
use crate::progress::estimate_remaining;

/// Which jobs to list. A target is always required.
#[derive(Debug, Clone)]
pub struct JobStatusQuery {
    pub target: TargetRef,
    pub field: Option<String>,
    pub stale_threshold: Duration,
}

impl JobStatusQuery {
    pub fn new(target: TargetRef) -> Self {
        Self {
            target,
            field: None,
            stale_threshold: StatusConfig::default().stale_threshold(),
        }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }
}

/// One job as the UI sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: String,
    pub field_name: String,
    pub kind: MediaKind,
    pub status: JobStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub error: Option<String>,
    pub task_id: Option<String>,
    pub attempt: u32,
    pub max_attempts: u32,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
    pub can_retry: bool,
    pub source_path: Option<String>,
    pub output_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub eta_ms: Option<u64>,
    pub stage: Option<String>,
    pub stage_index: Option<u32>,
    pub stage_count: Option<u32>,
    pub stage_weight: Option<u32>,
    pub stage_progress: Option<f64>,
    pub stage_plan: Vec<StagePlanEntry>,
    pub stage_total_weight: Option<u32>,
    pub stage_completed_weight: Option<u32>,
}

impl JobStatusView {
    pub fn from_job(job: &Job, now: DateTime<Utc>, stale_threshold: Duration) -> Self {
        let processing = job.status == JobStatus::Processing;
        let threshold_ms = i64::try_from(stale_threshold.as_millis()).unwrap_or(i64::MAX);
        let is_stale = processing
            && job
                .heartbeat_at
                .map_or(true, |hb| (now - hb).num_milliseconds() > threshold_ms);
        let can_retry = matches!(job.status, JobStatus::Failed | JobStatus::Canceled)
            && job.attempt < job.max_attempts;
        let eta_ms = if processing {
            job.started_at
                .and_then(|started| estimate_remaining(started, now, job.progress))
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        } else {
            None
        };

        Self {
            id: job.id.clone(),
            field_name: job.field_name.clone(),
            kind: job.kind,
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            error: job.error.clone(),
            task_id: job.task_id.clone(),
            attempt: job.attempt,
            max_attempts: job.max_attempts,
            heartbeat_at: job.heartbeat_at,
            is_stale,
            can_retry,
            source_path: job.source_path.clone(),
            output_path: job.output_path.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            duration_ms: job.duration_ms,
            eta_ms,
            stage: job.stage.clone(),
            stage_index: job.stage_index,
            stage_count: job.stage_count,
            stage_weight: job.stage_weight,
            stage_progress: job.stage_progress,
            stage_plan: job.stage_plan.clone(),
            stage_total_weight: job.stage_total_weight,
            stage_completed_weight: job.stage_completed_weight,
        }
    }
}

/// Lists the jobs of one target, optionally narrowed to one field.
pub fn list_job_status(
    ledger: &JobLedger,
    query: &JobStatusQuery,
    now: DateTime<Utc>,
) -> Vec<JobStatusView> {
    let jobs = match &query.field {
        Some(field) => ledger
            .find_by_target(&query.target, Some(field))
            .into_iter()
            .collect(),
        None => ledger.list_for_target(&query.target),
    };

    jobs.iter()
        .map(|job| JobStatusView::from_job(job, now, query.stale_threshold))
        .collect()
}
