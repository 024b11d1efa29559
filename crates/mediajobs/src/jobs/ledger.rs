//! The job ledger: single ownership point for job rows.
//!
//! Callers receive `Job` snapshots and submit `JobUpdate` diffs. Every write
//! is a read-merge-write of one row performed while holding the connection
//! lock, and only the columns whose value changed are written.
//!
//! Progress reporting must never crash a conversion, so `update` logs
//! persistence failures instead of returning them.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::job_repo::{self, JobRow};
use crate::db::{format_timestamp, Database, DatabaseError};
use crate::progress::{
    append_eta, cap_stage_progress, compute_weighted_percent, estimate_remaining,
    infer_completed_weight, infer_stage_weight, plan_total_weight,
    should_allow_stage_progress_one, strip_previous_eta_suffix,
};
use crate::sanitize::truncate_error;

use super::events::{JobEvent, JobEventBroadcaster, JobEventKind};
use super::model::{Job, JobStatus, JobUpdate, MediaKind, StagePlanEntry, TargetRef};

/// Default attempt limit for new jobs.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Parameters for creating or re-creating the job of a (target, field) pair.
#[derive(Debug, Clone)]
pub struct UpsertJob {
    pub target: TargetRef,
    pub field_name: String,
    pub kind: MediaKind,
    pub status: JobStatus,
    pub task_id: Option<String>,
    pub source_path: Option<String>,
    pub max_attempts: Option<u32>,
    pub stage_plan: Vec<StagePlanEntry>,
}

impl UpsertJob {
    pub fn new(target: TargetRef, field_name: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            target,
            field_name: field_name.into(),
            kind,
            status: JobStatus::Queued,
            task_id: None,
            source_path: None,
            max_attempts: None,
            stage_plan: Vec::new(),
        }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn stage_plan(mut self, plan: Vec<StagePlanEntry>) -> Self {
        self.stage_plan = plan;
        self
    }
}

/// Durable record store with one job per (target, field).
#[derive(Clone)]
pub struct JobLedger {
    db: Database,
    events: Option<JobEventBroadcaster>,
}

impl JobLedger {
    pub fn new(db: Database) -> Self {
        Self { db, events: None }
    }

    /// Creates a ledger that publishes a `JobEvent` after every write.
    pub fn with_events(db: Database, events: JobEventBroadcaster) -> Self {
        Self {
            db,
            events: Some(events),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn events(&self) -> Option<&JobEventBroadcaster> {
        self.events.as_ref()
    }

    /// Creates or replaces the job for (target, field).
    ///
    /// The job id and `created_at` survive re-creation; progress, error,
    /// output and stage data are reset. Re-creating a failed or canceled job
    /// counts as a new attempt. Returns `None` if the write failed.
    pub fn upsert(&self, request: UpsertJob) -> Option<Job> {
        let now = Utc::now();
        let result = self.db.with_transaction(|conn| {
            let existing = job_repo::find_by_target(
                conn,
                &request.target.kind,
                &request.target.id,
                Some(&request.field_name),
            )?;

            let previous = existing.as_ref().map(Job::from_row).transpose()?;
            let job = build_upserted(&request, previous.as_ref(), now);
            let row = job.to_row();

            match existing {
                Some(old_row) => {
                    let changed = JobRow::changed_columns(&old_row, &row);
                    job_repo::update_columns(conn, &row.id, &changed)?;
                }
                None => job_repo::insert(conn, &row)?,
            }
            Ok(job)
        });

        match result {
            Ok(job) => {
                info!(
                    "Upserted job {} for {} field '{}' ({}, attempt {})",
                    job.id, job.target, job.field_name, job.status, job.attempt
                );
                self.publish(&job, JobEventKind::Upserted);
                Some(job)
            }
            Err(e) => {
                error!(
                    "Failed to upsert job for {} field '{}': {}",
                    request.target, request.field_name, e
                );
                None
            }
        }
    }

    /// Applies a sparse diff to a job. Never fails.
    ///
    /// `heartbeat_at` and `updated_at` are always refreshed. Returns the new
    /// snapshot, or `None` when the job is missing, already terminal, owned
    /// by a task other than the diff's `expected_task_id`, or the write failed.
    pub fn update(&self, job_id: &str, update: JobUpdate) -> Option<Job> {
        let now = Utc::now();
        let result = self.db.with_conn(|conn| {
            let Some(row) = job_repo::find_by_id(conn, job_id)? else {
                return Ok(UpdateOutcome::Missing);
            };
            let current = Job::from_row(&row)?;
            if !current.is_terminal() && !update.matches_task(current.task_id.as_deref()) {
                return Ok(UpdateOutcome::Superseded(current.task_id));
            }
            let Some(next) = merge_update(&current, &update, now) else {
                return Ok(UpdateOutcome::Terminal(current.status));
            };

            let changed = JobRow::changed_columns(&row, &next.to_row());
            job_repo::update_columns(conn, job_id, &changed)?;
            Ok(UpdateOutcome::Written(Box::new(next)))
        });

        match result {
            Ok(UpdateOutcome::Written(job)) => {
                let kind = if job.is_terminal() {
                    JobEventKind::Finished
                } else {
                    JobEventKind::Updated
                };
                self.publish(&job, kind);
                Some(*job)
            }
            Ok(UpdateOutcome::Terminal(status)) => {
                debug!("Dropped update for job {} (already {})", job_id, status);
                None
            }
            Ok(UpdateOutcome::Superseded(owner)) => {
                debug!(
                    "Dropped update for job {} from task {:?} (now owned by {:?})",
                    job_id, update.expected_task_id, owner
                );
                None
            }
            Ok(UpdateOutcome::Missing) => {
                warn!("Dropped update for unknown job {}", job_id);
                None
            }
            Err(e) => {
                error!("Failed to update job {}: {}", job_id, e);
                None
            }
        }
    }

    /// Applies a diff without the terminal guard or the monotonic rules.
    ///
    /// This is the only way to change a job that has already finished.
    pub fn admin_override(&self, job_id: &str, update: JobUpdate) -> Option<Job> {
        let now = Utc::now();
        let result = self.db.with_conn(|conn| {
            let Some(row) = job_repo::find_by_id(conn, job_id)? else {
                return Ok(None);
            };
            let current = Job::from_row(&row)?;
            let next = apply_override(&current, &update, now);
            let changed = JobRow::changed_columns(&row, &next.to_row());
            job_repo::update_columns(conn, job_id, &changed)?;
            Ok(Some(next))
        });

        match result {
            Ok(Some(job)) => {
                warn!(
                    "Administrative override applied to job {} (now {})",
                    job.id, job.status
                );
                self.publish(&job, JobEventKind::Overridden);
                Some(job)
            }
            Ok(None) => {
                warn!("Override requested for unknown job {}", job_id);
                None
            }
            Err(e) => {
                error!("Failed to override job {}: {}", job_id, e);
                None
            }
        }
    }

    /// The job for (target, field), or the most recently updated job of the
    /// target when no field is given.
    pub fn find_by_target(&self, target: &TargetRef, field_name: Option<&str>) -> Option<Job> {
        let result = self.db.with_conn(|conn| {
            job_repo::find_by_target(conn, &target.kind, &target.id, field_name)?
                .as_ref()
                .map(Job::from_row)
                .transpose()
        });
        result.unwrap_or_else(|e| {
            error!("Failed to look up job for {}: {}", target, e);
            None
        })
    }

    /// All jobs of a target, ordered by field name.
    pub fn list_for_target(&self, target: &TargetRef) -> Vec<Job> {
        let result = self.db.with_conn(|conn| {
            job_repo::list_by_target(conn, &target.kind, &target.id)?
                .iter()
                .map(Job::from_row)
                .collect::<Result<Vec<_>, DatabaseError>>()
        });
        result.unwrap_or_else(|e| {
            error!("Failed to list jobs for {}: {}", target, e);
            Vec::new()
        })
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        let result = self.db.with_conn(|conn| {
            job_repo::find_by_id(conn, job_id)?
                .as_ref()
                .map(Job::from_row)
                .transpose()
        });
        result.unwrap_or_else(|e| {
            error!("Failed to load job {}: {}", job_id, e);
            None
        })
    }

    /// Deletes terminal jobs that finished before `older_than`.
    pub fn prune_terminal(&self, older_than: DateTime<Utc>) -> usize {
        let cutoff = format_timestamp(older_than);
        match self
            .db
            .with_conn(|conn| job_repo::delete_terminal_before(conn, &cutoff))
        {
            Ok(count) => {
                if count > 0 {
                    info!("Pruned {} terminal jobs finished before {}", count, cutoff);
                }
                count
            }
            Err(e) => {
                error!("Failed to prune terminal jobs: {}", e);
                0
            }
        }
    }

    pub(crate) fn publish(&self, job: &Job, kind: JobEventKind) {
        if let Some(events) = &self.events {
            events.send(JobEvent::from_job(job, kind));
        }
    }
}

enum UpdateOutcome {
    Written(Box<Job>),
    Terminal(JobStatus),
    Superseded(Option<String>),
    Missing,
}

fn build_upserted(request: &UpsertJob, previous: Option<&Job>, now: DateTime<Utc>) -> Job {
    let attempt = match previous {
        Some(prev) if matches!(prev.status, JobStatus::Failed | JobStatus::Canceled) => {
            prev.attempt.saturating_add(1)
        }
        _ => 1,
    };
    let max_attempts = request
        .max_attempts
        .or_else(|| previous.map(|p| p.max_attempts))
        .unwrap_or(DEFAULT_MAX_ATTEMPTS);

    let plan = request.stage_plan.clone();
    let has_plan = !plan.is_empty();
    let status = request.status;

    Job {
        id: previous
            .map(|p| p.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        target: request.target.clone(),
        field_name: request.field_name.clone(),
        kind: request.kind,
        status,
        task_id: request.task_id.clone(),
        attempt,
        max_attempts,
        progress: if status == JobStatus::Done { 100 } else { 0 },
        message: None,
        error: None,
        heartbeat_at: (status == JobStatus::Processing).then_some(now),
        stage: None,
        stage_index: None,
        stage_count: has_plan.then(|| u32::try_from(plan.len()).unwrap_or(u32::MAX)),
        stage_weight: None,
        stage_progress: None,
        stage_started_at: None,
        stage_total_weight: has_plan.then(|| plan_total_weight(&plan)),
        stage_completed_weight: has_plan.then_some(0),
        stage_plan: plan,
        source_path: request
            .source_path
            .clone()
            .or_else(|| previous.and_then(|p| p.source_path.clone())),
        output_path: None,
        created_at: previous.map(|p| p.created_at).unwrap_or(now),
        started_at: (status == JobStatus::Processing).then_some(now),
        finished_at: status.is_terminal().then_some(now),
        duration_ms: None,
        updated_at: now,
    }
}

/// Merges a diff into a job snapshot.
///
/// Returns `None` when the job is terminal, or the diff is scoped to a task
/// that no longer owns the job, and the diff must be dropped.
pub fn merge_update(current: &Job, update: &JobUpdate, now: DateTime<Utc>) -> Option<Job> {
    if current.is_terminal() || !update.matches_task(current.task_id.as_deref()) {
        return None;
    }

    let mut next = current.clone();
    let status = update.status.unwrap_or(current.status);
    next.status = status;
    next.heartbeat_at = Some(now);
    next.updated_at = now;

    if let Some(message) = &update.message {
        next.message = Some(message.clone());
    }
    if let Some(err) = &update.error {
        next.error = Some(truncate_error(err));
    }
    if let Some(task_id) = &update.task_id {
        next.task_id = Some(task_id.clone());
    }
    if let Some(output) = &update.output_path {
        next.output_path = Some(output.clone());
    }

    // Plan and derived totals.
    if let Some(plan) = &update.stage_plan {
        next.stage_plan = plan.clone();
        if !plan.is_empty() {
            next.stage_total_weight = Some(plan_total_weight(plan));
            next.stage_count = Some(u32::try_from(plan.len()).unwrap_or(u32::MAX));
        }
    }
    if let Some(total) = update.stage_total_weight {
        next.stage_total_weight = Some(total);
    } else if next.stage_total_weight.is_none() && !next.stage_plan.is_empty() {
        next.stage_total_weight = Some(plan_total_weight(&next.stage_plan));
    }
    if let Some(count) = update.stage_count {
        next.stage_count = Some(count);
    } else if next.stage_count.is_none() && !next.stage_plan.is_empty() {
        next.stage_count = Some(u32::try_from(next.stage_plan.len()).unwrap_or(u32::MAX));
    }

    // Stage position.
    if let Some(stage) = &update.stage {
        next.stage = Some(stage.clone());
    }
    if let Some(index) = update.stage_index {
        next.stage_index = Some(index);
    }
    let stage_changed = next.stage.is_some() && next.stage != current.stage;
    if stage_changed {
        next.stage_started_at = Some(now);
        if update.stage_progress.is_none() {
            next.stage_progress = Some(0.0);
        }
    }

    if let Some(weight) = update.stage_weight {
        next.stage_weight = Some(weight);
    } else if stage_changed || next.stage_weight.is_none() {
        if let Some(key) = next.stage.as_deref() {
            let inferred = infer_stage_weight(&next.stage_plan, key);
            if inferred.is_some() || stage_changed {
                next.stage_weight = inferred;
            }
        }
    }

    let supplied_completed = update.stage_completed_weight.or_else(|| {
        update
            .stage_index
            .and_then(|index| infer_completed_weight(&next.stage_plan, index))
    });
    if let Some(completed) = supplied_completed {
        next.stage_completed_weight =
            Some(completed.max(current.stage_completed_weight.unwrap_or(0)));
    }

    if let Some(fraction) = update.stage_progress {
        let allow_one = should_allow_stage_progress_one(
            current.stage.as_deref(),
            next.stage.as_deref(),
            current.stage_completed_weight,
            next.stage_completed_weight,
            status,
        );
        next.stage_progress = Some(cap_stage_progress(fraction, allow_one));
    }

    // Overall percentage.
    next.progress = if status == JobStatus::Done {
        100
    } else {
        let candidate = compute_weighted_percent(&next)
            .or(update.progress)
            .unwrap_or(current.progress);
        candidate.min(99).max(current.progress.min(99))
    };

    // Lifecycle timestamps.
    if status == JobStatus::Processing && next.started_at.is_none() {
        next.started_at = Some(now);
    }
    if status.is_terminal() {
        next.finished_at = Some(now);
        next.duration_ms = next.started_at.map(|s| (now - s).num_milliseconds().max(0));
        next.message = next
            .message
            .as_deref()
            .map(strip_previous_eta_suffix)
            .filter(|m| !m.is_empty());
    }

    if status == JobStatus::Processing && next.progress > 0 && next.progress < 100 {
        if let Some(remaining) = next
            .started_at
            .and_then(|started| estimate_remaining(started, now, next.progress))
        {
            let base = next.message.as_deref().unwrap_or("");
            next.message = Some(append_eta(base, remaining));
        }
    }

    Some(next)
}

fn apply_override(current: &Job, update: &JobUpdate, now: DateTime<Utc>) -> Job {
    let mut next = current.clone();
    next.updated_at = now;

    if let Some(status) = update.status {
        next.status = status;
        if status.is_terminal() {
            next.finished_at = Some(now);
            next.duration_ms = next.started_at.map(|s| (now - s).num_milliseconds().max(0));
        } else {
            next.finished_at = None;
            next.duration_ms = None;
        }
    }
    if let Some(progress) = update.progress {
        next.progress = progress;
    }
    if let Some(message) = &update.message {
        next.message = Some(message.clone());
    }
    if let Some(err) = &update.error {
        next.error = Some(truncate_error(err));
    }
    if let Some(task_id) = &update.task_id {
        next.task_id = Some(task_id.clone());
    }
    if let Some(output) = &update.output_path {
        next.output_path = Some(output.clone());
    }
    if let Some(stage) = &update.stage {
        next.stage = Some(stage.clone());
    }
    if let Some(index) = update.stage_index {
        next.stage_index = Some(index);
    }
    if let Some(count) = update.stage_count {
        next.stage_count = Some(count);
    }
    if let Some(weight) = update.stage_weight {
        next.stage_weight = Some(weight);
    }
    if let Some(fraction) = update.stage_progress {
        next.stage_progress = Some(fraction.clamp(0.0, 1.0));
    }
    if let Some(plan) = &update.stage_plan {
        next.stage_plan = plan.clone();
    }
    if let Some(total) = update.stage_total_weight {
        next.stage_total_weight = Some(total);
    }
    if let Some(completed) = update.stage_completed_weight {
        next.stage_completed_weight = Some(completed);
    }
    next
}
