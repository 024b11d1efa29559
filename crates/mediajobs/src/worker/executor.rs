//! Drives one queued task through the ledger, a runner and the binder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, info_span, warn};

use crate::availability::{AvailabilityTrigger, CommitScope, TargetRegistry};
use crate::binder::{BindOutcome, OutputBinder};
use crate::error::{StorageError, TargetError, TranscodeError};
use crate::jobs::{Job, JobLedger, JobStatus, JobUpdate, StagePlanEntry};
use crate::sanitize::{self, truncate_error};
use crate::storage::MediaStorage;

use super::request::{QueuedTask, TaskOutcome, UploadConfig};
use super::runners::{RunOutput, RunnerRegistry};

/// Checkpoint API handed to runners.
///
/// Every call is best-effort: ledger failures are logged by the ledger and
/// never surface here.
pub struct RunContext<'a> {
    ledger: &'a JobLedger,
    storage: &'a dyn MediaStorage,
    registry: &'a TargetRegistry,
    job: &'a Job,
    task: &'a QueuedTask,
    source: PathBuf,
    work_dir: PathBuf,
}

impl<'a> RunContext<'a> {
    pub fn job(&self) -> &Job {
        self.job
    }

    pub fn upload_config(&self) -> &UploadConfig {
        &self.task.upload_config
    }

    pub fn plan(&self) -> &[StagePlanEntry] {
        &self.job.stage_plan
    }

    /// Absolute location of the uploaded source file.
    pub fn source_path(&self) -> &Path {
        &self.source
    }

    /// Scratch directory for codec output, removed after the run.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Storage directory that receives this run's artifacts.
    pub fn output_dir(&self) -> String {
        let run = self.task.task_id.split('-').next().unwrap_or(&self.task.task_id);
        format!(
            "{}/{}/{}/{}",
            self.job.target.kind, self.job.target.id, self.job.field_name, run
        )
    }

    pub fn heartbeat(&self) {
        self.ledger.update(&self.job.id, self.scoped(JobUpdate::heartbeat()));
    }

    /// Announces the stage with `key`. The plan position is looked up so the
    /// ledger can derive weights.
    pub fn enter_stage(&self, key: &str) {
        let update = match self.plan().iter().position(|e| e.key == key) {
            Some(index) => {
                JobUpdate::new().stage(u32::try_from(index).unwrap_or(u32::MAX), key)
            }
            None => JobUpdate {
                stage: Some(key.to_string()),
                ..JobUpdate::default()
            },
        };
        debug!("Job {} entering stage {}", self.job.id, key);
        self.ledger
            .update(&self.job.id, self.scoped(update.message(stage_message(key))));
    }

    /// Reports the completed fraction of the current stage.
    pub fn report_stage_progress(&self, fraction: f64) {
        self.ledger.update(
            &self.job.id,
            self.scoped(JobUpdate::new().stage_progress(fraction)),
        );
    }

    /// Moves a produced file into storage under `output_dir()`.
    pub fn import_artifact(&self, file: &Path) -> Result<String, StorageError> {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidPath(file.display().to_string()))?;
        self.storage.import(file, &self.output_dir(), name)
    }

    pub fn target_exists(&self) -> bool {
        self.registry.exists(&self.job.target)
    }

    /// Fails with `TargetGone` when the target was deleted mid-run.
    pub fn ensure_target(&self) -> Result<(), TranscodeError> {
        if self.target_exists() {
            Ok(())
        } else {
            Err(TranscodeError::TargetGone)
        }
    }

    /// Fails with `Superseded` once the job was re-enqueued under another
    /// task while this run was in flight.
    pub fn ensure_current(&self) -> Result<(), TranscodeError> {
        if is_current(self.ledger, self.task) {
            Ok(())
        } else {
            Err(TranscodeError::Superseded)
        }
    }

    fn scoped(&self, update: JobUpdate) -> JobUpdate {
        update.for_task(self.task.task_id.as_str())
    }
}

fn is_current(ledger: &JobLedger, task: &QueuedTask) -> bool {
    ledger
        .get(&task.job_id)
        .is_some_and(|job| job.task_id.as_deref() == Some(task.task_id.as_str()))
}

fn stage_message(key: &str) -> String {
    match key {
        "finalize" => "Finalizing output".to_string(),
        "transcode" => "Transcoding".to_string(),
        other => match other.strip_prefix("video_") {
            Some(rendition) => format!("Encoding {}p rendition", rendition),
            None => format!("Running {}", other),
        },
    }
}

/// Executes queued tasks. Shared by all pool workers.
pub struct TaskExecutor {
    ledger: JobLedger,
    storage: Arc<dyn MediaStorage>,
    registry: Arc<TargetRegistry>,
    runners: RunnerRegistry,
    binder: OutputBinder,
    trigger: AvailabilityTrigger,
    work_root: PathBuf,
}

impl TaskExecutor {
    pub fn new(
        ledger: JobLedger,
        storage: Arc<dyn MediaStorage>,
        registry: Arc<TargetRegistry>,
        runners: RunnerRegistry,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        let binder = OutputBinder::new(Arc::clone(&storage), Arc::clone(&registry));
        let trigger = AvailabilityTrigger::new(ledger.clone(), Arc::clone(&registry));
        Self {
            ledger,
            storage,
            registry,
            runners,
            binder,
            trigger,
            work_root: work_root.into(),
        }
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    /// Runs one task to a terminal state.
    pub fn execute(&self, task: &QueuedTask) -> TaskOutcome {
        let _span = info_span!("conversion",
            job_id = %task.job_id,
            target = %task.target,
            field = %task.field_name,
            kind = %task.kind,
        )
        .entered();

        let Some(job) = self.ledger.get(&task.job_id) else {
            warn!("Job {} vanished before it could run", task.job_id);
            return TaskOutcome::failed(task, "job not found");
        };
        if job.task_id.as_deref() != Some(task.task_id.as_str()) {
            info!("Task {} was superseded; skipping", task.task_id);
            return TaskOutcome::new(task, job.status);
        }
        if job.is_terminal() {
            debug!("Job {} already {}; skipping", job.id, job.status);
            return TaskOutcome::new(task, job.status);
        }

        match self.registry.resolve(&job.target) {
            Ok(_) => {}
            Err(TargetError::NotFound { .. }) => return self.cancel(task, &job),
            Err(e) => return self.fail(task, &job, &e.to_string()),
        }

        let Some(job) = self.ledger.update(
            &job.id,
            JobUpdate::new()
                .status(JobStatus::Processing)
                .message("Starting conversion")
                .for_task(task.task_id.as_str()),
        ) else {
            return self.superseded(task);
        };

        let Some(runner) = self.runners.get(task.kind) else {
            return self.fail(task, &job, &format!("no runner for {} jobs", task.kind));
        };

        let source = match self.resolve_source(&task.source_path) {
            Ok(source) => source,
            Err(e) => return self.fail(task, &job, &e.to_string()),
        };

        let work_dir = self.work_root.join(&job.id);
        if let Err(e) = std::fs::create_dir_all(&work_dir) {
            return self.fail(task, &job, &format!("cannot create work dir: {}", e));
        }

        info!(
            "Running {} conversion of {}",
            task.kind,
            sanitize::redact_path(&source)
        );

        let ctx = RunContext {
            ledger: &self.ledger,
            storage: self.storage.as_ref(),
            registry: &self.registry,
            job: &job,
            task,
            source,
            work_dir: work_dir.clone(),
        };
        let result = runner.run(&ctx);

        let outcome = match result {
            Ok(output) => self.complete(task, &job, output),
            Err(TranscodeError::TargetGone) => self.cancel(task, &job),
            Err(TranscodeError::Superseded) => self.superseded(task),
            Err(e) => self.fail(task, &job, &e.to_string()),
        };

        if let Err(e) = std::fs::remove_dir_all(&work_dir) {
            debug!("Could not remove work dir for job {}: {}", job.id, e);
        }
        outcome
    }

    fn resolve_source(&self, source_path: &str) -> Result<PathBuf, StorageError> {
        let path = Path::new(source_path);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.storage.resolve(source_path)?
        };
        if resolved.is_file() {
            Ok(resolved)
        } else {
            Err(StorageError::SourceMissing(resolved))
        }
    }

    fn complete(&self, task: &QueuedTask, job: &Job, output: RunOutput) -> TaskOutcome {
        let _span = info_span!("bind_output").entered();

        if !is_current(&self.ledger, task) {
            return self.superseded(task);
        }

        match self.binder.bind_output(
            &job.target,
            &job.field_name,
            &output.primary,
            task.upload_config.mark_converted,
        ) {
            BindOutcome::Bound { .. } => {}
            BindOutcome::TargetGone => return self.cancel(task, job),
            BindOutcome::MissingArtifact => {
                return self.fail(task, job, "converted artifact missing from storage")
            }
            BindOutcome::Rejected { reason } => return self.fail(task, job, &reason),
        }

        for attachment in &output.attachments {
            let outcome = self.binder.bind_output(
                &job.target,
                &attachment.field,
                &attachment.relative_path,
                false,
            );
            if !outcome.is_bound() {
                warn!(
                    "Could not bind {} to field '{}': {:?}",
                    attachment.relative_path, attachment.field, outcome
                );
            }
        }

        let mut scope = CommitScope::new();
        let done = self.ledger.update(
            &job.id,
            JobUpdate::new()
                .status(JobStatus::Done)
                .output_path(output.primary.clone())
                .message("Conversion complete")
                .for_task(task.task_id.as_str()),
        );
        match done {
            Some(done) => {
                self.trigger.schedule(&mut scope, done);
                scope.commit();
                info!("Job {} done: {}", job.id, output.primary);
                TaskOutcome::done(task, output.primary)
            }
            None => {
                scope.rollback();
                let status = self
                    .ledger
                    .get(&job.id)
                    .map(|j| j.status)
                    .unwrap_or(JobStatus::Failed);
                warn!("Job {} could not be marked done (now {})", job.id, status);
                TaskOutcome::new(task, status)
            }
        }
    }

    fn cancel(&self, task: &QueuedTask, job: &Job) -> TaskOutcome {
        info!("Target {} is gone; canceling job {}", job.target, job.id);
        self.ledger.update(
            &job.id,
            JobUpdate::new()
                .status(JobStatus::Canceled)
                .message("Target no longer exists")
                .for_task(task.task_id.as_str()),
        );
        TaskOutcome::new(task, JobStatus::Canceled)
    }

    /// The job now belongs to a newer task, which owns every further write.
    fn superseded(&self, task: &QueuedTask) -> TaskOutcome {
        let status = self
            .ledger
            .get(&task.job_id)
            .map(|j| j.status)
            .unwrap_or(JobStatus::Queued);
        info!("Task {} was superseded mid-run; discarding its output", task.task_id);
        TaskOutcome::new(task, status)
    }

    fn fail(&self, task: &QueuedTask, job: &Job, error: &str) -> TaskOutcome {
        let error = truncate_error(error);
        warn!("Job {} failed: {}", job.id, error);
        self.ledger.update(
            &job.id,
            JobUpdate::new()
                .status(JobStatus::Failed)
                .message("Conversion failed")
                .error(error.clone())
                .for_task(task.task_id.as_str()),
        );
        TaskOutcome::failed(task, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_messages() {
        assert_eq!(stage_message("video_1080"), "Encoding 1080p rendition");
        assert_eq!(stage_message("finalize"), "Finalizing output");
        assert_eq!(stage_message("transcode"), "Transcoding");
        assert_eq!(stage_message("loudness"), "Running loudness");
    }
}
