//! Accepts conversion requests and queues them for the pool.

use std::path::Path;

use log::{info, warn};
use uuid::Uuid;

use crate::config::loader::validate_stage_plan;
use crate::config::{Config, StagePlansConfig};
use crate::error::WorkerError;
use crate::jobs::{JobLedger, JobStatus, JobUpdate, MediaKind, TargetRef, UpsertJob};

use super::pool::TaskSubmitter;
use super::request::{ConversionRequest, QueuedTask, TaskHandle};

pub struct Dispatcher {
    ledger: JobLedger,
    submitter: TaskSubmitter,
    stage_plans: StagePlansConfig,
    max_attempts: u32,
}

impl Dispatcher {
    pub fn new(ledger: JobLedger, submitter: TaskSubmitter, config: &Config) -> Self {
        Self {
            ledger,
            submitter,
            stage_plans: config.stage_plans.clone(),
            max_attempts: config.max_attempts,
        }
    }

    /// Records a QUEUED job for the request and hands it to a worker.
    ///
    /// A previous job for the same field is replaced. When that job failed
    /// or was canceled, the new one counts as a retry and is refused once
    /// `max_attempts` is reached.
    pub fn enqueue(&self, request: ConversionRequest) -> Result<TaskHandle, WorkerError> {
        for (name, value) in [
            ("target_kind", &request.target_kind),
            ("target_id", &request.target_id),
            ("field_name", &request.field_name),
            ("source_path", &request.source_path),
        ] {
            if value.trim().is_empty() {
                return Err(WorkerError::InvalidRequest(format!("{} is empty", name)));
            }
        }

        let config = &request.upload_config;
        let kind = match config.kind {
            Some(kind) => kind,
            None => MediaKind::detect(Path::new(&request.source_path))
                .ok_or_else(|| WorkerError::UnknownMediaKind(request.source_path.clone()))?,
        };

        let plan = match &config.stage_plan {
            Some(plan) => {
                validate_stage_plan(kind.as_str(), plan)
                    .map_err(|e| WorkerError::InvalidRequest(e.to_string()))?;
                plan.clone()
            }
            None => self.stage_plans.for_kind(kind).to_vec(),
        };
        if config.thumbnail_field.as_deref() == Some(request.field_name.as_str()) {
            return Err(WorkerError::InvalidRequest(
                "thumbnail_field must differ from field_name".to_string(),
            ));
        }

        let target = request.target();
        let max_attempts = config.max_attempts.unwrap_or(self.max_attempts).max(1);
        if let Some(previous) = self.ledger.find_by_target(&target, Some(&request.field_name)) {
            let is_retry = matches!(previous.status, JobStatus::Failed | JobStatus::Canceled);
            if is_retry && previous.attempt >= max_attempts {
                warn!(
                    "Refusing to requeue {} field '{}': {} of {} attempts used",
                    target, request.field_name, previous.attempt, max_attempts
                );
                return Err(WorkerError::RetriesExhausted {
                    target: target.to_string(),
                    field: request.field_name.clone(),
                    attempt: previous.attempt,
                    max_attempts,
                });
            }
        }

        let task_id = Uuid::new_v4().to_string();
        let job = self
            .ledger
            .upsert(
                UpsertJob::new(target.clone(), &request.field_name, kind)
                    .task_id(&task_id)
                    .source_path(&request.source_path)
                    .max_attempts(max_attempts)
                    .stage_plan(plan),
            )
            .ok_or(WorkerError::LedgerUnavailable)?;

        let task = QueuedTask {
            job_id: job.id.clone(),
            task_id: task_id.clone(),
            target,
            field_name: request.field_name,
            kind,
            source_path: request.source_path,
            upload_config: request.upload_config,
        };

        if let Err(e) = self.submitter.submit(task) {
            warn!("Could not queue job {}: {}", job.id, e);
            self.ledger.update(
                &job.id,
                JobUpdate::new()
                    .status(JobStatus::Failed)
                    .error(format!("worker pool unavailable: {}", e))
                    .for_task(task_id.as_str()),
            );
            return Err(e);
        }

        info!(
            "Queued {} job {} (attempt {}/{})",
            kind, job.id, job.attempt, job.max_attempts
        );
        Ok(TaskHandle {
            job_id: job.id,
            task_id,
        })
    }

    /// Re-enqueues the field's last upload.
    pub fn retry(&self, target: &TargetRef, field: &str) -> Result<TaskHandle, WorkerError> {
        let job = self
            .ledger
            .find_by_target(target, Some(field))
            .ok_or_else(|| WorkerError::JobNotFound(format!("{} field '{}'", target, field)))?;
        let source_path = job.source_path.ok_or_else(|| {
            WorkerError::InvalidRequest(format!("job {} has no source path", job.id))
        })?;

        let mut request = ConversionRequest::new(target, field, source_path);
        request.upload_config.kind = Some(job.kind);
        if !job.stage_plan.is_empty() {
            request.upload_config.stage_plan = Some(job.stage_plan);
        }
        request.upload_config.max_attempts = Some(job.max_attempts);
        self.enqueue(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jobs::StagePlanEntry;
    use crate::worker::request::UploadConfig;
    use crossbeam_channel::Receiver;

    fn dispatcher() -> (Dispatcher, Receiver<QueuedTask>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let submitter = TaskSubmitter::for_channel(sender);
        let ledger = JobLedger::new(Database::open_in_memory().unwrap());
        let mut config = Config::new("/tmp/media");
        config.max_attempts = 2;
        (Dispatcher::new(ledger, submitter, &config), receiver)
    }

    fn request(field: &str, source: &str) -> ConversionRequest {
        ConversionRequest::new(&TargetRef::new("post", "1"), field, source)
    }

    #[test]
    fn test_enqueue_detects_kind_and_plan() {
        let (dispatcher, rx) = dispatcher();
        let handle = dispatcher.enqueue(request("video", "uploads/clip.mp4")).unwrap();

        let task = rx.try_recv().unwrap();
        assert_eq!(task.job_id, handle.job_id);
        assert_eq!(task.task_id, handle.task_id);
        assert_eq!(task.kind, MediaKind::Video);

        let job = dispatcher.ledger.get(&handle.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.task_id.as_deref(), Some(handle.task_id.as_str()));
        assert_eq!(job.stage_plan.len(), 3);
        assert_eq!(job.stage_total_weight, Some(100));
        assert_eq!(job.max_attempts, 2);
    }

    #[test]
    fn test_enqueue_rejects_bad_requests() {
        let (dispatcher, _rx) = dispatcher();
        assert!(matches!(
            dispatcher.enqueue(request("", "a.mp4")),
            Err(WorkerError::InvalidRequest(_))
        ));
        assert!(matches!(
            dispatcher.enqueue(request("doc", "notes.txt")),
            Err(WorkerError::UnknownMediaKind(_))
        ));

        let bad_plan = request("video", "a.mp4").with_config(UploadConfig {
            stage_plan: Some(vec![StagePlanEntry::new("a", 0)]),
            ..UploadConfig::default()
        });
        assert!(matches!(
            dispatcher.enqueue(bad_plan),
            Err(WorkerError::InvalidRequest(_))
        ));

        let overflowing = request("video", "a.mp4").with_config(UploadConfig {
            stage_plan: Some(vec![
                StagePlanEntry::new("a", u32::MAX),
                StagePlanEntry::new("b", 1),
            ]),
            ..UploadConfig::default()
        });
        assert!(matches!(
            dispatcher.enqueue(overflowing),
            Err(WorkerError::InvalidRequest(msg)) if msg.contains("total weight")
        ));
    }

    #[test]
    fn test_retry_is_refused_after_max_attempts() {
        let (dispatcher, _rx) = dispatcher();
        let target = TargetRef::new("post", "1");

        let first = dispatcher.enqueue(request("video", "a.mp4")).unwrap();
        dispatcher
            .ledger
            .update(&first.job_id, JobUpdate::new().status(JobStatus::Failed));

        let second = dispatcher.retry(&target, "video").unwrap();
        assert_eq!(second.job_id, first.job_id);
        assert_ne!(second.task_id, first.task_id);
        let job = dispatcher.ledger.get(&second.job_id).unwrap();
        assert_eq!(job.attempt, 2);
        assert_eq!(job.source_path.as_deref(), Some("a.mp4"));

        dispatcher
            .ledger
            .update(&second.job_id, JobUpdate::new().status(JobStatus::Failed));
        assert!(matches!(
            dispatcher.retry(&target, "video"),
            Err(WorkerError::RetriesExhausted { attempt: 2, max_attempts: 2, .. })
        ));

        assert!(matches!(
            dispatcher.retry(&target, "audio"),
            Err(WorkerError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_full_queue_does_not_block() {
        let (sender, rx) = crossbeam_channel::bounded(1);
        let ledger = JobLedger::new(Database::open_in_memory().unwrap());
        let dispatcher =
            Dispatcher::new(ledger, TaskSubmitter::for_channel(sender), &Config::new("/tmp/media"));

        dispatcher.enqueue(request("video", "clip.mp4")).unwrap();
        let err = dispatcher.enqueue(request("cover", "cover.png")).unwrap_err();
        assert!(matches!(err, WorkerError::QueueFull));

        let cover = dispatcher
            .ledger
            .find_by_target(&TargetRef::new("post", "1"), Some("cover"))
            .unwrap();
        assert_eq!(cover.status, JobStatus::Failed);
        assert!(cover.error.unwrap().contains("queue is full"));

        // Once a worker takes the first task there is room again.
        rx.try_recv().unwrap();
        dispatcher.retry(&TargetRef::new("post", "1"), "cover").unwrap();
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_submit_failure_marks_job_failed() {
        let (dispatcher, rx) = dispatcher();
        drop(rx);
        let err = dispatcher.enqueue(request("cover", "cover.png")).unwrap_err();
        assert!(matches!(err, WorkerError::ChannelClosed));

        let job = dispatcher
            .ledger
            .find_by_target(&TargetRef::new("post", "1"), Some("cover"))
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }
}
