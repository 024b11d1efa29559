use serde::{Deserialize, Serialize};

use crate::jobs::{JobStatus, MediaKind, StagePlanEntry, TargetRef};

/// Per-upload conversion options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Media kind; detected from the source path when unset.
    #[serde(default)]
    pub kind: Option<MediaKind>,
    /// Whether binding the primary output marks the target converted.
    #[serde(default = "default_true")]
    pub mark_converted: bool,
    /// Field that receives an auto-generated thumbnail (video only).
    #[serde(default)]
    pub thumbnail_field: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Overrides the configured stage plan for this media kind.
    #[serde(default)]
    pub stage_plan: Option<Vec<StagePlanEntry>>,
}

fn default_true() -> bool {
    true
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            kind: None,
            mark_converted: true,
            thumbnail_field: None,
            max_attempts: None,
            stage_plan: None,
        }
    }
}

/// A request to convert one uploaded file into one target field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub target_kind: String,
    pub target_id: String,
    pub field_name: String,
    pub source_path: String,
    #[serde(default)]
    pub upload_config: UploadConfig,
}

impl ConversionRequest {
    pub fn new(
        target: &TargetRef,
        field_name: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            target_kind: target.kind.clone(),
            target_id: target.id.clone(),
            field_name: field_name.into(),
            source_path: source_path.into(),
            upload_config: UploadConfig::default(),
        }
    }

    pub fn with_config(mut self, upload_config: UploadConfig) -> Self {
        self.upload_config = upload_config;
        self
    }

    pub fn target(&self) -> TargetRef {
        TargetRef::new(&self.target_kind, &self.target_id)
    }
}

/// Returned by the dispatcher for an accepted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHandle {
    pub job_id: String,
    pub task_id: String,
}

/// A unit of work on the pool's channel.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub job_id: String,
    pub task_id: String,
    pub target: TargetRef,
    pub field_name: String,
    pub kind: MediaKind,
    pub source_path: String,
    pub upload_config: UploadConfig,
}

/// What happened to a task once a worker finished with it.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub job_id: String,
    pub task_id: String,
    pub status: JobStatus,
    pub output_path: Option<String>,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn new(task: &QueuedTask, status: JobStatus) -> Self {
        Self {
            job_id: task.job_id.clone(),
            task_id: task.task_id.clone(),
            status,
            output_path: None,
            error: None,
        }
    }

    pub fn done(task: &QueuedTask, output_path: String) -> Self {
        Self {
            output_path: Some(output_path),
            ..Self::new(task, JobStatus::Done)
        }
    }

    pub fn failed(task: &QueuedTask, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(task, JobStatus::Failed)
        }
    }

    pub fn success(&self) -> bool {
        self.status == JobStatus::Done
    }
}
