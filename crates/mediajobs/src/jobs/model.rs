//! Job data model.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::job_repo::JobRow;
use crate::db::{format_timestamp, parse_timestamp, DatabaseError};

/// Polymorphic reference to the domain object that owns a job.
///
/// `kind` names the collection ("post", "track", ...) and `id` is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: String,
    pub id: String,
}

impl TargetRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Media category of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaKind::Image),
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    /// Guesses the media kind from a file path using its MIME type.
    /// Returns `None` for unknown or non-media extensions.
    pub fn detect(path: &Path) -> Option<Self> {
        let mime = mime_guess::from_path(path).first()?;
        match mime.type_().as_str() {
            "image" => Some(MediaKind::Image),
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            "canceled" => Some(JobStatus::Canceled),
            _ => None,
        }
    }

    /// Terminal states are immutable outside of administrative overrides.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named, weighted phase of a job's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlanEntry {
    pub key: String,
    pub weight: u32,
}

impl StagePlanEntry {
    pub fn new(key: impl Into<String>, weight: u32) -> Self {
        Self {
            key: key.into(),
            weight,
        }
    }
}

/// A snapshot of one conversion job.
///
/// Snapshots are plain values; all mutation goes through the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub target: TargetRef,
    pub field_name: String,
    pub kind: MediaKind,
    pub status: JobStatus,
    pub task_id: Option<String>,
    pub attempt: u32,
    pub max_attempts: u32,
    pub progress: u8,
    pub message: Option<String>,
    pub error: Option<String>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub stage: Option<String>,
    pub stage_index: Option<u32>,
    pub stage_count: Option<u32>,
    pub stage_weight: Option<u32>,
    pub stage_progress: Option<f64>,
    pub stage_started_at: Option<DateTime<Utc>>,
    pub stage_plan: Vec<StagePlanEntry>,
    pub stage_total_weight: Option<u32>,
    pub stage_completed_weight: Option<u32>,
    pub source_path: Option<String>,
    pub output_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Builds a job from a database row.
    pub fn from_row(row: &JobRow) -> Result<Self, DatabaseError> {
        let kind = MediaKind::parse(&row.kind).ok_or_else(|| DatabaseError::Decode {
            column: "kind",
            reason: format!("unknown media kind '{}'", row.kind),
        })?;
        let status = JobStatus::parse(&row.status).ok_or_else(|| DatabaseError::Decode {
            column: "status",
            reason: format!("unknown status '{}'", row.status),
        })?;
        let stage_plan = match row.stage_plan.as_deref() {
            Some(json) if !json.trim().is_empty() => {
                serde_json::from_str(json).map_err(|e| DatabaseError::Decode {
                    column: "stage_plan",
                    reason: e.to_string(),
                })?
            }
            _ => Vec::new(),
        };
        let created_at = parse_timestamp(&row.created_at).ok_or_else(|| DatabaseError::Decode {
            column: "created_at",
            reason: row.created_at.clone(),
        })?;
        let updated_at = parse_timestamp(&row.updated_at).unwrap_or(created_at);

        Ok(Self {
            id: row.id.clone(),
            target: TargetRef::new(&row.target_kind, &row.target_id),
            field_name: row.field_name.clone(),
            kind,
            status,
            task_id: row.task_id.clone(),
            attempt: to_u32(row.attempt),
            max_attempts: to_u32(row.max_attempts),
            progress: row.progress.clamp(0, 100) as u8,
            message: row.message.clone(),
            error: row.error.clone(),
            heartbeat_at: row.heartbeat_at.as_deref().and_then(parse_timestamp),
            stage: row.stage.clone(),
            stage_index: row.stage_index.map(to_u32),
            stage_count: row.stage_count.map(to_u32),
            stage_weight: row.stage_weight.map(to_u32),
            stage_progress: row.stage_progress,
            stage_started_at: row.stage_started_at.as_deref().and_then(parse_timestamp),
            stage_plan,
            stage_total_weight: row.stage_total_weight.map(to_u32),
            stage_completed_weight: row.stage_completed_weight.map(to_u32),
            source_path: row.source_path.clone(),
            output_path: row.output_path.clone(),
            created_at,
            started_at: row.started_at.as_deref().and_then(parse_timestamp),
            finished_at: row.finished_at.as_deref().and_then(parse_timestamp),
            duration_ms: row.duration_ms,
            updated_at,
        })
    }

    /// Converts the job into its database representation.
    pub fn to_row(&self) -> JobRow {
        let stage_plan = if self.stage_plan.is_empty() {
            None
        } else {
            serde_json::to_string(&self.stage_plan).ok()
        };

        JobRow {
            id: self.id.clone(),
            target_kind: self.target.kind.clone(),
            target_id: self.target.id.clone(),
            field_name: self.field_name.clone(),
            kind: self.kind.as_str().to_string(),
            status: self.status.as_str().to_string(),
            task_id: self.task_id.clone(),
            attempt: i64::from(self.attempt),
            max_attempts: i64::from(self.max_attempts),
            progress: i64::from(self.progress),
            message: self.message.clone(),
            error: self.error.clone(),
            heartbeat_at: self.heartbeat_at.map(format_timestamp),
            stage: self.stage.clone(),
            stage_index: self.stage_index.map(i64::from),
            stage_count: self.stage_count.map(i64::from),
            stage_weight: self.stage_weight.map(i64::from),
            stage_progress: self.stage_progress,
            stage_started_at: self.stage_started_at.map(format_timestamp),
            stage_plan,
            stage_total_weight: self.stage_total_weight.map(i64::from),
            stage_completed_weight: self.stage_completed_weight.map(i64::from),
            source_path: self.source_path.clone(),
            output_path: self.output_path.clone(),
            created_at: format_timestamp(self.created_at),
            started_at: self.started_at.map(format_timestamp),
            finished_at: self.finished_at.map(format_timestamp),
            duration_ms: self.duration_ms,
            updated_at: format_timestamp(self.updated_at),
        }
    }
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// A sparse set of field changes for one job.
///
/// Unset fields are left untouched. `heartbeat_at` and `updated_at` are
/// always refreshed by the ledger and are therefore not part of the diff.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub task_id: Option<String>,
    pub output_path: Option<String>,
    pub stage: Option<String>,
    pub stage_index: Option<u32>,
    pub stage_count: Option<u32>,
    pub stage_weight: Option<u32>,
    pub stage_progress: Option<f64>,
    pub stage_plan: Option<Vec<StagePlanEntry>>,
    pub stage_total_weight: Option<u32>,
    pub stage_completed_weight: Option<u32>,
    /// When set, the diff only applies while the job still belongs to this
    /// task. Writes from a superseded worker are dropped.
    pub expected_task_id: Option<String>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pure liveness signal.
    pub fn heartbeat() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent.min(100));
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Announces the current stage by its plan index and key.
    pub fn stage(mut self, index: u32, key: impl Into<String>) -> Self {
        self.stage_index = Some(index);
        self.stage = Some(key.into());
        self
    }

    pub fn stage_progress(mut self, fraction: f64) -> Self {
        self.stage_progress = Some(fraction);
        self
    }

    pub fn stage_weight(mut self, weight: u32) -> Self {
        self.stage_weight = Some(weight);
        self
    }

    pub fn stage_plan(mut self, plan: Vec<StagePlanEntry>) -> Self {
        self.stage_plan = Some(plan);
        self
    }

    pub fn stage_completed_weight(mut self, weight: u32) -> Self {
        self.stage_completed_weight = Some(weight);
        self
    }

    pub fn stage_total_weight(mut self, weight: u32) -> Self {
        self.stage_total_weight = Some(weight);
        self
    }

    /// Scopes the diff to the task that is expected to own the job.
    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.expected_task_id = Some(task_id.into());
        self
    }

    /// Whether a job owned by `task_id` accepts this diff.
    pub fn matches_task(&self, task_id: Option<&str>) -> bool {
        match &self.expected_task_id {
            Some(expected) => task_id == Some(expected.as_str()),
            None => true,
        }
    }
}
