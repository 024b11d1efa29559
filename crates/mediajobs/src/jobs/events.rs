//! Job event broadcaster for real-time progress streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::model::{Job, JobStatus};

/// What happened to a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    /// The job row was created or re-created.
    Upserted,
    /// Progress, stage or liveness changed.
    Updated,
    /// The job reached a terminal status.
    Finished,
    /// A terminal job was changed through an administrative override.
    Overridden,
}

/// A snapshot of a job published after a successful ledger write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    pub target_kind: String,
    pub target_id: String,
    pub field_name: String,
    pub kind: JobEventKind,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn from_job(job: &Job, kind: JobEventKind) -> Self {
        Self {
            job_id: job.id.clone(),
            target_kind: job.target.kind.clone(),
            target_id: job.target.id.clone(),
            field_name: job.field_name.clone(),
            kind,
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            stage: job.stage.clone(),
            error: job.error.clone(),
            timestamp: job.updated_at,
        }
    }
}

/// Broadcasts job events to any number of subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    /// Creates a broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
