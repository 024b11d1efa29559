//! Ready/not-ready verdicts for gating serialization and UI.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::availability::TargetRegistry;
use crate::jobs::{JobLedger, JobStatus, TargetRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    Ready,
    Missing,
    ReadyButMissingOutput,
    Queued,
    Processing,
    Failed,
    Canceled,
    NotConverted,
}

impl ReadinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessStatus::Ready => "ready",
            ReadinessStatus::Missing => "missing",
            ReadinessStatus::ReadyButMissingOutput => "ready_but_missing_output",
            ReadinessStatus::Queued => "queued",
            ReadinessStatus::Processing => "processing",
            ReadinessStatus::Failed => "failed",
            ReadinessStatus::Canceled => "canceled",
            ReadinessStatus::NotConverted => "not_converted",
        }
    }
}

impl fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<JobStatus> for ReadinessStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => ReadinessStatus::Queued,
            JobStatus::Processing => ReadinessStatus::Processing,
            JobStatus::Done => ReadinessStatus::Ready,
            JobStatus::Failed => ReadinessStatus::Failed,
            JobStatus::Canceled => ReadinessStatus::Canceled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub ready: bool,
    pub status: ReadinessStatus,
    pub job_id: Option<String>,
}

impl Readiness {
    fn new(ready: bool, status: ReadinessStatus, job_id: Option<String>) -> Self {
        Self {
            ready,
            status,
            job_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessOptions {
    /// Treat a field without any job as not ready.
    pub require_job: bool,
    /// Treat a finished job without an output path as not ready.
    pub require_output_on_done: bool,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            require_job: false,
            require_output_on_done: true,
        }
    }
}

/// Readiness of one field, from its job alone.
pub fn get_readiness(
    ledger: &JobLedger,
    target: &TargetRef,
    field: &str,
    options: ReadinessOptions,
) -> Readiness {
    let Some(job) = ledger.find_by_target(target, Some(field)) else {
        return if options.require_job {
            Readiness::new(false, ReadinessStatus::Missing, None)
        } else {
            Readiness::new(true, ReadinessStatus::Ready, None)
        };
    };

    match job.status {
        JobStatus::Done => {
            let has_output = job
                .output_path
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty());
            if options.require_output_on_done && !has_output {
                Readiness::new(false, ReadinessStatus::ReadyButMissingOutput, Some(job.id))
            } else {
                Readiness::new(true, ReadinessStatus::Ready, Some(job.id))
            }
        }
        status => Readiness::new(false, status.into(), Some(job.id)),
    }
}

/// Like [`get_readiness`], but the target's own converted flag has the final
/// word: a target whose flag is unset is never ready.
///
/// Targets without a converted flag fall back to the job verdict. A target
/// that cannot be resolved is reported as missing.
pub fn get_strict_readiness(
    ledger: &JobLedger,
    registry: &TargetRegistry,
    target: &TargetRef,
    field: &str,
    options: ReadinessOptions,
) -> Readiness {
    let verdict = get_readiness(ledger, target, field, options);

    let resolved = match registry.resolve(target) {
        Ok(resolved) => resolved,
        Err(e) => {
            log::debug!("Strict readiness: cannot resolve {}: {}", target, e);
            return Readiness::new(false, ReadinessStatus::Missing, verdict.job_id);
        }
    };

    match resolved.converted_flag() {
        Some(flag) if !flag.is_converted() => {
            Readiness::new(false, ReadinessStatus::NotConverted, verdict.job_id)
        }
        _ => verdict,
    }
}
